/// Inbound webhooks
///
/// # Endpoint
///
/// ```text
/// POST /webhook/:source
/// ```
///
/// Only the `stripe` source is known. Its events are authenticated with the
/// `Stripe-Signature` header against the raw body before anything is
/// parsed. A completed checkout links the paying customer to the account
/// registered under the checkout email; every other event is acknowledged
/// and ignored.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use modest_shared::billing::{verify_stripe_signature, StripeEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// Webhook handler
///
/// # Errors
///
/// - `400 Bad Request`: Missing or invalid signature, unparsable payload
/// - `404 Not Found`: Unknown source
/// - `503 Service Unavailable`: No webhook secret configured
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    if source != "stripe" {
        return Err(ApiError::NotFound(format!("unknown webhook source: {}", source)));
    }

    let secret = &state.config.billing.stripe_webhook_secret;
    if secret.is_empty() {
        return Err(ApiError::ServiceUnavailable(
            "webhooks are not configured".to_string(),
        ));
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing signature".to_string()))?;

    verify_stripe_signature(&body, signature, secret, chrono::Utc::now().timestamp())?;
    let event = StripeEvent::parse(&body)?;

    match event.completed_checkout() {
        Some(checkout) => {
            let linked = state
                .accounts
                .link_billing_by_email(&checkout.email, &checkout.customer_id)
                .await?;

            if let Some(account) = linked {
                info!(
                    event_id = %event.id,
                    account_id = %account.id,
                    "Billing customer linked"
                );
            }
        }
        None => {
            debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}
