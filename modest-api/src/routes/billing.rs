/// Subscription checkout and management
///
/// # Endpoints
///
/// - `POST /account/checkout` - Start a hosted checkout for a plan
/// - `GET /account/checkout/success` - Return target after payment
/// - `GET /account/checkout/cancel` - Return target after an aborted checkout
/// - `GET /account/subscription/manage` - Open the billing portal
///
/// All of them answer 503 when no payment gateway is configured.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    response::Redirect,
    Extension, Json,
};
use modest_shared::{
    auth::principal::Principal, billing::CheckoutRequest, models::session::Session,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Checkout request body
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    /// Price id of the chosen plan
    pub price: String,
}

/// Checkout response
///
/// The browser hands the id to the gateway's client library to redirect.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

/// Forgets the cached subscription price so the next account view refetches it
async fn clear_cached_price(state: &AppState, session: Option<&Session>) {
    let Some(session) = session else {
        return;
    };

    if let Err(e) = state
        .stores()
        .sessions
        .set_current_price_id(&session.id, None)
        .await
    {
        warn!(error = %e, "Failed to clear cached price");
    }
}

/// Start a checkout
///
/// # Endpoint
///
/// ```text
/// POST /account/checkout
/// Content-Type: application/json
///
/// {"price": "price_basic"}
/// ```
///
/// # Response
///
/// ```json
/// {"sessionId": "cs_test_a1b2"}
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Missing price, or a price no plan offers
/// - `503 Service Unavailable`: Billing not configured
pub async fn checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing()?;

    let price = body.price.trim();
    if price.is_empty() {
        return Err(ApiError::validation("price", "Price is required"));
    }
    if !state.plans.is_empty() && !state.plans.iter().any(|p| p.price_id == price) {
        return Err(ApiError::validation("price", "Unknown plan"));
    }

    let domain = &state.config.app.domain;
    let session_id = billing
        .create_checkout_session(CheckoutRequest {
            customer_email: principal.email.clone(),
            price_id: price.to_string(),
            success_url: format!(
                "{}/account/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                domain
            ),
            cancel_url: format!("{}/account/checkout/cancel", domain),
        })
        .await?;

    info!(account_id = %principal.account_id, price = %price, "Checkout started");

    Ok(Json(CheckoutResponse { session_id }))
}

/// Links the checkout's customer to the account
///
/// Without a `session_id` this just goes back to the account page.
pub async fn checkout_success(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    session: Option<Extension<Session>>,
    Query(query): Query<SuccessQuery>,
) -> ApiResult<Redirect> {
    let billing = state.billing()?;

    let Some(checkout_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return Ok(Redirect::to("/account"));
    };

    let customer = billing.checkout_customer(&checkout_id).await?;
    state
        .accounts
        .set_billing_id(principal.account_id, &customer)
        .await?;

    let session = session.map(|Extension(s)| s);
    clear_cached_price(&state, session.as_ref()).await;

    info!(account_id = %principal.account_id, "Checkout completed");
    Ok(Redirect::to("/account?checkout=success"))
}

pub async fn checkout_cancel(State(state): State<AppState>) -> ApiResult<Redirect> {
    state.billing()?;
    Ok(Redirect::to("/account?checkout=cancel"))
}

/// Redirects to the gateway's billing portal
///
/// Accounts that never checked out, and portal failures, land back on the
/// account page.
pub async fn manage_subscription(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    session: Option<Extension<Session>>,
) -> ApiResult<Redirect> {
    let billing = state.billing()?;

    let session = session.map(|Extension(s)| s);
    clear_cached_price(&state, session.as_ref()).await;

    let account = state.accounts.account(principal.account_id).await?;
    let Some(customer) = account.billing_id else {
        return Ok(Redirect::to("/account"));
    };

    let return_url = format!("{}/account", state.config.app.domain);
    match billing.create_portal_session(&customer, &return_url).await {
        Ok(url) => Ok(Redirect::to(&url)),
        Err(e) => {
            warn!(account_id = %principal.account_id, error = %e, "Failed to open billing portal");
            Ok(Redirect::to("/account"))
        }
    }
}
