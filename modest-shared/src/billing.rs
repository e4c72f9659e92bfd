/// Subscription billing through Stripe
///
/// The account pages only need four calls from the payment gateway, all
/// behind [`BillingGateway`]:
///
/// - start a subscription checkout for a price
/// - resolve the customer created by a finished checkout
/// - open the self-service billing portal
/// - look up the price of the customer's active subscription
///
/// [`StripeClient`] talks to the Stripe REST API with `reqwest`. Incoming
/// webhooks are authenticated with [`verify_stripe_signature`].

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::tokens::constant_time_compare;

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";

/// Accepted clock difference for webhook signatures, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing request failed: {0}")]
    Request(String),

    #[error("billing gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected billing response: {0}")]
    InvalidResponse(String),

    #[error("invalid billing configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing or malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("no matching signature")]
    SignatureMismatch,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Parameters of a subscription checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer_email: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Creates a checkout session, returning its id
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, BillingError>;

    /// Customer id attached to a completed checkout session
    async fn checkout_customer(&self, session_id: &str) -> Result<String, BillingError>;

    /// Creates a billing portal session, returning its URL
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, BillingError>;

    /// Price id of the customer's first active subscription
    async fn active_price_id(&self, customer_id: &str) -> Result<Option<String>, BillingError>;
}

/// Stripe REST client
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct CheckoutSession {
    id: String,
    customer: Option<String>,
}

#[derive(Deserialize)]
struct PortalSession {
    url: String,
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Subscription {
    items: List<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    price: Price,
}

#[derive(Deserialize)]
struct Price {
    id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, BillingError> {
        if secret_key.trim().is_empty() {
            return Err(BillingError::InvalidConfig("secret key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BillingError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key,
            base_url: STRIPE_API_URL.to_string(),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, BillingError> {
        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message.unwrap_or_default(),
                Err(_) => String::new(),
            };
            warn!(status = status.as_u16(), message = %message, "Stripe request failed");
            return Err(BillingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| BillingError::InvalidResponse(e.to_string()))
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::Request(e.to_string()))?;

        Self::parse(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(|e| BillingError::Request(e.to_string()))?;

        Self::parse(resp).await
    }
}

#[async_trait]
impl BillingGateway for StripeClient {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, BillingError> {
        let session: CheckoutSession = self
            .post_form(
                "/checkout/sessions",
                &[
                    ("mode", "subscription"),
                    ("customer_email", &request.customer_email),
                    ("payment_method_types[0]", "card"),
                    ("line_items[0][price]", &request.price_id),
                    ("line_items[0][quantity]", "1"),
                    ("success_url", &request.success_url),
                    ("cancel_url", &request.cancel_url),
                ],
            )
            .await?;

        debug!(session_id = %session.id, "Created checkout session");
        Ok(session.id)
    }

    async fn checkout_customer(&self, session_id: &str) -> Result<String, BillingError> {
        let session: CheckoutSession = self
            .get(&format!("/checkout/sessions/{}", session_id), &[])
            .await?;

        session
            .customer
            .ok_or_else(|| BillingError::InvalidResponse("checkout session has no customer".to_string()))
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, BillingError> {
        let portal: PortalSession = self
            .post_form(
                "/billing_portal/sessions",
                &[("customer", customer_id), ("return_url", return_url)],
            )
            .await?;

        Ok(portal.url)
    }

    async fn active_price_id(&self, customer_id: &str) -> Result<Option<String>, BillingError> {
        let subs: List<Subscription> = self
            .get(
                "/subscriptions",
                &[("customer", customer_id), ("status", "active"), ("limit", "1")],
            )
            .await?;

        Ok(subs
            .data
            .into_iter()
            .flat_map(|s| s.items.data)
            .last()
            .map(|item| item.price.id))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Computes the `v1` signature Stripe sends for `payload` at `timestamp`
pub fn stripe_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
///
/// The payload must be the raw request body. `now` is the current Unix time.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedHeader)?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let expected = stripe_signature(secret, timestamp, payload);
    if signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected))
    {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// A webhook event, reduced to the fields the application reads
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Customer and email of a completed checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub customer_id: String,
    pub email: String,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// Extracts the checkout result from a `checkout.session.completed`
    /// event; `None` for other events or incomplete objects
    pub fn completed_checkout(&self) -> Option<CompletedCheckout> {
        if self.event_type != "checkout.session.completed" {
            return None;
        }

        let object = &self.data.object;
        let customer_id = object.get("customer")?.as_str()?.to_string();
        let email = object
            .get("customer_details")
            .and_then(|d| d.get("email"))
            .and_then(|e| e.as_str())
            .or_else(|| object.get("customer_email").and_then(|e| e.as_str()))?
            .to_string();

        Some(CompletedCheckout { customer_id, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn header(timestamp: i64, payload: &[u8]) -> String {
        format!("t={},v1={}", timestamp, stripe_signature(SECRET, timestamp, payload))
    }

    #[test]
    fn test_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;

        assert_eq!(
            verify_stripe_signature(payload, &header(now, payload), SECRET, now),
            Ok(())
        );
        assert_eq!(
            verify_stripe_signature(payload, &header(now - 299, payload), SECRET, now),
            Ok(())
        );
    }

    #[test]
    fn test_multiple_signatures_one_valid() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = format!(
            "t={},v1=deadbeef,v1={},v0=ignored",
            now,
            stripe_signature(SECRET, now, payload)
        );

        assert_eq!(verify_stripe_signature(payload, &header, SECRET, now), Ok(()));
    }

    #[test]
    fn test_tampered_payload() {
        let now = 1_700_000_000;
        let header = header(now, b"original");

        assert_eq!(
            verify_stripe_signature(b"tampered", &header, SECRET, now),
            Err(WebhookError::SignatureMismatch)
        );
        assert_eq!(
            verify_stripe_signature(b"original", &header, "other_secret", now),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_stale_timestamp() {
        let now = 1_700_000_000;
        let payload = b"{}";

        assert_eq!(
            verify_stripe_signature(payload, &header(now - 301, payload), SECRET, now),
            Err(WebhookError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_malformed_header() {
        let payload = b"{}";
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "garbage"] {
            assert_eq!(
                verify_stripe_signature(payload, header, SECRET, 1_700_000_000),
                Err(WebhookError::MalformedHeader),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_completed_checkout() {
        let payload = br#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"customer": "cus_9", "customer_details": {"email": "a@x.com"}}}
        }"#;
        let event = StripeEvent::parse(payload).unwrap();

        assert_eq!(
            event.completed_checkout(),
            Some(CompletedCheckout {
                customer_id: "cus_9".to_string(),
                email: "a@x.com".to_string(),
            })
        );
    }

    #[test]
    fn test_other_events_ignored() {
        let payload = br#"{"id": "evt_2", "type": "invoice.paid", "data": {"object": {"customer": "cus_9"}}}"#;
        assert!(StripeEvent::parse(payload).unwrap().completed_checkout().is_none());

        let no_customer = br#"{"id": "evt_3", "type": "checkout.session.completed",
            "data": {"object": {"customer_email": "a@x.com"}}}"#;
        assert!(StripeEvent::parse(no_customer).unwrap().completed_checkout().is_none());

        assert!(StripeEvent::parse(b"not json").is_err());
    }

    #[test]
    fn test_stripe_client_requires_key() {
        assert!(StripeClient::new(" ".to_string()).is_err());
        assert!(StripeClient::new("sk_test_123".to_string()).is_ok());
    }
}
