//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - An application wired to in-memory stores
//! - A recording mailer, a fake identity provider and a fake payment gateway
//! - Request builders and response helpers
//! - Signup, confirmation and login in one call

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use modest_api::{
    app::{build_router, AppState},
    config::Config,
};
use modest_shared::{
    billing::{BillingError, BillingGateway, CheckoutRequest},
    mail::{MailKind, MemoryMailer},
    models::plan::Plan,
    oauth::{ExternalIdentity, IdentityProvider, IdentityProviders, OAuthError},
    store::Stores,
};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const PASSWORD: &str = "pw1";

/// Identity provider that trusts the code as the user's email
///
/// The code `bad` is rejected.
pub struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        Ok(format!(
            "https://idp.test/authorize?state={}&redirect_uri={}",
            state, redirect_uri
        ))
    }

    async fn exchange(&self, code: &str, _redirect_uri: &str) -> Result<ExternalIdentity, OAuthError> {
        match code {
            "bad" => Err(OAuthError::Rejected("invalid_grant".to_string())),
            email => Ok(ExternalIdentity {
                provider: "fake".to_string(),
                email: email.to_string(),
                name: None,
            }),
        }
    }
}

/// Payment gateway double
#[derive(Default)]
pub struct FakeBilling {
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub active_price: Mutex<Option<String>>,
    pub price_lookups: Mutex<u32>,
    pub fail_portal: Mutex<bool>,
}

#[async_trait]
impl BillingGateway for FakeBilling {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<String, BillingError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request);
        Ok(format!("cs_test_{}", checkouts.len()))
    }

    async fn checkout_customer(&self, session_id: &str) -> Result<String, BillingError> {
        match session_id {
            "cs_unknown" => Err(BillingError::Api {
                status: 404,
                message: "No such checkout session".to_string(),
            }),
            id => Ok(format!("cus_{}", id)),
        }
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String, BillingError> {
        if *self.fail_portal.lock().unwrap() {
            return Err(BillingError::Request("connection reset".to_string()));
        }
        Ok(format!(
            "https://billing.test/portal/{}?return_url={}",
            customer_id, return_url
        ))
    }

    async fn active_price_id(&self, _customer_id: &str) -> Result<Option<String>, BillingError> {
        *self.price_lookups.lock().unwrap() += 1;
        Ok(self.active_price.lock().unwrap().clone())
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    pub billing: Arc<FakeBilling>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.secret = "integration-session-secret-0123456789".to_string();
    config.api_token.master_secret = "integration-api-secret-0123456789abcd".to_string();
    config.billing.stripe_webhook_secret = WEBHOOK_SECRET.to_string();
    config.validate().expect("test config is valid")
}

pub fn test_plans() -> Vec<Plan> {
    vec![
        Plan {
            price_id: "price_basic".to_string(),
            name: "Basic".to_string(),
            price: "$5/mo".to_string(),
            details: vec!["Unlimited tasks".to_string()],
            current: false,
        },
        Plan {
            price_id: "price_pro".to_string(),
            name: "Pro".to_string(),
            price: "$15/mo".to_string(),
            details: Vec::new(),
            current: false,
        },
    ]
}

impl TestContext {
    /// Creates a context with billing configured
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Creates a context without a payment gateway
    pub fn without_billing() -> Self {
        Self::build(false)
    }

    fn build(with_billing: bool) -> Self {
        let mailer = Arc::new(MemoryMailer::new());
        let billing = Arc::new(FakeBilling::default());
        let gateway: Option<Arc<dyn BillingGateway>> = if with_billing {
            Some(billing.clone())
        } else {
            None
        };

        let mut state = AppState::new(
            test_config(),
            Stores::memory(),
            mailer.clone(),
            IdentityProviders::new().register(Arc::new(FakeProvider)),
            gateway,
        );
        state.plans = Arc::new(test_plans());
        state.validate_routes().expect("routes are covered");

        Self {
            app: build_router(state.clone()),
            state,
            mailer,
            billing,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, form: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// JSON request authenticated by cookie (`modest_session=...`) or bearer
    /// token (`Bearer ...`)
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
        auth: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        match auth {
            Some(bearer) if bearer.starts_with("Bearer ") => {
                builder = builder.header(header::AUTHORIZATION, bearer);
            }
            Some(cookie) => {
                builder = builder.header(header::COOKIE, cookie);
            }
            None => {}
        }

        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    /// Signs up and confirms an account
    pub async fn signup_confirmed(&self, email: &str) {
        let response = self
            .post_form("/signup", &format!("email={}&password={}", email, PASSWORD), None)
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let token = self
            .mailer
            .last_token(MailKind::Confirmation, email)
            .expect("confirmation mail sent");
        let response = self.get(&format!("/confirm/{}", token), None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    /// Logs in and returns the `Cookie` header value for the session
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post_form("/login", &format!("email={}&password={}", email, PASSWORD), None)
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("session cookie set")
    }

    pub async fn signup_and_login(&self, email: &str) -> String {
        self.signup_confirmed(email).await;
        self.login(email).await
    }
}

/// `name=value` of the session cookie set by a response
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("modest_session="))
        .and_then(|v| v.split(';').next())
        .filter(|pair| pair.len() > "modest_session=".len())
        .map(str::to_string)
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or_else(|e| {
        panic!("unexpected body {}: {}", String::from_utf8_lossy(&body), e)
    })
}
