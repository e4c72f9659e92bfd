/// External identity providers
///
/// Login through a provider is a two-step redirect dance: the browser is sent
/// to [`IdentityProvider::authorize_url`] with a single-use `state`, and the
/// provider calls back with a `code` that [`IdentityProvider::exchange`]
/// turns into a verified [`ExternalIdentity`]. The account lifecycle does the
/// rest (see `AccountService::provider_callback`).

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("unknown identity provider: {0}")]
    UnknownProvider(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider rejected the exchange: {0}")]
    Rejected(String),

    #[error("provider returned no verified email")]
    UnverifiedEmail,

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

/// Identity asserted by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: String,

    /// Verified email address
    pub email: String,

    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider key used in `?provider=`
    fn name(&self) -> &str;

    /// Where to send the browser
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError>;

    /// Trades the callback code for a verified identity
    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ExternalIdentity, OAuthError>;
}

/// Configured providers by name
#[derive(Clone, Default)]
pub struct IdentityProviders {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl IdentityProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, OAuthError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Google OpenID Connect
pub struct GoogleProvider {
    client: Client,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

impl GoogleProvider {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, OAuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OAuthError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .map_err(|e| OAuthError::InvalidConfig(e.to_string()))?;

        Ok(url.into())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ExternalIdentity, OAuthError> {
        let resp = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "Google token exchange rejected");
            return Err(OAuthError::Rejected(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| OAuthError::Request(format!("invalid token response: {}", e)))?;

        let info: UserInfo = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| OAuthError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| OAuthError::Rejected(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Request(format!("invalid userinfo response: {}", e)))?;

        let email = match info.email {
            Some(email) if info.email_verified && !email.trim().is_empty() => email,
            _ => return Err(OAuthError::UnverifiedEmail),
        };

        debug!(provider = "google", "Exchanged authorization code");
        Ok(ExternalIdentity {
            provider: "google".to_string(),
            email,
            name: info.name,
        })
    }
}
