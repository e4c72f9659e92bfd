/// Configuration management for the API server
///
/// Configuration is layered with the `config` crate:
///
/// 1. built-in defaults
/// 2. an optional file: `MODEST_CONFIG_FILE`, or `config/default` and
///    `config/local` (any format `config` understands)
/// 3. environment variables prefixed with `MODEST`, sections separated by
///    `__` (for example `MODEST__API__PORT=8080`)
///
/// A `.env` file is loaded first when present.
///
/// # Example
///
/// ```no_run
/// use modest_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::load()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use modest_shared::auth::tokens::generate_token;
use modest_shared::lifecycle::{LifecycleSettings, TokenPolicy};
use modest_shared::models::plan::{parse_plans, Plan};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Minimum length of secrets in production
pub const MIN_SECRET_LENGTH: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub api_token: ApiTokenConfig,
    pub tokens: TokenConfig,
    pub mail: MailConfig,
    pub oauth: OAuthConfig,
    pub billing: BillingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Product name used in mail and logs
    pub name: String,

    /// Public base URL, without trailing slash
    pub domain: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "modest".to_string(),
            domain: "http://localhost:4000".to_string(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Enables HSTS and secret length checks
    pub production: bool,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    pub request_timeout_secs: u64,

    pub health_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            production: false,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 10,
            health_path: "/healthz".to_string(),
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Memory,
    Postgres,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: Driver,

    /// PostgreSQL connection URL; required for the postgres driver
    pub url: String,

    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: Driver::Memory,
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key for hashing one-time tokens
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    pub ttl_hours: i64,

    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_hours: 24 * 7,
            cookie_name: "modest_session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiTokenConfig {
    /// Key for signing API bearer tokens
    pub master_secret: String,

    pub ttl_days: i64,
}

impl Default for ApiTokenConfig {
    fn default() -> Self {
        Self {
            master_secret: String::new(),
            ttl_days: 365,
        }
    }
}

/// Lifetimes of mailed links
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub confirmation_ttl_hours: i64,
    pub recovery_ttl_minutes: i64,
    pub email_change_ttl_hours: i64,
    pub passwordless_ttl_minutes: i64,
    pub oauth_state_ttl_minutes: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            confirmation_ttl_hours: 48,
            recovery_ttl_minutes: 60,
            email_change_ttl_hours: 24,
            passwordless_ttl_minutes: 15,
            oauth_state_ttl_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "noreply@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: OAuthClientConfig,
}

/// Provider credentials; the provider is enabled only when both are set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClientConfig {
    pub fn is_enabled(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub stripe_secret_key: String,
    pub stripe_publishable_key: String,
    pub stripe_webhook_secret: String,

    /// Path to a JSON plan list, or the list itself base64-encoded
    pub plans_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
}

impl Config {
    /// Loads configuration from files and environment
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read, a value has the wrong
    /// type, or [`Config::validate`] fails.
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        builder = match std::env::var("MODEST_CONFIG_FILE") {
            Ok(path) => builder.add_source(config::File::with_name(&path)),
            Err(_) => builder
                .add_source(config::File::with_name("config/default").required(false))
                .add_source(config::File::with_name("config/local").required(false)),
        };

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("MODEST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()
    }

    /// Checks required values and fills development defaults
    ///
    /// Outside production, missing secrets are replaced by random ones (so
    /// sessions and API tokens do not survive a restart).
    pub fn validate(mut self) -> anyhow::Result<Self> {
        if self.database.driver == Driver::Postgres && self.database.url.is_empty() {
            anyhow::bail!("database.url is required for the postgres driver");
        }

        let production = self.api.production;
        for (name, secret) in [
            ("session.secret", &mut self.session.secret),
            ("api_token.master_secret", &mut self.api_token.master_secret),
        ] {
            if production {
                if secret.len() < MIN_SECRET_LENGTH {
                    anyhow::bail!("{} must be at least {} characters long", name, MIN_SECRET_LENGTH);
                }
            } else if secret.is_empty() {
                warn!(setting = name, "Secret not configured, using a random one");
                *secret = generate_token();
            }
        }

        if self.session.ttl_hours <= 0 || self.api_token.ttl_days <= 0 {
            anyhow::bail!("session.ttl_hours and api_token.ttl_days must be positive");
        }

        if !self.api.health_path.starts_with('/') {
            anyhow::bail!("api.health_path must start with '/'");
        }

        self.app.domain = self.app.domain.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether Stripe billing is configured
    pub fn billing_enabled(&self) -> bool {
        !self.billing.stripe_secret_key.is_empty()
    }

    /// Settings for the account lifecycle service
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        let tokens = &self.tokens;
        LifecycleSettings {
            app_name: self.app.name.clone(),
            domain: self.app.domain.clone(),
            session_secret: self.session.secret.clone(),
            api_secret: self.api_token.master_secret.clone(),
            policy: TokenPolicy {
                confirmation_ttl: chrono::Duration::hours(tokens.confirmation_ttl_hours),
                recovery_ttl: chrono::Duration::minutes(tokens.recovery_ttl_minutes),
                email_change_ttl: chrono::Duration::hours(tokens.email_change_ttl_hours),
                passwordless_ttl: chrono::Duration::minutes(tokens.passwordless_ttl_minutes),
                oauth_state_ttl: chrono::Duration::minutes(tokens.oauth_state_ttl_minutes),
                session_ttl: chrono::Duration::hours(self.session.ttl_hours),
                api_token_ttl: chrono::Duration::days(self.api_token.ttl_days),
            },
        }
    }

    /// Loads the subscription plans
    ///
    /// A missing or unreadable plan list is logged and yields no plans.
    pub fn load_plans(&self) -> Vec<Plan> {
        let source = self.billing.plans_file.trim();
        if source.is_empty() {
            return Vec::new();
        }

        let json = if Path::new(source).is_file() {
            std::fs::read_to_string(source).map_err(|e| e.to_string())
        } else {
            STANDARD
                .decode(source)
                .map_err(|e| e.to_string())
                .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()))
        };

        match json.and_then(|json| parse_plans(&json).map_err(|e| e.to_string())) {
            Ok(plans) => plans,
            Err(e) => {
                warn!(error = %e, "Failed to load plans");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let mut config = Config::default();
        config.api.host = "127.0.0.1".to_string();
        config.api.port = 8080;

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default().validate().unwrap();

        assert_eq!(config.api.port, 4000);
        assert_eq!(config.database.driver, Driver::Memory);
        assert_eq!(config.session.cookie_name, "modest_session");
        assert_eq!(config.api.health_path, "/healthz");
        assert!(!config.session.secret.is_empty());
        assert!(!config.billing_enabled());
        assert!(!config.oauth.google.is_enabled());
    }

    #[test]
    fn test_production_requires_long_secrets() {
        let mut config = Config::default();
        config.api.production = true;
        config.session.secret = "short".to_string();
        config.api_token.master_secret = "x".repeat(MIN_SECRET_LENGTH);
        assert!(config.clone().validate().is_err());

        config.session.secret = "s".repeat(MIN_SECRET_LENGTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = Config::default();
        config.database.driver = Driver::Postgres;
        assert!(config.clone().validate().is_err());

        config.database.url = "postgresql://localhost/modest".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_domain_trailing_slash_trimmed() {
        let mut config = Config::default();
        config.app.domain = "https://modest.example/".to_string();
        assert_eq!(config.validate().unwrap().app.domain, "https://modest.example");
    }

    #[test]
    fn test_load_plans_base64() {
        let json = r#"[{"price_id": "price_1", "name": "Pro", "price": "$10/mo", "details": ["All features"]}]"#;
        let mut config = Config::default();
        config.billing.plans_file = STANDARD.encode(json);

        let plans = config.load_plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].price_id, "price_1");

        config.billing.plans_file = "not-a-file-and-not-base64!".to_string();
        assert!(config.load_plans().is_empty());
    }

    #[test]
    fn test_lifecycle_settings() {
        let mut config = Config::default();
        config.tokens.passwordless_ttl_minutes = 5;
        let settings = config.lifecycle_settings();

        assert_eq!(settings.policy.passwordless_ttl, chrono::Duration::minutes(5));
        assert_eq!(settings.app_name, "modest");
    }
}
