/// Signed API bearer tokens
///
/// The JSON API accepts `Authorization: Bearer <token>` as an alternative to
/// the session cookie. Tokens are HS256 JWTs signed with the configured API
/// master secret. The `jti` claim carries the account's current API key, so
/// rotating the key revokes every token issued before it.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use modest_shared::auth::jwt::{create_api_token, validate_api_token, ApiClaims};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "an-api-master-secret-of-at-least-32-chars";
/// let claims = ApiClaims::new(Uuid::new_v4(), "mdst_key".to_string(), Duration::days(365));
/// let token = create_api_token(&claims, secret)?;
///
/// let validated = validate_api_token(&token, secret)?;
/// assert_eq!(validated.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ISSUER: &str = "modest";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Token validation failed (bad signature, malformed, wrong issuer)
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,
}

/// Claims carried by an API token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiClaims {
    /// Account id
    pub sub: Uuid,

    /// API key the token was issued against
    pub jti: String,

    /// Issuer, always "modest"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,
}

impl ApiClaims {
    /// Creates claims valid from now for `expires_in`
    pub fn new(account_id: Uuid, api_key: String, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: account_id,
            jti: api_key,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }
}

/// Signs claims with HS256
pub fn create_api_token(claims: &ApiClaims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, issuer, expiration and not-before
///
/// Whether the `jti` still matches the account's API key is checked by the
/// caller against storage.
pub fn validate_api_token(token: &str, secret: &str) -> Result<ApiClaims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<ApiClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
