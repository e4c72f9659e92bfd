/// One-time tokens
///
/// Confirmation links, recovery links, email change links, magic login links
/// and OAuth state values are all single-use tokens. Only a keyed hash of the
/// token is stored (see [`crate::auth::tokens::hash_token`]).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What a one-time token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Confirms the email of a new account
    Confirmation,

    /// Allows setting a new password
    Recovery,

    /// Confirms a new email address (payload = new email)
    EmailChange,

    /// Magic login link
    Passwordless,

    /// OAuth `state` parameter (payload = redirect target)
    OAuthState,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Confirmation => "confirmation",
            TokenKind::Recovery => "recovery",
            TokenKind::EmailChange => "email_change",
            TokenKind::Passwordless => "passwordless",
            TokenKind::OAuthState => "oauth_state",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(TokenKind::Confirmation),
            "recovery" => Ok(TokenKind::Recovery),
            "email_change" => Ok(TokenKind::EmailChange),
            "passwordless" => Ok(TokenKind::Passwordless),
            "oauth_state" => Ok(TokenKind::OAuthState),
            other => Err(format!("unknown token kind: {}", other)),
        }
    }
}

/// A stored one-time token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeToken {
    /// Keyed hash of the raw token
    pub hash: String,

    pub kind: TokenKind,

    /// Account the token acts on; `None` for OAuth state
    pub account_id: Option<Uuid>,

    /// Kind-specific data
    pub payload: Option<String>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn new(
        hash: String,
        kind: TokenKind,
        account_id: Option<Uuid>,
        payload: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            hash,
            kind,
            account_id,
            payload,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_kind_strings() {
        for kind in [
            TokenKind::Confirmation,
            TokenKind::Recovery,
            TokenKind::EmailChange,
            TokenKind::Passwordless,
            TokenKind::OAuthState,
        ] {
            assert_eq!(kind.as_str().parse::<TokenKind>(), Ok(kind));
        }
        assert!("session".parse::<TokenKind>().is_err());
    }

    #[test]
    fn test_token_expiry() {
        let token = OneTimeToken::new(
            "h".to_string(),
            TokenKind::Recovery,
            Some(Uuid::new_v4()),
            None,
            Duration::minutes(-1),
        );
        assert!(token.is_expired());
    }
}
