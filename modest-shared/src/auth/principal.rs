/// The authenticated identity behind a request
///
/// The API layer resolves a session cookie or a bearer token into a
/// `Principal` and stores it in the request extensions. Every authorization
/// decision is made against it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::Account;

/// How the principal authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Browser session cookie
    Session,

    /// `Authorization: Bearer` API token
    ApiToken,
}

/// Authenticated request identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub account_id: Uuid,

    /// Email at the time the request was authenticated
    pub email: String,

    /// Role name, resolved through the role table
    pub role: String,

    /// Session id when authenticated by cookie
    pub session_id: Option<String>,

    pub method: AuthMethod,
}

impl Principal {
    /// Principal for a cookie-authenticated request
    pub fn from_session(account: &Account, session_id: String) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            role: account.role.clone(),
            session_id: Some(session_id),
            method: AuthMethod::Session,
        }
    }

    /// Principal for a bearer-token request
    pub fn from_api_token(account: &Account) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            role: account.role.clone(),
            session_id: None,
            method: AuthMethod::ApiToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::{AccountAttributes, NewAccount, DEFAULT_ROLE};

    fn account() -> Account {
        Account::from_new(NewAccount {
            email: "a@x.com".to_string(),
            password_hash: None,
            confirmed: true,
            role: DEFAULT_ROLE.to_string(),
            attributes: AccountAttributes::default(),
        })
    }

    #[test]
    fn test_from_session() {
        let account = account();
        let principal = Principal::from_session(&account, "sid".to_string());

        assert_eq!(principal.account_id, account.id);
        assert_eq!(principal.role, "owner");
        assert_eq!(principal.session_id.as_deref(), Some("sid"));
        assert_eq!(principal.method, AuthMethod::Session);
    }

    #[test]
    fn test_from_api_token() {
        let principal = Principal::from_api_token(&account());

        assert!(principal.session_id.is_none());
        assert_eq!(principal.method, AuthMethod::ApiToken);
    }
}
