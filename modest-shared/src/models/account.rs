/// Account model
///
/// An account is identified by a unique email (compared case-insensitively).
/// It holds an optional Argon2id password hash (absent for accounts created
/// through an external identity provider), a confirmation flag, a role name,
/// an optional billing customer id and a typed attribute record.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY,
///     email TEXT NOT NULL,            -- unique on LOWER(email)
///     password_hash TEXT,
///     confirmed BOOLEAN NOT NULL DEFAULT FALSE,
///     role TEXT NOT NULL DEFAULT 'owner',
///     name TEXT,
///     api_key TEXT,
///     billing_id TEXT,
///     extra JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Role assigned to new accounts
pub const DEFAULT_ROLE: &str = "owner";

/// Maximum length of a display name
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum number of free-form extension attributes
pub const MAX_EXTRA_ATTRIBUTES: usize = 32;

/// Attribute keys managed by the system; they cannot be set through
/// free-form metadata
const RESERVED_KEYS: [&str; 3] = ["api_key", "billing_id", "email"];

/// Typed account attributes
///
/// Known keys get their own field; `extra` holds anything else supplied at
/// signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAttributes {
    /// Display name
    pub name: Option<String>,

    /// Current API key; bearer tokens carrying a different key are rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Free-form extension data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Error raised when user-supplied metadata fails validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    #[error("name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    #[error("attribute '{0}' cannot be set")]
    Reserved(String),

    #[error("too many attributes (at most {MAX_EXTRA_ATTRIBUTES})")]
    TooMany,

    #[error("attribute keys must not be empty")]
    EmptyKey,
}

impl AccountAttributes {
    /// Builds attributes from an untyped metadata map
    ///
    /// `name` is lifted into its own field (blank names are dropped). Keys
    /// owned by the system are rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use modest_shared::models::account::AccountAttributes;
    ///
    /// let mut metadata = BTreeMap::new();
    /// metadata.insert("name".to_string(), "Ada".to_string());
    /// metadata.insert("company".to_string(), "Analytical".to_string());
    ///
    /// let attrs = AccountAttributes::from_metadata(metadata).unwrap();
    /// assert_eq!(attrs.name.as_deref(), Some("Ada"));
    /// assert_eq!(attrs.extra.get("company").map(String::as_str), Some("Analytical"));
    /// ```
    pub fn from_metadata(metadata: BTreeMap<String, String>) -> Result<Self, AttributeError> {
        let mut attrs = AccountAttributes::default();

        for (key, value) in metadata {
            let key = key.trim().to_string();
            if key.is_empty() {
                return Err(AttributeError::EmptyKey);
            }
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(AttributeError::Reserved(key));
            }

            if key == "name" {
                attrs.name = validate_name(&value)?;
            } else {
                attrs.extra.insert(key, value);
            }
        }

        if attrs.extra.len() > MAX_EXTRA_ATTRIBUTES {
            return Err(AttributeError::TooMany);
        }

        Ok(attrs)
    }
}

/// Normalizes a display name; blank becomes `None`
pub fn validate_name(name: &str) -> Result<Option<String>, AttributeError> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AttributeError::NameTooLong);
    }
    Ok(Some(name.to_string()))
}

/// An account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID (UUID v4)
    pub id: Uuid,

    /// Email address, stored as entered after trimming
    pub email: String,

    /// Argon2id hash; `None` for provider-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// Whether the email address has been confirmed
    pub confirmed: bool,

    /// Role name looked up in the role table
    pub role: String,

    /// Billing customer id once a checkout has completed
    pub billing_id: Option<String>,

    /// Typed attributes
    pub attributes: AccountAttributes,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: Option<String>,
    pub confirmed: bool,
    pub role: String,
    pub attributes: AccountAttributes,
}

/// Partial update; only `Some` fields are written
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub confirmed: Option<bool>,
    pub role: Option<String>,
    pub billing_id: Option<String>,

    /// `Some(None)` clears the name
    pub name: Option<Option<String>>,

    pub api_key: Option<String>,

    /// Replaces the free-form extension data
    pub extra: Option<BTreeMap<String, String>>,
}

impl Account {
    /// Builds an account record from creation input
    pub fn from_new(data: NewAccount) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: data.email,
            password_hash: data.password_hash,
            confirmed: data.confirmed,
            role: data.role,
            billing_id: None,
            attributes: data.attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update in place
    pub fn apply(&mut self, update: AccountUpdate) {
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(hash) = update.password_hash {
            self.password_hash = Some(hash);
        }
        if let Some(confirmed) = update.confirmed {
            self.confirmed = confirmed;
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(billing_id) = update.billing_id {
            self.billing_id = Some(billing_id);
        }
        if let Some(name) = update.name {
            self.attributes.name = name;
        }
        if let Some(api_key) = update.api_key {
            self.attributes.api_key = Some(api_key);
        }
        if let Some(extra) = update.extra {
            self.attributes.extra = extra;
        }
        self.updated_at = super::task::next_update_time(self.updated_at, Utc::now());
    }

    /// Whether the account can log in with a password
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Canonical form used for email lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
