/// Server-side session records
///
/// The browser only holds the opaque session id in a cookie. The record binds
/// it to an account and carries a couple of scratch values used by the
/// account pages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-session scratch values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValues {
    /// Single-use token guarding the API token reset form
    pub form_token: Option<String>,

    /// Cached price id of the account's active subscription
    pub current_price_id: Option<String>,
}

/// A login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Random session id (cookie value)
    pub id: String,

    /// Authenticated account
    pub account_id: Uuid,

    pub values: SessionValues,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session that expires after `ttl`
    pub fn new(id: String, account_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id,
            values: SessionValues::default(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
