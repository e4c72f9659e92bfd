/// Storage traits and implementations
///
/// Every persistent concern sits behind an async trait so the service layer
/// and the HTTP layer never see the backing engine:
///
/// - [`AccountStore`]: accounts, unique by case-insensitive email
/// - [`TaskStore`]: tasks, every query filtered by owner
/// - [`TokenStore`]: hashed single-use tokens with atomic consumption
/// - [`SessionStore`]: login sessions and their scratch values
///
/// Two implementations exist: [`memory`] (default, also used by tests) and
/// [`postgres`]. [`Stores`] bundles one of each behind `Arc`s.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::account::{Account, AccountUpdate, NewAccount};
use crate::models::session::Session;
use crate::models::task::{Task, TaskStatus};
use crate::models::token::{OneTimeToken, TokenKind};

pub mod memory;
pub mod postgres;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record does not exist or is not visible to the caller
    #[error("not found")]
    NotFound,

    /// Input rejected before any write happened
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation
    #[error("{0}")]
    Conflict(String),

    /// Backend failure
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict("record already exists".to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts an account; `Conflict` if the email is taken
    async fn create(&self, data: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_billing_id(&self, billing_id: &str) -> Result<Option<Account>, StoreError>;

    /// Applies a partial update; `NotFound` for unknown ids, `Conflict` when
    /// the new email belongs to another account
    async fn update(&self, id: Uuid, update: AccountUpdate) -> Result<Account, StoreError>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a task with status `todo`; blank text is a validation error
    async fn create(&self, owner: Uuid, text: &str) -> Result<Task, StoreError>;

    /// All tasks of `owner`, oldest first
    async fn list(&self, owner: Uuid) -> Result<Vec<Task>, StoreError>;

    /// The task, if it exists and belongs to `owner`
    async fn find(&self, owner: Uuid, id: &str) -> Result<Option<Task>, StoreError>;

    /// Owner of a task regardless of caller; used by the ownership matcher
    async fn owner_of(&self, id: &str) -> Result<Option<Uuid>, StoreError>;

    /// `NotFound` if the task is missing or owned by someone else
    async fn update_text(&self, owner: Uuid, id: &str, text: &str) -> Result<Task, StoreError>;

    /// `Validation` for an unknown status string; the task is left untouched
    async fn update_status(&self, owner: Uuid, id: &str, status: &str) -> Result<Task, StoreError>;

    async fn delete(&self, owner: Uuid, id: &str) -> Result<(), StoreError>;

    /// Removes every task of `owner`, returning how many were removed
    async fn delete_for_owner(&self, owner: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores a token, dropping older tokens of the same kind for the same
    /// account
    async fn insert(&self, token: OneTimeToken) -> Result<(), StoreError>;

    /// Atomically removes and returns the token with this hash and kind
    ///
    /// Expired tokens are removed and reported as `None`, as are tokens of
    /// another kind (which stay in place).
    async fn consume(&self, hash: &str, kind: TokenKind) -> Result<Option<OneTimeToken>, StoreError>;

    /// Whether an unexpired token of `kind` exists for the account
    async fn has_pending(&self, account_id: Uuid, kind: TokenKind) -> Result<bool, StoreError>;

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    /// The live session; expired sessions are removed and reported as `None`
    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Replaces the pending form token
    async fn set_form_token(&self, id: &str, token: Option<String>) -> Result<(), StoreError>;

    /// Atomically clears the form token if it equals `token`
    ///
    /// Returns `true` for exactly one caller per issued token.
    async fn take_form_token(&self, id: &str, token: &str) -> Result<bool, StoreError>;

    async fn set_current_price_id(&self, id: &str, price_id: Option<String>) -> Result<(), StoreError>;

    /// Idempotent
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError>;
}

/// Backing engine of a [`Stores`] bundle
#[derive(Clone)]
pub enum Backend {
    Memory,
    Postgres(sqlx::PgPool),
}

/// One store of each kind, sharing a backend
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub backend: Backend,
}

impl Stores {
    /// In-memory stores; all data is lost on restart
    pub fn memory() -> Self {
        Self {
            accounts: Arc::new(memory::MemoryAccountStore::default()),
            tasks: Arc::new(memory::MemoryTaskStore::default()),
            tokens: Arc::new(memory::MemoryTokenStore::default()),
            sessions: Arc::new(memory::MemorySessionStore::default()),
            backend: Backend::Memory,
        }
    }

    /// PostgreSQL stores sharing one pool
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            accounts: Arc::new(postgres::PgAccountStore::new(pool.clone())),
            tasks: Arc::new(postgres::PgTaskStore::new(pool.clone())),
            tokens: Arc::new(postgres::PgTokenStore::new(pool.clone())),
            sessions: Arc::new(postgres::PgSessionStore::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    /// Name of the backend, for logs and the health endpoint
    pub fn driver(&self) -> &'static str {
        match self.backend {
            Backend::Memory => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }

    /// Checks that the backend is reachable
    pub async fn ping(&self) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory => Ok(()),
            Backend::Postgres(pool) => Ok(crate::db::pool::health_check(pool).await?),
        }
    }
}

/// Rejects blank task text
pub(crate) fn validate_task_text(text: &str) -> Result<(), StoreError> {
    if text.trim().is_empty() {
        return Err(StoreError::Validation("text is required".to_string()));
    }
    Ok(())
}

/// Parses a status string into a validation error on failure
pub(crate) fn parse_status(status: &str) -> Result<TaskStatus, StoreError> {
    status
        .parse::<TaskStatus>()
        .map_err(|e| StoreError::Validation(e.to_string()))
}
