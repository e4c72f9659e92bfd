/// PostgreSQL storage
///
/// Runtime-checked `sqlx` queries against the schema in
/// `modest-shared/migrations/`. Every check-and-write is a single statement
/// (`DELETE ... RETURNING`, `UPDATE ... WHERE`), so token consumption and
/// form-token use are atomic without explicit locking.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    parse_status, validate_task_text, AccountStore, SessionStore, StoreError, TaskStore,
    TokenStore,
};
use crate::auth::tokens::generate_id;
use crate::models::account::{Account, AccountAttributes, AccountUpdate, NewAccount};
use crate::models::session::{Session, SessionValues};
use crate::models::task::{Task, TaskStatus};
use crate::models::token::{OneTimeToken, TokenKind};

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, confirmed, role, name, api_key, \
                               billing_id, extra, created_at, updated_at";

const TASK_COLUMNS: &str = "id, owner, text, status, created_at, updated_at";

const TOKEN_COLUMNS: &str = "hash, kind, account_id, payload, created_at, expires_at";

const SESSION_COLUMNS: &str = "id, account_id, form_token, current_price_id, created_at, expires_at";

fn row_to_account(row: &PgRow) -> Result<Account, StoreError> {
    let extra: Json<BTreeMap<String, String>> = row.try_get("extra")?;

    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        confirmed: row.try_get("confirmed")?,
        role: row.try_get("role")?,
        billing_id: row.try_get("billing_id")?,
        attributes: AccountAttributes {
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
            extra: extra.0,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_task(row: &PgRow) -> Result<Task, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<TaskStatus>()
        .map_err(|e| StoreError::Database(format!("corrupt task row: {}", e)))?;

    Ok(Task {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        text: row.try_get("text")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_token(row: &PgRow) -> Result<OneTimeToken, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<TokenKind>()
        .map_err(|e| StoreError::Database(format!("corrupt token row: {}", e)))?;

    Ok(OneTimeToken {
        hash: row.try_get("hash")?,
        kind,
        account_id: row.try_get("account_id")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn row_to_session(row: &PgRow) -> Result<Session, StoreError> {
    Ok(Session {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        values: SessionValues {
            form_token: row.try_get("form_token")?,
            current_price_id: row.try_get("current_price_id")?,
        },
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn email_conflict(err: sqlx::Error) -> StoreError {
    match StoreError::from(err) {
        StoreError::Conflict(_) => StoreError::Conflict("email already registered".to_string()),
        other => other,
    }
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, data: NewAccount) -> Result<Account, StoreError> {
        let account = Account::from_new(data);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO accounts (id, email, password_hash, confirmed, role, name, api_key,
                                  billing_id, extra, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.confirmed)
        .bind(&account.role)
        .bind(&account.attributes.name)
        .bind(&account.attributes.api_key)
        .bind(&account.billing_id)
        .bind(Json(&account.attributes.extra))
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(email_conflict)?;

        row_to_account(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE LOWER(email) = LOWER($1)",
            ACCOUNT_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_billing_id(&self, billing_id: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE billing_id = $1 LIMIT 1",
            ACCOUNT_COLUMNS
        ))
        .bind(billing_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn update(&self, id: Uuid, update: AccountUpdate) -> Result<Account, StoreError> {
        let (set_name, name) = match update.name {
            Some(name) => (true, name),
            None => (false, None),
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts SET
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                confirmed = COALESCE($4, confirmed),
                role = COALESCE($5, role),
                billing_id = COALESCE($6, billing_id),
                name = CASE WHEN $7 THEN $8 ELSE name END,
                api_key = COALESCE($9, api_key),
                extra = COALESCE($10, extra),
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .bind(update.email)
        .bind(update.password_hash)
        .bind(update.confirmed)
        .bind(update.role)
        .bind(update.billing_id)
        .bind(set_name)
        .bind(name)
        .bind(update.api_key)
        .bind(update.extra.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(email_conflict)?
        .ok_or(StoreError::NotFound)?;

        row_to_account(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, owner: Uuid, text: &str) -> Result<Task, StoreError> {
        validate_task_text(text)?;

        let task = Task::new(generate_id(), owner, text.to_string());
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (id, owner, text, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(task.owner)
        .bind(&task.text)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_task(&row)
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE owner = $1 ORDER BY created_at, id",
            TASK_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn find(&self, owner: Uuid, id: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND owner = $2",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn owner_of(&self, id: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(sqlx::query_scalar("SELECT owner FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_text(&self, owner: Uuid, id: &str, text: &str) -> Result<Task, StoreError> {
        validate_task_text(text)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET text = $3, updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND owner = $2
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        row_to_task(&row)
    }

    async fn update_status(&self, owner: Uuid, id: &str, status: &str) -> Result<Task, StoreError> {
        let status = parse_status(status)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = $3, updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND owner = $2
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(owner)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        row_to_task(&row)
    }

    async fn delete(&self, owner: Uuid, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND owner = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_for_owner(&self, owner: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE owner = $1")
            .bind(owner)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: OneTimeToken) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(account_id) = token.account_id {
            sqlx::query("DELETE FROM one_time_tokens WHERE account_id = $1 AND kind = $2")
                .bind(account_id)
                .bind(token.kind.as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM one_time_tokens WHERE expires_at <= NOW()")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO one_time_tokens (hash, kind, account_id, payload, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&token.hash)
        .bind(token.kind.as_str())
        .bind(token.account_id)
        .bind(&token.payload)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn consume(&self, hash: &str, kind: TokenKind) -> Result<Option<OneTimeToken>, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM one_time_tokens WHERE hash = $1 AND kind = $2 RETURNING {}",
            TOKEN_COLUMNS
        ))
        .bind(hash)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let token = row.as_ref().map(row_to_token).transpose()?;
        Ok(token.filter(|t| !t.is_expired()))
    }

    async fn has_pending(&self, account_id: Uuid, kind: TokenKind) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM one_time_tokens
                WHERE account_id = $1 AND kind = $2 AND expires_at > NOW()
            )
            "#,
        )
        .bind(account_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM one_time_tokens WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, form_token, current_price_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&session.id)
        .bind(session.account_id)
        .bind(&session.values.form_token)
        .bind(&session.values.current_price_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(session) = row.as_ref().map(row_to_session).transpose()? else {
            return Ok(None);
        };

        if session.is_expired() {
            sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn set_form_token(&self, id: &str, token: Option<String>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET form_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn take_form_token(&self, id: &str, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET form_token = NULL WHERE id = $1 AND form_token = $2",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_current_price_id(&self, id: &str, price_id: Option<String>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET current_price_id = $2 WHERE id = $1")
            .bind(id)
            .bind(price_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
