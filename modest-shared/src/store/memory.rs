/// In-memory storage
///
/// Each store keeps its records in a `tokio::sync::RwLock<HashMap>`. Every
/// check-and-write happens under a single write guard, which gives the same
/// atomicity the PostgreSQL implementation gets from single statements.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    parse_status, validate_task_text, AccountStore, SessionStore, StoreError, TaskStore,
    TokenStore,
};
use crate::auth::tokens::generate_id;
use crate::models::account::{normalize_email, Account, AccountUpdate, NewAccount};
use crate::models::session::Session;
use crate::models::task::Task;
use crate::models::token::{OneTimeToken, TokenKind};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

fn email_taken(accounts: &HashMap<Uuid, Account>, email: &str, except: Option<Uuid>) -> bool {
    let wanted = normalize_email(email);
    accounts
        .values()
        .any(|a| Some(a.id) != except && normalize_email(&a.email) == wanted)
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, data: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;

        if email_taken(&accounts, &data.email, None) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }

        let account = Account::from_new(data);
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let wanted = normalize_email(email);
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| normalize_email(&a.email) == wanted)
            .cloned())
    }

    async fn find_by_billing_id(&self, billing_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.billing_id.as_deref() == Some(billing_id))
            .cloned())
    }

    async fn update(&self, id: Uuid, update: AccountUpdate) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;

        if let Some(email) = &update.email {
            if email_taken(&accounts, email, Some(id)) {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }

        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.apply(update);
        Ok(account.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.accounts.write().await.remove(&id).is_some())
    }
}

#[derive(Default)]
struct TaskTable {
    next_seq: u64,
    rows: HashMap<String, (u64, Task)>,
}

#[derive(Default)]
pub struct MemoryTaskStore {
    table: RwLock<TaskTable>,
}

impl TaskTable {
    fn owned_mut(&mut self, owner: Uuid, id: &str) -> Result<&mut Task, StoreError> {
        match self.rows.get_mut(id) {
            Some((_, task)) if task.owner == owner => Ok(task),
            _ => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, owner: Uuid, text: &str) -> Result<Task, StoreError> {
        validate_task_text(text)?;

        let mut table = self.table.write().await;
        let task = Task::new(generate_id(), owner, text.to_string());
        let seq = table.next_seq;
        table.next_seq += 1;
        table.rows.insert(task.id.clone(), (seq, task.clone()));
        Ok(task)
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<Task>, StoreError> {
        let table = self.table.read().await;
        let mut rows: Vec<&(u64, Task)> = table
            .rows
            .values()
            .filter(|(_, task)| task.owner == owner)
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, task)| task.clone()).collect())
    }

    async fn find(&self, owner: Uuid, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .get(id)
            .filter(|(_, task)| task.owner == owner)
            .map(|(_, task)| task.clone()))
    }

    async fn owner_of(&self, id: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.table.read().await.rows.get(id).map(|(_, task)| task.owner))
    }

    async fn update_text(&self, owner: Uuid, id: &str, text: &str) -> Result<Task, StoreError> {
        validate_task_text(text)?;

        let mut table = self.table.write().await;
        let task = table.owned_mut(owner, id)?;
        task.text = text.to_string();
        task.touch();
        Ok(task.clone())
    }

    async fn update_status(&self, owner: Uuid, id: &str, status: &str) -> Result<Task, StoreError> {
        let status = parse_status(status)?;

        let mut table = self.table.write().await;
        let task = table.owned_mut(owner, id)?;
        task.status = status;
        task.touch();
        Ok(task.clone())
    }

    async fn delete(&self, owner: Uuid, id: &str) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        table.owned_mut(owner, id)?;
        table.rows.remove(id);
        Ok(())
    }

    async fn delete_for_owner(&self, owner: Uuid) -> Result<u64, StoreError> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|_, (_, task)| task.owner != owner);
        Ok((before - table.rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, OneTimeToken>>,
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, token: OneTimeToken) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;

        if let Some(account_id) = token.account_id {
            tokens.retain(|_, t| !(t.account_id == Some(account_id) && t.kind == token.kind));
        }
        tokens.retain(|_, t| !t.is_expired());

        tokens.insert(token.hash.clone(), token);
        Ok(())
    }

    async fn consume(&self, hash: &str, kind: TokenKind) -> Result<Option<OneTimeToken>, StoreError> {
        let mut tokens = self.tokens.write().await;

        match tokens.get(hash) {
            Some(token) if token.kind == kind => {}
            _ => return Ok(None),
        }

        Ok(tokens.remove(hash).filter(|token| !token.is_expired()))
    }

    async fn has_pending(&self, account_id: Uuid, kind: TokenKind) -> Result<bool, StoreError> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .any(|t| t.account_id == Some(account_id) && t.kind == kind && !t.is_expired()))
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.account_id != Some(account_id));
        Ok((before - tokens.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Ok(None),
                Some(session) if !session.is_expired() => return Ok(Some(session.clone())),
                Some(_) => {}
            }
        }

        self.sessions
            .write()
            .await
            .retain(|_, s| s.expires_at > Utc::now());
        Ok(None)
    }

    async fn set_form_token(&self, id: &str, token: Option<String>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(StoreError::NotFound)?;
        session.values.form_token = token;
        Ok(())
    }

    async fn take_form_token(&self, id: &str, token: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(id) {
            Some(session) if session.values.form_token.as_deref() == Some(token) => {
                session.values.form_token = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_current_price_id(&self, id: &str, price_id: Option<String>) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or(StoreError::NotFound)?;
        session.values.current_price_id = price_id;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - sessions.len()) as u64)
    }
}
