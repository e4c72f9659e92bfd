/// Account lifecycle
///
/// [`AccountService`] owns every state transition of an account:
///
/// ```text
/// Anonymous --signup--> Unconfirmed --confirm_email--> Confirmed
/// Confirmed --login / passwordless / provider--> Authenticated
/// Authenticated --request_email_change--> EmailChangeRequested --confirm--> Authenticated
/// Confirmed --request_recovery--> PasswordResetRequested --confirm_recovery--> Confirmed
/// Authenticated --logout / delete_account--> Anonymous
/// ```
///
/// States are not stored; [`AccountService::state`] derives them from the
/// account, its pending tokens and its session. One-time tokens are stored
/// hashed and consumed atomically, so every link works exactly once.
///
/// Requests for passwordless login and recovery never reveal whether an
/// email is registered.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::jwt::{create_api_token, validate_api_token, ApiClaims, JwtError};
use crate::auth::password::{hash_password, validate_password, verify_password, PasswordError};
use crate::auth::principal::Principal;
use crate::auth::rbac::RoleTable;
use crate::auth::tokens::{
    constant_time_compare, generate_api_key, generate_token, hash_token, is_well_formed,
};
use crate::mail::{MailError, MailKind, MailMessage, Mailer};
use crate::models::account::{
    normalize_email, validate_name, Account, AccountAttributes, AccountUpdate, NewAccount,
    DEFAULT_ROLE,
};
use crate::models::session::Session;
use crate::models::token::{OneTimeToken, TokenKind};
use crate::oauth::{IdentityProviders, OAuthError};
use crate::store::{StoreError, Stores};

/// Lifecycle error
///
/// Variants map onto the user-facing categories: `Validation`/`EmailTaken`
/// are input errors, `InvalidCredentials`/`NotConfirmed` are auth errors,
/// `InvalidToken` covers unknown, expired and consumed links.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account not confirmed")]
    NotConfirmed,

    #[error("link invalid or expired")]
    InvalidToken,

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AccountError::NotFound,
            StoreError::Validation(msg) => AccountError::Validation(msg),
            StoreError::Conflict(_) => AccountError::EmailTaken,
            StoreError::Database(msg) => AccountError::Internal(msg),
        }
    }
}

impl From<PasswordError> for AccountError {
    fn from(err: PasswordError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<MailError> for AccountError {
    fn from(err: MailError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<JwtError> for AccountError {
    fn from(err: JwtError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<OAuthError> for AccountError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(name) => {
                AccountError::Validation(format!("unknown provider: {}", name))
            }
            OAuthError::Rejected(_) => AccountError::InvalidToken,
            OAuthError::UnverifiedEmail => AccountError::InvalidCredentials,
            OAuthError::Request(msg) | OAuthError::InvalidConfig(msg) => AccountError::Internal(msg),
        }
    }
}

/// Derived account state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Anonymous,
    Unconfirmed,
    Confirmed,
    Authenticated,
    PasswordResetRequested,
    EmailChangeRequested,
}

/// Lifetimes of tokens and sessions
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub confirmation_ttl: Duration,
    pub recovery_ttl: Duration,
    pub email_change_ttl: Duration,
    pub passwordless_ttl: Duration,
    pub oauth_state_ttl: Duration,
    pub session_ttl: Duration,
    pub api_token_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            confirmation_ttl: Duration::hours(48),
            recovery_ttl: Duration::minutes(60),
            email_change_ttl: Duration::hours(24),
            passwordless_ttl: Duration::minutes(15),
            oauth_state_ttl: Duration::minutes(10),
            session_ttl: Duration::days(7),
            api_token_ttl: Duration::days(365),
        }
    }
}

impl TokenPolicy {
    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Confirmation => self.confirmation_ttl,
            TokenKind::Recovery => self.recovery_ttl,
            TokenKind::EmailChange => self.email_change_ttl,
            TokenKind::Passwordless => self.passwordless_ttl,
            TokenKind::OAuthState => self.oauth_state_ttl,
        }
    }
}

/// Settings of the lifecycle service
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Product name used in mail
    pub app_name: String,

    /// Public base URL, used for links and OAuth redirects
    pub domain: String,

    /// Key for hashing one-time tokens
    pub session_secret: String,

    /// Key for signing API tokens
    pub api_secret: String,

    pub policy: TokenPolicy,
}

/// A fresh login
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub account: Account,
    pub session: Session,

    /// Where to send the browser afterwards, if the login asked for it
    pub from: Option<String>,
}

/// Result of an API key reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyReset {
    /// A new key was stored; `token` is the signed bearer token for it
    Issued { token: String },

    /// The form token was missing or already used; nothing changed
    Replayed,
}

#[derive(Serialize, Deserialize)]
struct OAuthState {
    provider: String,
    from: Option<String>,
}

/// Account lifecycle service
#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    mailer: Arc<dyn Mailer>,
    providers: IdentityProviders,
    roles: Arc<RoleTable>,
    settings: Arc<LifecycleSettings>,
}

impl AccountService {
    pub fn new(
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        providers: IdentityProviders,
        roles: Arc<RoleTable>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            stores,
            mailer,
            providers,
            roles,
            settings: Arc::new(settings),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.names()
    }

    /// The account, or `NotFound`
    pub async fn account(&self, account_id: Uuid) -> Result<Account, AccountError> {
        self.stores
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// Creates an unconfirmed account and mails a confirmation link
    ///
    /// Signing up again for an email that was never confirmed replaces the
    /// pending registration: new password and metadata, and a fresh link that
    /// supersedes the earlier one. Only confirmed emails conflict.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Account, AccountError> {
        let email = validate_email(email)?;
        validate_password(password).map_err(AccountError::Validation)?;
        let attributes = AccountAttributes::from_metadata(metadata)
            .map_err(|e| AccountError::Validation(e.to_string()))?;
        let password_hash = hash_password(password)?;

        let account = match self.stores.accounts.find_by_email(&email).await? {
            Some(existing) if existing.confirmed => return Err(AccountError::EmailTaken),
            Some(existing) => {
                self.stores.tokens.delete_for_account(existing.id).await?;
                let account = self
                    .stores
                    .accounts
                    .update(
                        existing.id,
                        AccountUpdate {
                            password_hash: Some(password_hash),
                            name: Some(attributes.name),
                            extra: Some(attributes.extra),
                            ..Default::default()
                        },
                    )
                    .await?;

                info!(account_id = %account.id, "Pending signup replaced");
                account
            }
            None => {
                let account = self
                    .stores
                    .accounts
                    .create(NewAccount {
                        email,
                        password_hash: Some(password_hash),
                        confirmed: false,
                        role: DEFAULT_ROLE.to_string(),
                        attributes,
                    })
                    .await?;

                info!(account_id = %account.id, "Account created");
                account
            }
        };

        let raw = self
            .issue_token(TokenKind::Confirmation, Some(account.id), None)
            .await?;
        self.send_mail(MailKind::Confirmation, &account.email, &account, &raw)
            .await?;

        Ok(account)
    }

    /// Marks the account behind a confirmation link as confirmed
    pub async fn confirm_email(&self, token: &str) -> Result<Account, AccountError> {
        let stored = self.consume_token(token, TokenKind::Confirmation).await?;
        let account_id = stored.account_id.ok_or(AccountError::InvalidToken)?;

        let account = self
            .stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    confirmed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AccountError::InvalidToken,
                other => other.into(),
            })?;

        info!(account_id = %account.id, "Account confirmed");
        Ok(account)
    }

    /// Password login
    ///
    /// Unknown emails, password-less accounts and wrong passwords all fail
    /// with the same `InvalidCredentials`. Only a correct password on an
    /// unconfirmed account reports `NotConfirmed`.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoggedIn, AccountError> {
        let account = self
            .stores
            .accounts
            .find_by_email(email.trim())
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        let hash = account
            .password_hash
            .as_deref()
            .ok_or(AccountError::InvalidCredentials)?;
        if !verify_password(password, hash)? {
            debug!(account_id = %account.id, "Password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        if !account.confirmed {
            return Err(AccountError::NotConfirmed);
        }

        self.start_session(account, None).await
    }

    /// Mails a magic login link; a no-op for unknown or unconfirmed emails
    pub async fn request_passwordless(&self, email: &str) -> Result<(), AccountError> {
        let Some(account) = self.stores.accounts.find_by_email(email.trim()).await? else {
            debug!("Passwordless login requested for unknown email");
            return Ok(());
        };
        if !account.confirmed {
            debug!(account_id = %account.id, "Passwordless login requested for unconfirmed account");
            return Ok(());
        }

        let raw = self
            .issue_token(TokenKind::Passwordless, Some(account.id), None)
            .await?;
        self.send_mail(MailKind::Passwordless, &account.email, &account, &raw)
            .await
    }

    pub async fn login_with_passwordless(&self, code: &str) -> Result<LoggedIn, AccountError> {
        let stored = self.consume_token(code, TokenKind::Passwordless).await?;
        let account = self.token_account(&stored).await?;

        self.start_session(account, None).await
    }

    /// URL of the provider's consent page
    ///
    /// The `from` redirect target rides along in the state token.
    pub async fn begin_provider_login(
        &self,
        provider: &str,
        from: Option<&str>,
    ) -> Result<String, AccountError> {
        let idp = self.providers.get(provider)?;

        let state = serde_json::to_string(&OAuthState {
            provider: provider.to_string(),
            from: from.and_then(safe_redirect),
        })
        .map_err(|e| AccountError::Internal(e.to_string()))?;
        let raw = self
            .issue_token(TokenKind::OAuthState, None, Some(state))
            .await?;

        Ok(idp.authorize_url(&raw, &self.callback_url(provider))?)
    }

    /// Completes a provider login
    ///
    /// The first login for an email creates a confirmed account without a
    /// password. An existing unconfirmed account is discarded and recreated
    /// the same way.
    pub async fn provider_callback(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<LoggedIn, AccountError> {
        let stored = self.consume_token(state, TokenKind::OAuthState).await?;
        let state: OAuthState = stored
            .payload
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .ok_or(AccountError::InvalidToken)?;
        if state.provider != provider {
            return Err(AccountError::InvalidToken);
        }

        let idp = self.providers.get(provider)?;
        let identity = idp.exchange(code, &self.callback_url(provider)).await?;

        let account = match self.stores.accounts.find_by_email(&identity.email).await? {
            Some(account) if account.confirmed => account,
            existing => {
                // An unconfirmed registration never proved ownership of the
                // address; its password and links must not survive.
                if let Some(pending) = existing {
                    self.delete_account(pending.id).await?;
                    warn!(account_id = %pending.id, provider = %provider, "Unconfirmed account replaced by provider login");
                }

                let name = identity
                    .name
                    .as_deref()
                    .map(validate_name)
                    .transpose()
                    .ok()
                    .flatten()
                    .flatten();
                let account = self
                    .stores
                    .accounts
                    .create(NewAccount {
                        email: validate_email(&identity.email)?,
                        password_hash: None,
                        confirmed: true,
                        role: DEFAULT_ROLE.to_string(),
                        attributes: AccountAttributes {
                            name,
                            ..Default::default()
                        },
                    })
                    .await?;
                info!(account_id = %account.id, provider = %provider, "Account created from provider");
                account
            }
        };

        self.start_session(account, state.from).await
    }

    /// Mails a confirmation link to `new_email`; the stored email is not
    /// touched until the link is followed
    pub async fn request_email_change(
        &self,
        account_id: Uuid,
        new_email: &str,
    ) -> Result<(), AccountError> {
        let account = self.account(account_id).await?;
        let new_email = validate_email(new_email)?;

        if normalize_email(&new_email) == normalize_email(&account.email) {
            return Err(AccountError::Validation("email is unchanged".to_string()));
        }
        if self.stores.accounts.find_by_email(&new_email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let raw = self
            .issue_token(TokenKind::EmailChange, Some(account.id), Some(new_email.clone()))
            .await?;
        self.send_mail(MailKind::ChangeEmail, &new_email, &account, &raw)
            .await?;

        info!(account_id = %account.id, "Email change requested");
        Ok(())
    }

    pub async fn confirm_email_change(&self, token: &str) -> Result<Account, AccountError> {
        let stored = self.consume_token(token, TokenKind::EmailChange).await?;
        let account_id = stored.account_id.ok_or(AccountError::InvalidToken)?;
        let new_email = stored.payload.ok_or(AccountError::InvalidToken)?;

        let account = self
            .stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    email: Some(new_email),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AccountError::InvalidToken,
                other => other.into(),
            })?;

        info!(account_id = %account.id, "Email changed");
        Ok(account)
    }

    /// Mails a password reset link; a no-op for unknown or unconfirmed emails
    pub async fn request_recovery(&self, email: &str) -> Result<(), AccountError> {
        let Some(account) = self.stores.accounts.find_by_email(email.trim()).await? else {
            debug!("Recovery requested for unknown email");
            return Ok(());
        };
        if !account.confirmed {
            debug!(account_id = %account.id, "Recovery requested for unconfirmed account");
            return Ok(());
        }

        let raw = self
            .issue_token(TokenKind::Recovery, Some(account.id), None)
            .await?;
        self.send_mail(MailKind::Recovery, &account.email, &account, &raw)
            .await
    }

    /// Sets a new password and ends every session of the account
    ///
    /// The password is validated before the token is consumed, so a rejected
    /// password leaves the link usable.
    pub async fn confirm_recovery(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<Account, AccountError> {
        validate_password(new_password).map_err(AccountError::Validation)?;

        let stored = self.consume_token(token, TokenKind::Recovery).await?;
        let account = self.token_account(&stored).await?;

        let account = self
            .stores
            .accounts
            .update(
                account.id,
                AccountUpdate {
                    password_hash: Some(hash_password(new_password)?),
                    ..Default::default()
                },
            )
            .await?;
        let ended = self.stores.sessions.delete_for_account(account.id).await?;

        info!(account_id = %account.id, sessions_ended = ended, "Password reset");
        Ok(account)
    }

    /// Idempotent
    pub async fn logout(&self, session_id: &str) -> Result<(), AccountError> {
        self.stores.sessions.delete(session_id).await?;
        Ok(())
    }

    /// Removes the account with its tasks, tokens and sessions
    pub async fn delete_account(&self, account_id: Uuid) -> Result<(), AccountError> {
        let tasks = self.stores.tasks.delete_for_owner(account_id).await?;
        self.stores.tokens.delete_for_account(account_id).await?;
        self.stores.sessions.delete_for_account(account_id).await?;

        if !self.stores.accounts.delete(account_id).await? {
            return Err(AccountError::NotFound);
        }

        info!(account_id = %account_id, tasks_removed = tasks, "Account deleted");
        Ok(())
    }

    /// Sets the display name; blank clears it
    pub async fn update_profile(&self, account_id: Uuid, name: &str) -> Result<Account, AccountError> {
        let name = validate_name(name).map_err(|e| AccountError::Validation(e.to_string()))?;

        Ok(self
            .stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    name: Some(name),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Issues a fresh form token for the session, replacing the previous one
    pub async fn issue_form_token(&self, session_id: &str) -> Result<String, AccountError> {
        let token = generate_token();
        self.stores
            .sessions
            .set_form_token(session_id, Some(token.clone()))
            .await?;
        Ok(token)
    }

    /// Rotates the API key if `form_token` is the session's pending token
    ///
    /// The token is consumed with a compare-and-clear, so of two identical
    /// submissions only one rotates the key; the other gets `Replayed`.
    pub async fn reset_api_key(
        &self,
        account_id: Uuid,
        session_id: &str,
        form_token: &str,
    ) -> Result<ApiKeyReset, AccountError> {
        if form_token.is_empty()
            || !self
                .stores
                .sessions
                .take_form_token(session_id, form_token)
                .await?
        {
            debug!(account_id = %account_id, "Replayed API key reset ignored");
            return Ok(ApiKeyReset::Replayed);
        }

        let api_key = generate_api_key();
        self.stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    api_key: Some(api_key.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let claims = ApiClaims::new(account_id, api_key, self.settings.policy.api_token_ttl);
        let token = create_api_token(&claims, &self.settings.api_secret)?;

        info!(account_id = %account_id, "API key rotated");
        Ok(ApiKeyReset::Issued { token })
    }

    pub async fn set_billing_id(
        &self,
        account_id: Uuid,
        billing_id: &str,
    ) -> Result<Account, AccountError> {
        if billing_id.trim().is_empty() {
            return Err(AccountError::Validation("billing id is required".to_string()));
        }

        Ok(self
            .stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    billing_id: Some(billing_id.to_string()),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Links a billing customer to the account registered under `email`
    ///
    /// Returns `None` when no such account exists.
    pub async fn link_billing_by_email(
        &self,
        email: &str,
        billing_id: &str,
    ) -> Result<Option<Account>, AccountError> {
        match self.stores.accounts.find_by_email(email.trim()).await? {
            Some(account) => Ok(Some(self.set_billing_id(account.id, billing_id).await?)),
            None => {
                warn!(billing_id = %billing_id, "No account for billing email");
                Ok(None)
            }
        }
    }

    /// Assigns a role known to the role table
    pub async fn change_role(&self, account_id: Uuid, role: &str) -> Result<Account, AccountError> {
        if !self.roles.has_role(role) {
            return Err(AccountError::Validation(format!("unknown role: {}", role)));
        }

        let account = self
            .stores
            .accounts
            .update(
                account_id,
                AccountUpdate {
                    role: Some(role.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        info!(account_id = %account.id, role = %role, "Role changed");
        Ok(account)
    }

    /// Derives the lifecycle state of an account
    ///
    /// A missing account is `Anonymous`. Pending email change and recovery
    /// take precedence over the session state.
    pub async fn state(
        &self,
        account_id: Uuid,
        session_id: Option<&str>,
    ) -> Result<AccountState, AccountError> {
        let Some(account) = self.stores.accounts.find_by_id(account_id).await? else {
            return Ok(AccountState::Anonymous);
        };

        if !account.confirmed {
            return Ok(AccountState::Unconfirmed);
        }

        let tokens = &self.stores.tokens;
        if tokens.has_pending(account.id, TokenKind::EmailChange).await? {
            return Ok(AccountState::EmailChangeRequested);
        }
        if tokens.has_pending(account.id, TokenKind::Recovery).await? {
            return Ok(AccountState::PasswordResetRequested);
        }

        if let Some(session_id) = session_id {
            if let Some(session) = self.stores.sessions.get(session_id).await? {
                if session.account_id == account.id {
                    return Ok(AccountState::Authenticated);
                }
            }
        }

        Ok(AccountState::Confirmed)
    }

    /// Resolves a session cookie to its principal and live session
    pub async fn resolve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<(Principal, Session)>, AccountError> {
        if !is_well_formed(session_id) {
            return Ok(None);
        }

        let Some(session) = self.stores.sessions.get(session_id).await? else {
            return Ok(None);
        };

        match self.stores.accounts.find_by_id(session.account_id).await? {
            Some(account) => Ok(Some((Principal::from_session(&account, session.id.clone()), session))),
            None => {
                self.stores.sessions.delete(&session.id).await?;
                Ok(None)
            }
        }
    }

    /// Resolves a bearer API token to its principal
    ///
    /// The token must carry the account's current API key.
    pub async fn resolve_api_token(&self, token: &str) -> Result<Option<Principal>, AccountError> {
        let claims = match validate_api_token(token, &self.settings.api_secret) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Rejected API token");
                return Ok(None);
            }
        };

        let Some(account) = self.stores.accounts.find_by_id(claims.sub).await? else {
            return Ok(None);
        };

        match account.attributes.api_key.as_deref() {
            Some(key) if constant_time_compare(key, &claims.jti) => {
                Ok(Some(Principal::from_api_token(&account)))
            }
            _ => {
                debug!(account_id = %account.id, "API token for rotated key");
                Ok(None)
            }
        }
    }

    async fn start_session(
        &self,
        account: Account,
        from: Option<String>,
    ) -> Result<LoggedIn, AccountError> {
        let session = Session::new(generate_token(), account.id, self.settings.policy.session_ttl);
        self.stores.sessions.create(session.clone()).await?;

        info!(account_id = %account.id, "Logged in");
        Ok(LoggedIn {
            account,
            session,
            from,
        })
    }

    async fn issue_token(
        &self,
        kind: TokenKind,
        account_id: Option<Uuid>,
        payload: Option<String>,
    ) -> Result<String, AccountError> {
        let raw = generate_token();
        let token = OneTimeToken::new(
            hash_token(&self.settings.session_secret, &raw),
            kind,
            account_id,
            payload,
            self.settings.policy.ttl(kind),
        );
        self.stores.tokens.insert(token).await?;
        Ok(raw)
    }

    async fn consume_token(&self, raw: &str, kind: TokenKind) -> Result<OneTimeToken, AccountError> {
        if !is_well_formed(raw) {
            return Err(AccountError::InvalidToken);
        }

        let hash = hash_token(&self.settings.session_secret, raw);
        self.stores
            .tokens
            .consume(&hash, kind)
            .await?
            .ok_or(AccountError::InvalidToken)
    }

    async fn token_account(&self, token: &OneTimeToken) -> Result<Account, AccountError> {
        let account_id = token.account_id.ok_or(AccountError::InvalidToken)?;
        self.stores
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AccountError::InvalidToken)
    }

    async fn send_mail(
        &self,
        kind: MailKind,
        to: &str,
        account: &Account,
        raw: &str,
    ) -> Result<(), AccountError> {
        let message = MailMessage::compose(
            kind,
            to,
            account.attributes.name.as_deref(),
            &self.settings.app_name,
            &self.settings.domain,
            raw,
        );

        self.mailer.send(message).await.map_err(|e| {
            warn!(account_id = %account.id, kind = ?kind, error = %e, "Mail send failed");
            AccountError::from(e)
        })
    }

    fn callback_url(&self, provider: &str) -> String {
        format!(
            "{}/auth/callback?provider={}",
            self.settings.domain.trim_end_matches('/'),
            provider
        )
    }
}

/// Trims and checks the shape of an email address
pub fn validate_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AccountError::Validation("email is required".to_string()));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AccountError::Validation("email is invalid".to_string()));
    }

    Ok(email.to_string())
}

/// Accepts only same-site relative redirect targets
///
/// ```
/// use modest_shared::lifecycle::safe_redirect;
///
/// assert_eq!(safe_redirect("/account"), Some("/account".to_string()));
/// assert_eq!(safe_redirect("//evil.example"), None);
/// assert_eq!(safe_redirect("https://evil.example"), None);
/// ```
pub fn safe_redirect(from: &str) -> Option<String> {
    let from = from.trim();
    if from.starts_with('/') && !from.starts_with("//") && !from.contains('\\') {
        Some(from.to_string())
    } else {
        None
    }
}
