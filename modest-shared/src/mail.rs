/// Outbound mail
///
/// The account lifecycle sends four kinds of mail, each carrying a single-use
/// link. Delivery sits behind the [`Mailer`] trait; the shipped
/// [`LogMailer`] writes messages to the log, and [`MemoryMailer`] keeps them
/// in memory for tests. Send failures are reported to the caller and never
/// retried here.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info};

/// Mail delivery error
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Purpose of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailKind {
    Confirmation,
    Recovery,
    ChangeEmail,
    Passwordless,
}

impl MailKind {
    /// Path prefix of the link embedded in the message
    pub fn link_path(&self) -> &'static str {
        match self {
            MailKind::Confirmation => "/confirm",
            MailKind::Recovery => "/reset",
            MailKind::ChangeEmail => "/change",
            MailKind::Passwordless => "/magic-login",
        }
    }

    fn subject(&self, app_name: &str) -> String {
        match self {
            MailKind::Confirmation => format!("Welcome to {}!", app_name),
            MailKind::Recovery => format!("Reset password on {}", app_name),
            MailKind::ChangeEmail => format!("Change email on {}", app_name),
            MailKind::Passwordless => format!("Magic link to log into {}", app_name),
        }
    }

    fn intro(&self, app_name: &str) -> String {
        match self {
            MailKind::Confirmation => format!(
                "Welcome to {}! Please confirm your account by opening the link below.",
                app_name
            ),
            MailKind::Recovery => format!(
                "A password reset was requested for your {} account. Open the link below to choose a new password.",
                app_name
            ),
            MailKind::ChangeEmail => {
                "A change of the email linked to your account was requested. Open the link below to confirm it.".to_string()
            }
            MailKind::Passwordless => format!(
                "A magic login link was requested for your {} account. Open the link below to log in.",
                app_name
            ),
        }
    }
}

/// A composed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub kind: MailKind,
    pub subject: String,

    /// Absolute link containing the raw token
    pub link: String,

    /// Plain-text body
    pub body: String,
}

impl MailMessage {
    /// Composes a message for `kind` linking to `{domain}{path}/{token}`
    pub fn compose(
        kind: MailKind,
        to: &str,
        name: Option<&str>,
        app_name: &str,
        domain: &str,
        token: &str,
    ) -> Self {
        let link = format!(
            "{}{}/{}",
            domain.trim_end_matches('/'),
            kind.link_path(),
            token
        );
        let greeting = match name {
            Some(name) if !name.is_empty() => format!("Hi {},", name),
            _ => "Hi,".to_string(),
        };
        let body = format!(
            "{}\n\n{}\n\n{}\n\nIf you did not request this, no further action is required.\n",
            greeting,
            kind.intro(app_name),
            link
        );

        Self {
            to: to.to_string(),
            kind,
            subject: kind.subject(app_name),
            link,
            body,
        }
    }

    /// The raw token at the end of the link
    pub fn token(&self) -> &str {
        self.link.rsplit('/').next().unwrap_or_default()
    }
}

/// Mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        info!(
            from = %self.from,
            to = %message.to,
            kind = ?message.kind,
            subject = %message.subject,
            "Mail dispatched"
        );
        debug!(link = %message.link, "Mail link");
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent so far
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Token of the most recent message of `kind` sent to `to`
    pub fn last_token(&self, kind: MailKind, to: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
            .map(|m| m.token().to_string())
    }

    /// Makes subsequent sends fail
    pub fn fail_sends(&self, fail: bool) {
        if let Ok(mut flag) = self.fail.lock() {
            *flag = fail;
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(MailError::Delivery("simulated failure".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| MailError::Delivery("mailbox poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_links() {
        let cases = [
            (MailKind::Confirmation, "http://localhost:4000/confirm/tok"),
            (MailKind::Recovery, "http://localhost:4000/reset/tok"),
            (MailKind::ChangeEmail, "http://localhost:4000/change/tok"),
            (MailKind::Passwordless, "http://localhost:4000/magic-login/tok"),
        ];

        for (kind, link) in cases {
            let msg = MailMessage::compose(kind, "a@x.com", None, "Modest", "http://localhost:4000/", "tok");
            assert_eq!(msg.link, link);
            assert_eq!(msg.token(), "tok");
            assert!(msg.body.contains(link));
        }
    }

    #[test]
    fn test_compose_subject_and_greeting() {
        let msg = MailMessage::compose(
            MailKind::Confirmation,
            "a@x.com",
            Some("Ada"),
            "Modest",
            "https://modest.example",
            "t",
        );
        assert_eq!(msg.subject, "Welcome to Modest!");
        assert!(msg.body.starts_with("Hi Ada,"));
    }

    #[tokio::test]
    async fn test_memory_mailer() {
        let mailer = MemoryMailer::new();
        let msg = MailMessage::compose(MailKind::Recovery, "a@x.com", None, "M", "http://h", "t1");
        mailer.send(msg).await.unwrap();

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.last_token(MailKind::Recovery, "a@x.com").as_deref(), Some("t1"));
        assert!(mailer.last_token(MailKind::Confirmation, "a@x.com").is_none());

        mailer.fail_sends(true);
        let msg = MailMessage::compose(MailKind::Recovery, "a@x.com", None, "M", "http://h", "t2");
        assert!(mailer.send(msg).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        let mailer = LogMailer::new("noreply@localhost");
        let msg = MailMessage::compose(MailKind::Passwordless, "a@x.com", None, "M", "http://h", "t");
        assert!(mailer.send(msg).await.is_ok());
    }
}
