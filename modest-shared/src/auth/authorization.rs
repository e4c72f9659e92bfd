/// Authorization gate
///
/// Decides whether a principal may perform a request:
///
/// 1. Build the action from method and path ([`build_action`]).
/// 2. Use `*` as the target when the route names no resource.
/// 3. Fetch the rules of the principal's role from the [`RoleTable`].
/// 4. Find the rule whose template the action fills with the target in its
///    `*` positions; no rule means deny.
/// 5. Run the rule's matcher against the real target. The ownership matcher
///    loads the task; a missing task or a storage failure is an error, never
///    an allow.
///
/// Any error means the request is denied. Callers must not proceed unless
/// [`Gate::authorize`] returns `Ok(())`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use modest_shared::auth::authorization::Gate;
/// use modest_shared::auth::principal::Principal;
/// use modest_shared::auth::rbac::RoleTable;
/// use modest_shared::store::Stores;
///
/// # async fn example(principal: Principal) -> Result<(), Box<dyn std::error::Error>> {
/// let stores = Stores::memory();
/// let gate = Gate::new(Arc::new(RoleTable::default_roles()), stores.tasks.clone());
///
/// gate.authorize(&principal, "GET", "/api/tasks", None).await?;
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use tracing::{debug, warn};

use super::action::{build_action, ANY_TARGET};
use super::principal::Principal;
use super::rbac::{Matcher, RoleTable};
use crate::store::{StoreError, TaskStore};

/// Authorization failure
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// No rule grants the action to the principal's role
    #[error("forbidden")]
    Forbidden,

    /// The target does not exist, or exists but belongs to someone else
    #[error("not found")]
    NotFound,

    /// The matcher could not load the target
    #[error("authorization lookup failed: {0}")]
    Store(StoreError),
}

/// Why a request was allowed or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Allowed,
    NoRule,
    NotOwner,
}

/// Evaluates requests against the role table
#[derive(Clone)]
pub struct Gate {
    roles: Arc<RoleTable>,
    tasks: Arc<dyn TaskStore>,
}

impl Gate {
    pub fn new(roles: Arc<RoleTable>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { roles, tasks }
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Whether `principal` may perform `method path` on `target`
    ///
    /// `Ok(false)` is a plain denial (no rule, or not the owner). `Err` is a
    /// denial that also carries a reason (missing target, storage failure).
    pub async fn can(
        &self,
        principal: &Principal,
        method: &str,
        path: &str,
        target: Option<&str>,
    ) -> Result<bool, AuthzError> {
        Ok(self.evaluate(principal, method, path, target).await? == Outcome::Allowed)
    }

    /// Like [`Gate::can`], folding every denial into an error
    ///
    /// A task owned by someone else yields `NotFound`, the same as a task
    /// that does not exist, so the response never reveals other owners'
    /// resources.
    pub async fn authorize(
        &self,
        principal: &Principal,
        method: &str,
        path: &str,
        target: Option<&str>,
    ) -> Result<(), AuthzError> {
        match self.evaluate(principal, method, path, target).await? {
            Outcome::Allowed => Ok(()),
            Outcome::NoRule => Err(AuthzError::Forbidden),
            Outcome::NotOwner => Err(AuthzError::NotFound),
        }
    }

    async fn evaluate(
        &self,
        principal: &Principal,
        method: &str,
        path: &str,
        target: Option<&str>,
    ) -> Result<Outcome, AuthzError> {
        let target = target.filter(|t| !t.is_empty()).unwrap_or(ANY_TARGET);
        let action = build_action(method, path);

        let Some(rule) = self.roles.rule_for_request(&principal.role, &action, target) else {
            debug!(
                account_id = %principal.account_id,
                role = %principal.role,
                action = %action,
                "No rule grants action"
            );
            return Ok(Outcome::NoRule);
        };

        let outcome = match rule.matcher {
            Matcher::AllowAll => Outcome::Allowed,
            Matcher::TaskOwner => self.match_task_owner(principal, target).await?,
        };

        debug!(
            account_id = %principal.account_id,
            action = %action,
            target = %target,
            outcome = ?outcome,
            "Authorization decision"
        );
        Ok(outcome)
    }

    async fn match_task_owner(
        &self,
        principal: &Principal,
        target: &str,
    ) -> Result<Outcome, AuthzError> {
        if target == ANY_TARGET {
            return Ok(Outcome::NotOwner);
        }

        match self.tasks.owner_of(target).await {
            Ok(Some(owner)) if owner == principal.account_id => Ok(Outcome::Allowed),
            Ok(Some(_)) => Ok(Outcome::NotOwner),
            Ok(None) => Err(AuthzError::NotFound),
            Err(e) => {
                warn!(error = %e, target = %target, "Ownership lookup failed");
                Err(AuthzError::Store(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::AuthMethod;
    use crate::auth::rbac::PermissionRule;
    use crate::store::memory::MemoryTaskStore;
    use async_trait::async_trait;
    use uuid::Uuid;

    fn principal(role: &str) -> Principal {
        Principal {
            account_id: Uuid::new_v4(),
            email: "u@x.com".to_string(),
            role: role.to_string(),
            session_id: None,
            method: AuthMethod::Session,
        }
    }

    fn gate(tasks: Arc<dyn TaskStore>) -> Gate {
        Gate::new(Arc::new(RoleTable::default_roles()), tasks)
    }

    #[tokio::test]
    async fn test_allow_all_rules() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let u1 = principal("owner");

        assert!(gate.can(&u1, "GET", "/api/tasks", None).await.unwrap());
        assert!(gate.can(&u1, "GET", "/api/tasks/", None).await.unwrap());
        assert!(gate.can(&u1, "POST", "/api/tasks", Some("")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_action_denied() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let u1 = principal("owner");

        assert!(!gate.can(&u1, "PATCH", "/api/tasks", None).await.unwrap());
        assert!(!gate.can(&u1, "GET", "/api/users", None).await.unwrap());
        assert!(matches!(
            gate.authorize(&u1, "PATCH", "/api/tasks", None).await,
            Err(AuthzError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_denied() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let stranger = principal("admin");

        assert!(!gate.can(&stranger, "GET", "/api/tasks", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_matcher() {
        let tasks = Arc::new(MemoryTaskStore::default());
        let gate = gate(tasks.clone());
        let u1 = principal("owner");
        let u2 = principal("owner");

        let mine = tasks.create(u1.account_id, "mine").await.unwrap();
        let theirs = tasks.create(u2.account_id, "theirs").await.unwrap();

        let path = format!("/api/tasks/{}", mine.id);
        assert!(gate.can(&u1, "DELETE", &path, Some(&mine.id)).await.unwrap());
        assert!(!gate.can(&u2, "DELETE", &path, Some(&mine.id)).await.unwrap());

        let path = format!("/api/tasks/{}/status", theirs.id);
        assert!(!gate.can(&u1, "PUT", &path, Some(&theirs.id)).await.unwrap());
        assert!(gate.can(&u2, "PUT", &path, Some(&theirs.id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found_error() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let u1 = principal("owner");

        let result = gate
            .can(&u1, "DELETE", "/api/tasks/nope", Some("nope"))
            .await;
        assert!(matches!(result, Err(AuthzError::NotFound)));
    }

    #[tokio::test]
    async fn test_not_owner_and_missing_look_the_same() {
        let tasks = Arc::new(MemoryTaskStore::default());
        let gate = gate(tasks.clone());
        let u1 = principal("owner");
        let u2 = principal("owner");
        let theirs = tasks.create(u2.account_id, "theirs").await.unwrap();

        let not_owner = gate
            .authorize(&u1, "DELETE", &format!("/api/tasks/{}", theirs.id), Some(&theirs.id))
            .await;
        let missing = gate
            .authorize(&u1, "DELETE", "/api/tasks/missing", Some("missing"))
            .await;

        assert!(matches!(not_owner, Err(AuthzError::NotFound)));
        assert!(matches!(missing, Err(AuthzError::NotFound)));
    }

    #[tokio::test]
    async fn test_wildcard_target_never_satisfies_ownership() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let u1 = principal("owner");

        // A route that forgot to pass its id cannot reach an ownership rule
        assert!(!gate.can(&u1, "DELETE", "/api/tasks/*", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_target_named_like_literal_segment() {
        let gate = gate(Arc::new(MemoryTaskStore::default()));
        let u1 = principal("owner");

        let result = gate
            .authorize(&u1, "DELETE", "/api/tasks/tasks", Some("tasks"))
            .await;
        assert!(matches!(result, Err(AuthzError::NotFound)));

        let result = gate
            .authorize(&u1, "PUT", "/api/tasks/status/status", Some("status"))
            .await;
        assert!(matches!(result, Err(AuthzError::NotFound)));
    }

    struct FailingTasks;

    #[async_trait]
    impl TaskStore for FailingTasks {
        async fn create(&self, _: Uuid, _: &str) -> Result<crate::models::task::Task, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn list(&self, _: Uuid) -> Result<Vec<crate::models::task::Task>, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn find(&self, _: Uuid, _: &str) -> Result<Option<crate::models::task::Task>, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn owner_of(&self, _: &str) -> Result<Option<Uuid>, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn update_text(&self, _: Uuid, _: &str, _: &str) -> Result<crate::models::task::Task, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn update_status(&self, _: Uuid, _: &str, _: &str) -> Result<crate::models::task::Task, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn delete(&self, _: Uuid, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
        async fn delete_for_owner(&self, _: Uuid) -> Result<u64, StoreError> {
            Err(StoreError::Database("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_denies() {
        let gate = gate(Arc::new(FailingTasks));
        let u1 = principal("owner");

        let result = gate.can(&u1, "DELETE", "/api/tasks/abc", Some("abc")).await;
        assert!(matches!(result, Err(AuthzError::Store(_))));

        // Rules that need no lookup are unaffected
        assert!(gate.can(&u1, "GET", "/api/tasks", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_role_table() {
        let roles = RoleTable::new().with_role(
            "reader",
            vec![PermissionRule::new("get:api:tasks", Matcher::AllowAll)],
        );
        let gate = Gate::new(Arc::new(roles), Arc::new(MemoryTaskStore::default()));
        let reader = principal("reader");

        assert!(gate.can(&reader, "GET", "/api/tasks", None).await.unwrap());
        assert!(!gate.can(&reader, "POST", "/api/tasks", None).await.unwrap());
    }
}
