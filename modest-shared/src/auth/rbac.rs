/// Role-based permission rules
///
/// Each role maps to an ordered list of [`PermissionRule`]s. A rule pairs an
/// action template (see [`crate::auth::action`]) with a [`Matcher`] deciding
/// whether a principal may act on a concrete target. Lookups use exact string
/// equality; `*` is only ever produced by target substitution and is never
/// treated as a glob.
///
/// The table is closed: it is built once at startup, checked against the
/// router's route list with [`RoleTable::validate_routes`], and never mutated.
///
/// # Example
///
/// ```
/// use modest_shared::auth::rbac::{Matcher, RoleTable};
///
/// let roles = RoleTable::default_roles();
/// let rule = roles.find_rule("owner", "delete:api:tasks:*").unwrap();
/// assert_eq!(rule.matcher, Matcher::TaskOwner);
///
/// assert!(roles.rules_for_role("nobody").is_empty());
/// ```

use std::collections::{BTreeSet, HashMap};

use super::action::{action_template, substitute_target};
use crate::models::account::DEFAULT_ROLE;

/// Predicate kinds a rule can apply to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Always allows; for actions that are not scoped to a resource
    AllowAll,

    /// Allows only when the target task is owned by the principal
    TaskOwner,
}

/// An action template bound to a matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    pub action: String,
    pub matcher: Matcher,
}

impl PermissionRule {
    pub fn new(action: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            action: action.into(),
            matcher,
        }
    }
}

/// How a route is guarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// Reachable without a principal
    Public,

    /// Requires a principal; no permission rule applies
    Authenticated,

    /// Requires a principal and a granting permission rule
    Permission,
}

/// A route as registered on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: &'static str,

    /// Path pattern with `{param}` segments
    pub pattern: &'static str,

    pub guard: RouteGuard,
}

impl RouteSpec {
    pub const fn new(method: &'static str, pattern: &'static str, guard: RouteGuard) -> Self {
        Self {
            method,
            pattern,
            guard,
        }
    }

    /// Action template this route is authorized under
    pub fn action(&self) -> String {
        action_template(self.method, self.pattern)
    }
}

/// Errors found while validating the role table against the routes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RbacError {
    /// A permission-guarded route no role can reach
    #[error("route {method} {pattern} ({action}) is not granted by any role")]
    UngrantedRoute {
        method: String,
        pattern: String,
        action: String,
    },

    /// A rule whose action matches no permission-guarded route
    #[error("role '{role}' grants '{action}', which matches no protected route")]
    UnusedRule { role: String, action: String },

    /// The same action registered twice for one role
    #[error("role '{role}' registers '{action}' more than once")]
    DuplicateRule { role: String, action: String },

    /// A role with no rules at all
    #[error("role '{0}' has no rules")]
    EmptyRole(String),
}

/// Closed mapping from role name to its rules
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    roles: HashMap<String, Vec<PermissionRule>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a role with its rules, replacing any previous definition
    pub fn with_role(mut self, role: impl Into<String>, rules: Vec<PermissionRule>) -> Self {
        self.roles.insert(role.into(), rules);
        self
    }

    /// The roles shipped with the application
    ///
    /// `owner` may list and create its own tasks, and may change or delete a
    /// task only when it owns it.
    pub fn default_roles() -> Self {
        Self::new().with_role(
            DEFAULT_ROLE,
            vec![
                PermissionRule::new("get:api:tasks", Matcher::AllowAll),
                PermissionRule::new("post:api:tasks", Matcher::AllowAll),
                PermissionRule::new("put:api:tasks:*:status", Matcher::TaskOwner),
                PermissionRule::new("put:api:tasks:*:text", Matcher::TaskOwner),
                PermissionRule::new("delete:api:tasks:*", Matcher::TaskOwner),
            ],
        )
    }

    /// Rules for `role`, in registration order; empty for unknown roles
    pub fn rules_for_role(&self, role: &str) -> &[PermissionRule] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The rule of `role` registered for exactly `action`
    pub fn find_rule(&self, role: &str, action: &str) -> Option<&PermissionRule> {
        self.rules_for_role(role)
            .iter()
            .find(|rule| rule.action == action)
    }

    /// The rule of `role` matching a concrete request action
    ///
    /// `target` is tried only in the `*` positions of each rule's template.
    pub fn rule_for_request(&self, role: &str, action: &str, target: &str) -> Option<&PermissionRule> {
        self.rules_for_role(role)
            .iter()
            .find(|rule| substitute_target(action, target, &rule.action) == rule.action)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Role names, sorted
    pub fn role_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Checks the table against the router's routes
    ///
    /// Every permission-guarded route must be granted by at least one role,
    /// and every registered rule must correspond to such a route. Startup
    /// aborts on any error, so a route can never be silently unguarded and a
    /// typo in a rule can never go unnoticed.
    pub fn validate_routes(&self, routes: &[RouteSpec]) -> Result<(), Vec<RbacError>> {
        let mut errors = Vec::new();

        let protected: BTreeSet<String> = routes
            .iter()
            .filter(|route| route.guard == RouteGuard::Permission)
            .map(RouteSpec::action)
            .collect();

        for route in routes.iter().filter(|r| r.guard == RouteGuard::Permission) {
            let action = route.action();
            let granted = self
                .roles
                .values()
                .any(|rules| rules.iter().any(|rule| rule.action == action));

            if !granted {
                errors.push(RbacError::UngrantedRoute {
                    method: route.method.to_string(),
                    pattern: route.pattern.to_string(),
                    action,
                });
            }
        }

        for role in self.role_names() {
            let rules = self.rules_for_role(role);
            if rules.is_empty() {
                errors.push(RbacError::EmptyRole(role.to_string()));
            }

            let mut seen = BTreeSet::new();
            for rule in rules {
                if !seen.insert(rule.action.as_str()) {
                    errors.push(RbacError::DuplicateRule {
                        role: role.to_string(),
                        action: rule.action.clone(),
                    });
                }
                if !protected.contains(&rule.action) {
                    errors.push(RbacError::UnusedRule {
                        role: role.to_string(),
                        action: rule.action.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_routes() -> Vec<RouteSpec> {
        vec![
            RouteSpec::new("GET", "/healthz", RouteGuard::Public),
            RouteSpec::new("GET", "/app", RouteGuard::Authenticated),
            RouteSpec::new("GET", "/api/tasks", RouteGuard::Permission),
            RouteSpec::new("POST", "/api/tasks", RouteGuard::Permission),
            RouteSpec::new("PUT", "/api/tasks/{id}/status", RouteGuard::Permission),
            RouteSpec::new("PUT", "/api/tasks/{id}/text", RouteGuard::Permission),
            RouteSpec::new("DELETE", "/api/tasks/{id}", RouteGuard::Permission),
        ]
    }

    #[test]
    fn test_default_roles() {
        let roles = RoleTable::default_roles();

        assert_eq!(roles.role_names(), vec!["owner"]);
        assert_eq!(roles.rules_for_role("owner").len(), 5);
        assert_eq!(
            roles.find_rule("owner", "get:api:tasks").map(|r| r.matcher),
            Some(Matcher::AllowAll)
        );
        assert_eq!(
            roles.find_rule("owner", "put:api:tasks:*:status").map(|r| r.matcher),
            Some(Matcher::TaskOwner)
        );
    }

    #[test]
    fn test_unknown_role_has_no_rules() {
        let roles = RoleTable::default_roles();
        assert!(roles.rules_for_role("admin").is_empty());
        assert!(roles.find_rule("admin", "get:api:tasks").is_none());
        assert!(!roles.has_role("admin"));
    }

    #[test]
    fn test_no_glob_matching() {
        let roles = RoleTable::default_roles();
        assert!(roles.find_rule("owner", "delete:api:tasks:42").is_none());
        assert!(roles.find_rule("owner", "delete:api:tasks").is_none());
        assert!(roles.find_rule("owner", "delete:api:*").is_none());
    }

    #[test]
    fn test_rule_for_request() {
        let roles = RoleTable::default_roles();

        let rule = roles.rule_for_request("owner", "delete:api:tasks:tasks", "tasks");
        assert_eq!(rule.map(|r| r.action.as_str()), Some("delete:api:tasks:*"));

        let rule = roles.rule_for_request("owner", "get:api:tasks", "*");
        assert_eq!(rule.map(|r| r.matcher), Some(Matcher::AllowAll));

        assert!(roles.rule_for_request("owner", "delete:api:tasks:42", "43").is_none());
        assert!(roles.rule_for_request("owner", "delete:api:tasks:42:x", "42").is_none());
    }

    #[test]
    fn test_validate_routes_ok() {
        assert!(RoleTable::default_roles().validate_routes(&task_routes()).is_ok());
    }

    #[test]
    fn test_validate_routes_ungranted() {
        let mut routes = task_routes();
        routes.push(RouteSpec::new("PUT", "/api/tasks/{id}/due", RouteGuard::Permission));

        let errors = RoleTable::default_roles().validate_routes(&routes).unwrap_err();
        assert_eq!(
            errors,
            vec![RbacError::UngrantedRoute {
                method: "PUT".to_string(),
                pattern: "/api/tasks/{id}/due".to_string(),
                action: "put:api:tasks:*:due".to_string(),
            }]
        );
    }

    #[test]
    fn test_validate_routes_unused_and_duplicate() {
        let roles = RoleTable::default_roles().with_role(
            "viewer",
            vec![
                PermissionRule::new("get:api:tasks", Matcher::AllowAll),
                PermissionRule::new("get:api:tasks", Matcher::AllowAll),
                PermissionRule::new("get:api:task", Matcher::AllowAll),
            ],
        );

        let errors = roles.validate_routes(&task_routes()).unwrap_err();
        assert!(errors.contains(&RbacError::DuplicateRule {
            role: "viewer".to_string(),
            action: "get:api:tasks".to_string(),
        }));
        assert!(errors.contains(&RbacError::UnusedRule {
            role: "viewer".to_string(),
            action: "get:api:task".to_string(),
        }));
    }

    #[test]
    fn test_validate_routes_empty_role() {
        let roles = RoleTable::default_roles().with_role("ghost", vec![]);
        let errors = roles.validate_routes(&task_routes()).unwrap_err();
        assert_eq!(errors, vec![RbacError::EmptyRole("ghost".to_string())]);
    }

    #[test]
    fn test_non_permission_routes_need_no_rule() {
        let routes = vec![
            RouteSpec::new("GET", "/healthz", RouteGuard::Public),
            RouteSpec::new("GET", "/account", RouteGuard::Authenticated),
        ];
        let roles = RoleTable::new().with_role(
            "owner",
            vec![PermissionRule::new("get:healthz", Matcher::AllowAll)],
        );

        let errors = roles.validate_routes(&routes).unwrap_err();
        assert_eq!(
            errors,
            vec![RbacError::UnusedRule {
                role: "owner".to_string(),
                action: "get:healthz".to_string(),
            }]
        );
    }
}
