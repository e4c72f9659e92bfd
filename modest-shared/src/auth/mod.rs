/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing
/// - [`tokens`]: random ids, single-use token hashing
/// - [`jwt`]: signed API bearer tokens
/// - [`principal`]: the authenticated identity of a request
/// - [`action`]: HTTP method + path to action string
/// - [`rbac`]: role table, permission rules, route validation
/// - [`authorization`]: the gate combining the above
///
/// # Example
///
/// ```
/// use modest_shared::auth::action::build_action;
/// use modest_shared::auth::rbac::RoleTable;
///
/// let roles = RoleTable::default_roles();
/// let action = build_action("GET", "/api/tasks/");
/// assert!(roles.find_rule("owner", &action).is_some());
/// ```

pub mod action;
pub mod authorization;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod rbac;
pub mod tokens;
