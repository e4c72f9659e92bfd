/// Middleware modules for the API server
///
/// - `security`: hardening response headers
/// - `session`: session cookie / bearer token to principal, page guard
/// - `authz`: role-table authorization for the JSON API

pub mod authz;
pub mod security;
pub mod session;
