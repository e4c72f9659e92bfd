//! # Modest Shared Library
//!
//! Domain logic of the Modest starter kit, used by the API server.
//!
//! ## Module Organization
//!
//! - `models`: accounts, tasks, sessions, one-time tokens, plans
//! - `auth`: passwords, tokens, action strings, role table, authorization gate
//! - `store`: storage traits with in-memory and PostgreSQL implementations
//! - `db`: connection pool and migrations
//! - `lifecycle`: signup, confirmation, login, recovery, email change
//! - `mail`: outbound mail behind a trait
//! - `oauth`: external identity providers
//! - `billing`: Stripe checkout, billing portal and webhook signatures

pub mod auth;
pub mod billing;
pub mod db;
pub mod lifecycle;
pub mod mail;
pub mod models;
pub mod oauth;
pub mod store;

/// Current version of the Modest shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
