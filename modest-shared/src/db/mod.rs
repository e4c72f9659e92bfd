/// Database layer for the PostgreSQL driver
///
/// - `pool`: connection pool creation and health checks
/// - `migrations`: embedded schema migrations
///
/// Query code lives with the storage implementations in
/// [`crate::store::postgres`].

pub mod migrations;
pub mod pool;
