/// Domain models
///
/// # Models
///
/// - `account`: accounts, typed attributes and partial updates
/// - `task`: owner-scoped tasks and their status
/// - `session`: server-side login sessions
/// - `token`: single-use tokens (confirmation, recovery, magic link, ...)
/// - `plan`: subscription plans loaded from configuration
///
/// Persistence lives in [`crate::store`]; these types carry no storage code.

pub mod account;
pub mod plan;
pub mod session;
pub mod task;
pub mod token;
