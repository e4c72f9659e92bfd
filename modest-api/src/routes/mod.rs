/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Signup, login, logout and the mailed-link targets
/// - `account`: Account page, API token reset, account deletion
/// - `billing`: Checkout and subscription management
/// - `webhook`: Payment provider webhooks
/// - `pages`: Task list page
/// - `tasks`: Task JSON API

pub mod account;
pub mod auth;
pub mod billing;
pub mod health;
pub mod pages;
pub mod tasks;
pub mod webhook;
