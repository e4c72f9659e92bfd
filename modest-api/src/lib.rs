//! # Modest API Server Library
//!
//! This library provides the core functionality for the Modest API server.
//!
//! ## Modules
//!
//! - `app`: Application state, route table and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Principal resolution, guards and security headers
//! - `routes`: Route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
