//! Gateway for the driver tracking and payments backend
//!
//! HTTP and WebSocket surface over the `tracking` and `payments` services:
//! bearer-token auth, per-subject rate limiting, and error mapping to JSON
//! bodies of the form `{"error": ..., "code": ...}`.

pub mod auth;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod router;
pub mod state;
