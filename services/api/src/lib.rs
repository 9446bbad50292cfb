//! Concierge API Library Crate
//!
//! The HTTP and WebSocket host for a single conversation session: application
//! state, handlers, WebSocket logic and routing. The `api` binary is a thin
//! wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
