//! Cartographer server.
//!
//! Real-time ingestion of geographic coordinates over HTTP with fan-out to
//! WebSocket subscribers.

pub mod api;
pub mod config;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod state;
