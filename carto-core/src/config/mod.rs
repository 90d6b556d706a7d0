//! Configuration types for Cartographer.
//!
//! These types represent the validated runtime configuration shared by the
//! server and its sessions. Loading and parsing is handled by the server
//! crate.

mod config_store;
mod events;
mod liveness;
mod server;

pub use config_store::ConfigStore;
pub use events::EventsConfig;
pub use liveness::LivenessConfig;
pub use server::ServerConfig;
