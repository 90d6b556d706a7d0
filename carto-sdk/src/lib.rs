//! Wire types and clients for Cartographer.
//!
//! The [`objects`] module is always available. The HTTP and WebSocket
//! clients live in [`client`] behind the `client` feature.

#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
