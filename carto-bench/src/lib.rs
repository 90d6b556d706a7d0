//! Load generator for the Cartographer ingestion endpoint.
//!
//! Replays a file of coordinates against `POST /geo` through a fixed pool of
//! workers sized from the server's advertised concurrency limit, then
//! reports throughput and latency.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod driver;
pub mod input;
pub mod stats;
pub mod target;
