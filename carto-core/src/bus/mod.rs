//! In-process publish/subscribe.
//!
//! The [`EventBus`] owns the set of subscriber sinks for every [`Topic`].
//! Publishing never waits: each subscriber has its own bounded queue and a
//! full queue drops the event for that subscriber only.
//!
//! # Flow
//!
//! 1. A session calls [`EventBus::subscribe`] and keeps the [`Subscription`]
//! 2. The ingestion path calls [`EventBus::publish`]
//! 3. The session drains its [`Subscription`] and writes to its socket
//! 4. The session ends; the [`Subscription`] is unsubscribed or dropped

mod event_bus;
mod topic;

pub use event_bus::{EventBus, PublishOutcome, Subscription};
pub use topic::Topic;

/// Default per-subscriber queue depth.
///
/// Enough to absorb a burst while a subscriber's socket is briefly slow,
/// small enough that a stuck subscriber holds little memory.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
