//! Topic-keyed subscriber registry with non-blocking fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use super::{DEFAULT_QUEUE_CAPACITY, Topic};

type Sinks<E> = HashMap<u64, mpsc::Sender<E>>;

/// In-process publish/subscribe bus.
///
/// Cloning is cheap and every clone refers to the same registry.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

struct BusInner<E> {
    topics: RwLock<HashMap<Topic, Sinks<E>>>,
    next_id: AtomicU64,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// A live registration on an [`EventBus`] topic.
///
/// Owns the receiving end of the subscriber's queue. The registration is
/// removed exactly once: by [`EventBus::unsubscribe`] or when the handle is
/// dropped, whichever happens first.
pub struct Subscription<E> {
    id: u64,
    topic: Topic,
    rx: mpsc::Receiver<E>,
    bus: Weak<BusInner<E>>,
}

/// Result of offering one event to every subscriber of a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscribers whose queue accepted the event.
    pub delivered: usize,
    /// Subscribers whose queue was full; the event was dropped for them.
    pub dropped: usize,
}

// -- EventBus -----------------------------------------------------------

impl<E> EventBus<E> {
    /// Create a bus with [`DEFAULT_QUEUE_CAPACITY`] per subscriber.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus whose subscribers each buffer up to `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber on `topic`.
    pub fn subscribe(&self, topic: &Topic) -> Subscription<E> {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .write_topics()
            .entry(topic.clone())
            .or_default()
            .insert(id, tx);
        debug!(%topic, subscription = id, "Subscribed");

        Subscription {
            id,
            topic: topic.clone(),
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription.
    ///
    /// Returns `false` if the registration was already gone. Events still
    /// queued for the subscription are discarded with it.
    pub fn unsubscribe(&self, subscription: Subscription<E>) -> bool {
        self.inner.remove(&subscription.topic, subscription.id)
    }

    /// Number of subscribers currently registered on `topic`.
    pub fn count(&self, topic: &Topic) -> usize {
        self.inner.read_topics().get(topic).map_or(0, HashMap::len)
    }

    /// Events published since the bus was created.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Per-subscriber deliveries dropped because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl<E: Clone> EventBus<E> {
    /// Offer `event` to every subscriber registered on `topic` right now.
    ///
    /// Never waits on a subscriber. Returns once every queue has been
    /// offered the event, not once the event has been consumed.
    pub fn publish(&self, topic: &Topic, event: E) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let topics = self.inner.read_topics();
        let Some(sinks) = topics.get(topic) else {
            return outcome;
        };

        for (id, sink) in sinks {
            match sink.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    trace!(%topic, subscription = id, "Subscriber queue full, dropping event");
                }
                // Receiver is being dropped; its registration goes with it.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        drop(topics);

        if outcome.dropped > 0 {
            self.inner
                .dropped
                .fetch_add(outcome.dropped as u64, Ordering::Relaxed);
        }
        outcome
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// -- BusInner -----------------------------------------------------------

impl<E> BusInner<E> {
    // The registry is a plain map, so a panic while holding the lock
    // cannot leave it half-updated; recover the guard instead of failing.
    fn read_topics(&self) -> RwLockReadGuard<'_, HashMap<Topic, Sinks<E>>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_topics(&self) -> RwLockWriteGuard<'_, HashMap<Topic, Sinks<E>>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, topic: &Topic, id: u64) -> bool {
        let mut topics = self.write_topics();
        let Some(sinks) = topics.get_mut(topic) else {
            return false;
        };
        let removed = sinks.remove(&id).is_some();
        if sinks.is_empty() {
            topics.remove(topic);
        }
        if removed {
            debug!(%topic, subscription = id, "Unsubscribed");
        }
        removed
    }
}

// -- Subscription -------------------------------------------------------

impl<E> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the bus has been dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.remove(&self.topic, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Topic {
        Topic::new("test")
    }

    fn drain(sub: &mut Subscription<u32>) -> Vec<u32> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[test]
    fn test_fan_out_preserves_order() {
        let bus = EventBus::with_capacity(128);
        let mut subs: Vec<_> = (0..3).map(|_| bus.subscribe(&topic())).collect();

        for i in 0..100 {
            let outcome = bus.publish(&topic(), i);
            assert_eq!(outcome.delivered, 3);
            assert_eq!(outcome.dropped, 0);
        }

        let expected: Vec<u32> = (0..100).collect();
        for sub in &mut subs {
            assert_eq!(drain(sub), expected);
        }
        assert_eq!(bus.published(), 100);
    }

    #[test]
    fn test_saturated_subscriber_does_not_affect_others() {
        let bus = EventBus::with_capacity(2);
        let mut slow = bus.subscribe(&topic());
        let mut fast = bus.subscribe(&topic());

        let mut fast_seen = Vec::new();
        for i in 0..10 {
            bus.publish(&topic(), i);
            fast_seen.extend(drain(&mut fast));
        }

        assert_eq!(fast_seen, (0..10).collect::<Vec<_>>());
        // Drop-newest: the slow subscriber keeps the first events it buffered.
        assert_eq!(drain(&mut slow), vec![0, 1]);
        assert_eq!(bus.dropped(), 8);
    }

    #[test]
    fn test_unsubscribe_removes_registration() {
        let bus = EventBus::<u32>::new();
        let a = bus.subscribe(&topic());
        let _b = bus.subscribe(&topic());
        assert_eq!(bus.count(&topic()), 2);

        assert!(bus.unsubscribe(a));
        assert_eq!(bus.count(&topic()), 1);
        assert_eq!(bus.publish(&topic(), 7).delivered, 1);
    }

    #[test]
    fn test_drop_releases_registration() {
        let bus = EventBus::<u32>::new();
        {
            let _sub = bus.subscribe(&topic());
            assert_eq!(bus.count(&topic()), 1);
        }
        assert_eq!(bus.count(&topic()), 0);
        assert_eq!(bus.publish(&topic(), 1), PublishOutcome::default());
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = EventBus::<u32>::new();
        let mut locations = bus.subscribe(&Topic::LOCATIONS);
        let mut other = bus.subscribe(&topic());

        bus.publish(&Topic::LOCATIONS, 1);

        assert_eq!(drain(&mut locations), vec![1]);
        assert!(drain(&mut other).is_empty());
        assert_eq!(bus.count(&Topic::new("missing")), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_bus_dropped() {
        let bus = EventBus::<u32>::new();
        let mut sub = bus.subscribe(&topic());
        bus.publish(&topic(), 3);
        drop(bus);

        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_publish() {
        let bus = EventBus::<u32>::with_capacity(1024);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                let sub = bus.subscribe(&topic());
                tokio::task::yield_now().await;
                bus.unsubscribe(sub)
            }));
        }
        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    bus.publish(&topic(), i);
                }
            })
        };

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        publisher.await.unwrap();
        assert_eq!(bus.count(&topic()), 0);
        assert_eq!(bus.published(), 500);
    }
}
