//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventFilter, IssuerEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// Returns the number of active subscribers that received the event.
    /// Never fails: an event with no receivers is dropped.
    async fn publish(&self, event: IssuerEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<IssuerEvent>,

    /// Active subscription count by topic.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    events_published: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let topic_key = format!("{:?}", filter.topics);

        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(topic_key.clone()).or_insert(0) += 1;
        }

        debug!(topics = ?filter.topics, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), topic_key)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: IssuerEvent) -> usize {
        let topic = event.topic();
        let identifier = event.identifier().to_string();

        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    topic = ?topic,
                    did = %identifier,
                    receivers = receiver_count,
                    "Event published"
                );
                receiver_count
            }
            Err(e) => {
                warn!(
                    topic = ?topic,
                    did = %identifier,
                    error = %e,
                    "Event dropped (no receivers)"
                );
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use shared_types::Did;

    fn confirmed() -> IssuerEvent {
        IssuerEvent::StateConfirmed {
            identifier: Did::new("iden3", "polygon", "amoy", "abc").unwrap(),
            state: [3u8; 32],
            block_number: 10,
        }
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryEventBus::new();
        let receivers = bus.publish(confirmed()).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_subscriber() {
        let bus = InMemoryEventBus::new();
        let _sub = bus.subscribe(EventFilter::all());

        let receivers = bus.publish(confirmed()).await;

        assert_eq!(receivers, 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryEventBus::new();

        let _sub1 = bus.subscribe(EventFilter::all());
        let _sub2 = bus.subscribe(EventFilter::all());
        let _sub3 = bus.subscribe(EventFilter::topics(vec![EventTopic::RevocationStatus]));

        // Broadcast delivers to every receiver; filtering happens on recv.
        let receivers = bus.publish(confirmed()).await;
        assert_eq!(receivers, 3);
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryEventBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.events_published(), 0);
    }
}
