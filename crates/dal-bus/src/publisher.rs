//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventFilter, SessionEvent};
use crate::subscriber::{EventStream, Subscription, SubscriptionGuard};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing session events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event; returns the number of subscribers that received it.
    async fn publish(&self, event: SessionEvent) -> usize;

    /// Get the total number of events accepted for delivery.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer semantics. Once
/// [`InMemoryEventBus::close`] has run, nothing published afterwards reaches
/// any subscriber.
pub struct InMemoryEventBus {
    /// Broadcast sender; `None` once closed.
    sender: RwLock<Option<broadcast::Sender<SessionEvent>>>,

    /// Active subscription count by topic key.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    events_published: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// Subscribing to a closed bus yields a subscription that is already
    /// at its end.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = match self.sender.read() {
            Ok(guard) => guard.as_ref().map(broadcast::Sender::subscribe),
            Err(_) => None,
        };
        let receiver = receiver.unwrap_or_else(|| broadcast::channel(1).1);

        let topic_key = format!("{:?}", filter.topics);
        if let Ok(mut subs) = self.subscriptions.write() {
            *subs.entry(topic_key.clone()).or_insert(0) += 1;
        }

        debug!(topics = ?filter.topics, sessions = filter.sessions.len(), "New subscription created");

        let guard = SubscriptionGuard::new(self.subscriptions.clone(), topic_key);
        Subscription::new(receiver, filter, guard)
    }

    /// Get a stream of events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.subscribe(filter).into_stream()
    }

    /// Get the number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        match self.sender.read() {
            Ok(guard) => guard.as_ref().map_or(0, broadcast::Sender::receiver_count),
            Err(_) => 0,
        }
    }

    /// Number of subscriptions currently held, across all filters.
    #[must_use]
    pub fn tracked_subscriptions(&self) -> usize {
        self.subscriptions
            .read()
            .map(|subs| subs.values().sum())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the sender. Idempotent.
    ///
    /// Subscribers still drain what was buffered before the close and then
    /// observe the end of the stream.
    pub fn close(&self) {
        if let Ok(mut guard) = self.sender.write() {
            if guard.take().is_some() {
                debug!("Event bus closed");
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().map_or(true, |guard| guard.is_none())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: SessionEvent) -> usize {
        let topic = event.event.topic();
        let guard = match self.sender.read() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        let Some(sender) = guard.as_ref() else {
            trace!(topic = topic.as_str(), "Event discarded (bus closed)");
            return 0;
        };

        self.events_published.fetch_add(1, Ordering::Relaxed);

        match sender.send(event) {
            Ok(receivers) => {
                debug!(topic = topic.as_str(), receivers, "Event published");
                receivers
            }
            Err(_) => {
                trace!(topic = topic.as_str(), "Event dropped (no receivers)");
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
    use crate::events::{EventTopic, IterationEvent};
    use dal_types::SessionKey;

    fn completed(round: u64) -> SessionEvent {
        SessionEvent {
            session: SessionKey::new("p1", "0xabc"),
            seq: round,
            event: IterationEvent::IterationCompleted {
                round,
                samples_labeled: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = InMemoryEventBus::new();

        let receivers = bus.publish(completed(1)).await;
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryEventBus::new();

        let _sub1 = bus.subscribe(EventFilter::all());
        let _sub2 = bus.subscribe(EventFilter::all());
        let _sub3 = bus.subscribe(EventFilter::topics(vec![EventTopic::Error]));

        let receivers = bus.publish(completed(1)).await;

        assert_eq!(receivers, 3);
        assert_eq!(bus.subscriber_count(), 3);
        assert_eq!(bus.tracked_subscriptions(), 3);
    }

    #[tokio::test]
    async fn test_publish_after_close_is_discarded() {
        let bus = InMemoryEventBus::new();
        let _sub = bus.subscribe(EventFilter::all());

        bus.close();
        bus.close();

        assert!(bus.is_closed());
        assert_eq!(bus.publish(completed(1)).await, 0);
        assert_eq!(bus.events_published(), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_already_ended() {
        let bus = InMemoryEventBus::new();
        bus.close();

        let mut sub = bus.subscribe(EventFilter::all());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryEventBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.events_published(), 0);
        assert!(!bus.is_closed());
    }
}
