// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process event bus: one bounded queue and one consumer task per
//! subscriber. Publish never blocks the engine; a full queue drops the
//! event and logs a warning rather than applying back-pressure to the
//! publisher.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::execution::{Event, EventType};

/// The bus's internal per-subscriber queue depth. Sized generously: a slow
/// subscriber should lag, not stall the engine, and drops are logged.
const SUBSCRIBER_QUEUE_DEPTH: usize = 1024;

/// An independent consumer of the event stream.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Used only in log messages to identify the subscriber.
    fn name(&self) -> &str;

    /// Whether this subscriber wants to see events of this type. The
    /// default accepts everything.
    fn accepts(&self, _event_type: EventType) -> bool {
        true
    }

    /// Handle one event. Errors are the subscriber's own concern to log;
    /// they must never propagate back into the bus.
    async fn handle(&self, event: &Event);
}

struct Subscription {
    subscriber: Arc<dyn EventSubscriber>,
    sender: mpsc::Sender<Event>,
}

/// Fans out published events to every registered subscriber. Subscribers
/// are registered before the engine starts publishing; the bus itself holds
/// no lock on the hot path beyond the channel send.
#[derive(Clone, Default)]
pub struct EventBus {
    subscriptions: Arc<std::sync::Mutex<Vec<Subscription>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` and spawns its dedicated delivery task.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        let (tx, mut rx) = mpsc::channel::<Event>(SUBSCRIBER_QUEUE_DEPTH);
        let delivered = subscriber.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                delivered.handle(&event).await;
            }
        });
        self.subscriptions.lock().expect("event bus lock poisoned").push(Subscription { subscriber, sender: tx });
    }

    /// Publishes synchronously onto each accepting subscriber's buffer and
    /// returns immediately; delivery itself happens on the subscriber's own
    /// task.
    pub fn publish(&self, event: Event) {
        let subscriptions = self.subscriptions.lock().expect("event bus lock poisoned");
        for subscription in subscriptions.iter() {
            if !subscription.subscriber.accepts(event.event_type) {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = subscription.sender.try_send(event.clone()) {
                tracing::warn!(
                    subscriber = subscription.subscriber.name(),
                    event_type = event.event_type.wire_name(),
                    "subscriber queue full, dropping event"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().expect("event bus lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FilteringSubscriber {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for FilteringSubscriber {
        fn name(&self) -> &str {
            "filtering"
        }

        fn accepts(&self, event_type: EventType) -> bool {
            matches!(event_type, EventType::ExecutionCompleted)
        }

        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_event(event_type: EventType) -> Event {
        Event::new(event_type, Uuid::new_v4(), Uuid::new_v4(), None, serde_json::Value::Null, None)
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));
        bus.publish(sample_event(EventType::ExecutionStarted));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filters_by_accepted_event_type() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(FilteringSubscriber { count: count.clone() }));
        bus.publish(sample_event(EventType::ExecutionStarted));
        bus.publish(sample_event(EventType::ExecutionCompleted));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ordering_within_one_subscriber_is_preserved() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));
        let execution_id = Uuid::new_v4();
        let workflow_id = Uuid::new_v4();
        for event_type in [EventType::ExecutionStarted, EventType::StepStarted, EventType::StepCompleted, EventType::ExecutionCompleted] {
            bus.publish(Event::new(event_type, execution_id, workflow_id, None, serde_json::Value::Null, None));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
