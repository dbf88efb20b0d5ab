//! Event bus for run observation.
//!
//! Pub/sub over a Tokio broadcast channel. Publishing is fire-and-forget:
//! no subscribers, slow subscribers, or dropped receivers can ever fail or
//! block the run being observed.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::RunEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to an EventBus.
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast-backed event bus.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus.
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Never fails; an empty
    /// subscriber set just drops the event.
    pub fn publish(&self, event: RunEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(RunEvent::RunStarted {
            run_id: "run-1".to_string(),
            query_preview: "q".to_string(),
            processors: vec!["lang".to_string()],
            timestamp: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "run_started");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        bus.publish(RunEvent::RunFailed {
            run_id: "run-1".to_string(),
            iteration: 0,
            reason: "nobody listening".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(RunEvent::RunCompleted {
            run_id: "run-1".to_string(),
            iterations: 1,
            confidence: 0.8,
            timestamp: Utc::now(),
        });

        assert_eq!(rx1.recv().await.unwrap().event_type(), "run_completed");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "run_completed");
    }
}
