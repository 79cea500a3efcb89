//! Event Bus: in-process pub/sub for observability, purely
//! informational — nothing in the dispatch path depends on a subscriber
//! ever reading an event.
//!
//! Backed by a broadcast channel, which is already lossy-for-slow-readers
//! by design: a subscriber that falls behind gets `Lagged` and resumes
//! from the next published event rather than blocking a publisher.

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Event {
    ConnectionOpened { connection_id: String },
    ConnectionClosed { connection_id: String },
    RequestAccepted { connection_id: String, method: String },
    RequestCompleted { connection_id: String, method: String, ok: bool },
    ToolRegistered { name: String },
    ToolUnregistered { name: String },
    ServerDraining,
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. No-op if there are no subscribers.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
