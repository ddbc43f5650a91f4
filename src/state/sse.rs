use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Events buffered per session before slow subscribers start lagging.
pub const SESSION_HUB_CAPACITY: usize = 64;

/// Broadcast hub fanning out one session's change feed.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send an event to all current subscribers; having none is not an error.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SseHub {
    fn default() -> Self {
        Self::new(SESSION_HUB_CAPACITY)
    }
}
