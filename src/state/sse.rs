use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`AppState`](super::AppState).
pub struct SseState {
    chat: SseHub,
    host: SseHub,
}

impl SseState {
    /// Build the SSE sub-tree with per-stream channel capacities.
    pub fn new(chat_capacity: usize, host_capacity: usize) -> Self {
        Self {
            chat: SseHub::new(chat_capacity),
            host: SseHub::new(host_capacity),
        }
    }

    /// Hub feeding viewers: chat lines and show updates.
    pub fn chat(&self) -> &SseHub {
        &self.chat
    }

    /// Hub feeding the host dashboard: timers, confirmations and show updates.
    pub fn host(&self) -> &SseHub {
        &self.host
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
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

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
