//! Best-effort fan-out of server-sent events
//!
//! Each listener owns a small bounded queue. Announcing never blocks: a
//! listener whose queue is full or whose receiver is gone is dropped.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default per-listener queue bound
pub const DEFAULT_CAPACITY: usize = 10;

pub struct MessageAnnouncer {
    name: &'static str,
    listeners: DashMap<u64, mpsc::Sender<String>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Receiving end of one listener registration
pub struct Listener {
    id: u64,
    receiver: mpsc::Receiver<String>,
}

impl Listener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message; `None` once the listener has been dropped
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> ReceiverStream<String> {
        ReceiverStream::new(self.receiver)
    }
}

impl MessageAnnouncer {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            listeners: DashMap::new(),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a new listener
    pub fn listen(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.listeners.insert(id, sender);
        Listener { id, receiver }
    }

    /// Push `msg` to every listener, returning how many were dropped
    pub fn announce(&self, msg: &str) -> usize {
        let before = self.listeners.len();
        self.listeners
            .retain(|_, sender| sender.try_send(msg.to_string()).is_ok());
        before.saturating_sub(self.listeners.len())
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Drop every listener; their streams end once drained
    pub fn close(&self) {
        self.listeners.clear();
    }
}

impl Default for MessageAnnouncer {
    fn default() -> Self {
        Self::new("events", DEFAULT_CAPACITY)
    }
}

/// Render one server-sent event
pub fn format_sse(data: &str, event: Option<&str>) -> String {
    match event {
        Some(event) => format!("event: {}\ndata: {}\n\n", event, data),
        None => format!("data: {}\n\n", data),
    }
}
