use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Default broadcast channel capacity for session events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Default number of past events retained for replay.
pub const EVENT_REPLAY_BUFFER: usize = 32;

/// Broadcast stream with a bounded replay buffer.
///
/// Events published before any subscriber attaches are not lost: they land in
/// the replay buffer and can be read back with [`Subscriber::replay_buffer`].
pub struct EventStream<T: Clone + Send + 'static> {
    sender: broadcast::Sender<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
    buffer_size: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Counters for monitoring stream activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStreamStats {
    pub published: u64,
    /// Events that reached no live subscriber (still buffered for replay).
    pub dropped: u64,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(buffer_size))),
            buffer_size,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to events published after this call; the replay buffer
    /// covers everything before it.
    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            receiver: self.sender.subscribe(),
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Publish an event to all subscribers, returning how many received it.
    pub async fn publish(&self, event: T) -> usize {
        let receivers = match self.sender.send(event.clone()) {
            Ok(count) => count,
            Err(_) => {
                // No receivers; the event still lands in the replay buffer.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event published with no live subscribers");
                0
            }
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut buffer = self.buffer.write().await;
        buffer.push_back(event);
        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }

        receivers
    }

    pub fn stats(&self) -> EventStreamStats {
        EventStreamStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer_size
    }
}

/// Receiving half of an [`EventStream`].
pub struct Subscriber<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
    buffer: Arc<RwLock<VecDeque<T>>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<T, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Snapshot of the buffered events, oldest first.
    pub async fn replay_buffer(&self) -> Vec<T> {
        self.buffer.read().await.iter().cloned().collect()
    }
}
