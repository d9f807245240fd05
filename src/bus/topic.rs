//! Typed broadcast topics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};

use super::lock;

/// Anything that can travel over a topic.
pub trait Message: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Message for T {}

/// Shared state behind every handle of one topic.
pub(crate) struct TopicInner<T> {
    name: String,
    sender: broadcast::Sender<T>,
    latched: AtomicBool,
    last: Mutex<Option<T>>,
    published: AtomicU64,
}

impl<T: Message> TopicInner<T> {
    pub(crate) fn new(name: String, depth: usize) -> Self {
        // broadcast channels panic on a zero capacity
        let (sender, _) = broadcast::channel(depth.max(1));
        Self {
            name,
            sender,
            latched: AtomicBool::new(false),
            last: Mutex::new(None),
            published: AtomicU64::new(0),
        }
    }

    pub(crate) fn latch(&self) {
        self.latched.store(true, Ordering::SeqCst);
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        // Holding the slot while subscribing keeps a concurrent publish from
        // being both replayed and received.
        let last = lock(&self.last);
        let pending = if self.latched.load(Ordering::SeqCst) {
            last.clone()
        } else {
            None
        };
        let receiver = self.sender.subscribe();
        drop(last);

        Subscription {
            topic: self.name.clone(),
            pending,
            receiver,
        }
    }
}

/// Sending half of a topic.
///
/// Publishing never blocks and never fails: with no subscribers the message
/// is simply dropped, and slow subscribers lose the oldest messages once the
/// topic's queue is full.
pub struct Publisher<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<T: Message> Publisher<T> {
    pub(crate) fn new(inner: Arc<TopicInner<T>>) -> Self {
        Self { inner }
    }

    /// Publish a message, returning how many subscribers were handed it.
    pub fn publish(&self, message: T) -> usize {
        let mut last = lock(&self.inner.last);
        if self.inner.latched.load(Ordering::SeqCst) {
            *last = Some(message.clone());
        }
        let receivers = self.inner.sender.send(message).unwrap_or(0);
        drop(last);

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        trace!("Published on {} to {} subscriber(s)", self.inner.name, receivers);
        receivers
    }

    /// Resolved topic name
    pub fn topic(&self) -> &str {
        &self.inner.name
    }

    /// Total number of messages published on this topic, by any handle
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

}

/// Receiving half of a topic.
pub struct Subscription<T> {
    topic: String,
    pending: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl<T: Message> Subscription<T> {
    /// Wait for the next message.
    ///
    /// Messages lost to a full queue are skipped with a warning. Returns
    /// `None` once every publisher and the bus itself are gone.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(message) = self.pending.take() {
            return Some(message);
        }

        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber on {} lagged, skipped {} message(s)", self.topic, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(message) = self.pending.take() {
            return Some(message);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Subscriber on {} lagged, skipped {} message(s)", self.topic, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Resolved topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }
}
