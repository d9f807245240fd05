//! # Message Bus Module
//!
//! In-process publish/subscribe bus the bridge exposes the drone on.
//!
//! This module handles:
//! - Named, typed topics backed by `tokio::sync::broadcast` channels
//! - Latched topics that replay their last message to late subscribers
//! - Request/response services backed by `mpsc` + `oneshot` channels
//! - Name resolution (`tello/battery` and `/tello/battery` are one topic)
//!
//! The first handle registered for a name fixes the topic's message type
//! and queue depth; later handles must agree on the type.

pub mod service;
pub mod topic;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{BridgeError, Result};

pub use service::{ServiceCall, ServiceClient, ServiceServer};
pub use topic::{Message, Publisher, Subscription};

use topic::TopicInner;

/// Queue depth used when a subscriber creates a topic before any publisher
pub const DEFAULT_QUEUE_SIZE: usize = 10;

/// Queue depth for latched topics; only the last message matters there
const LATCHED_QUEUE_SIZE: usize = 1;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve a topic or service name to its absolute form.
///
/// # Examples
///
/// ```
/// use tello_bridge::bus::resolve_name;
///
/// assert_eq!(resolve_name("tello/battery"), "/tello/battery");
/// assert_eq!(resolve_name("/tello/camera"), "/tello/camera");
/// ```
pub fn resolve_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

#[derive(Default)]
struct Registry {
    topics: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    services: Mutex<HashMap<String, service::ServiceEntry>>,
}

/// Shared bus handle. Clone it cheaply; all clones see the same topics and
/// services.
#[derive(Clone, Default)]
pub struct Bus {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("topics", &lock(&self.registry.topics).len())
            .field("services", &lock(&self.registry.services).len())
            .finish()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic<T: Message>(&self, name: &str, depth: usize) -> Result<Arc<TopicInner<T>>> {
        let name = resolve_name(name);
        let mut topics = lock(&self.registry.topics);

        if let Some(existing) = topics.get(&name) {
            return Arc::clone(existing)
                .downcast::<TopicInner<T>>()
                .map_err(|_| BridgeError::TopicTypeMismatch { topic: name });
        }

        debug!("Registering topic {} (queue size {})", name, depth);
        let topic = Arc::new(TopicInner::new(name.clone(), depth));
        topics.insert(name, Arc::clone(&topic) as Arc<dyn Any + Send + Sync>);
        Ok(topic)
    }

    /// Get a publisher for `name`, creating the topic with the given queue
    /// depth if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `TopicTypeMismatch` if the topic carries another message type.
    pub fn publisher<T: Message>(&self, name: &str, depth: usize) -> Result<Publisher<T>> {
        self.topic(name, depth).map(Publisher::new)
    }

    /// Get a publisher whose last message is replayed to every later
    /// subscriber.
    pub fn latched_publisher<T: Message>(&self, name: &str) -> Result<Publisher<T>> {
        let topic = self.topic(name, LATCHED_QUEUE_SIZE)?;
        topic.latch();
        Ok(Publisher::new(topic))
    }

    /// Subscribe to `name`, creating the topic if nobody publishes on it yet.
    pub fn subscribe<T: Message>(&self, name: &str) -> Result<Subscription<T>> {
        self.topic::<T>(name, DEFAULT_QUEUE_SIZE)
            .map(|topic| topic.subscribe())
    }

    /// Advertise a service and return the server end.
    ///
    /// A name whose previous server has been dropped can be advertised again.
    ///
    /// # Errors
    ///
    /// Returns `ServiceAlreadyAdvertised` while another server is alive.
    pub fn advertise<Req, Resp>(&self, name: &str) -> Result<ServiceServer<Req, Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let name = resolve_name(name);
        let mut services = lock(&self.registry.services);

        if services.get(&name).is_some_and(|entry| !entry.is_closed()) {
            return Err(BridgeError::ServiceAlreadyAdvertised(name));
        }

        debug!("Advertising service {}", name);
        let (server, entry) = service::channel::<Req, Resp>(&name);
        services.insert(name, entry);
        Ok(server)
    }

    /// Get a client for an advertised service.
    ///
    /// # Errors
    ///
    /// - `ServiceNotFound` if nothing advertises `name`
    /// - `TopicTypeMismatch` if the service has other request/response types
    pub fn client<Req, Resp>(&self, name: &str) -> Result<ServiceClient<Req, Resp>>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let name = resolve_name(name);
        let services = lock(&self.registry.services);

        match services.get(&name) {
            Some(entry) if !entry.is_closed() => entry.client(&name),
            _ => Err(BridgeError::ServiceNotFound(name)),
        }
    }
}
