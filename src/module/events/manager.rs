//! Event notification for container listeners
//!
//! Each listener owns a bounded channel. Publishing snapshots the senders,
//! releases the registry lock and then delivers to every listener
//! concurrently, waiting at most the publish timeout on a full channel.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::config::EventConfig;
use crate::module::instance::Module;
use crate::module::traits::{ContainerEventType, ModuleEventType, ModuleId, ModuleState};

/// Listener registration handle
pub type ListenerId = u64;

/// A committed transition of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEvent {
    pub module: ModuleId,
    pub location: String,
    pub event_type: ModuleEventType,
    /// State the module was in when the event was published
    pub state: ModuleState,
}

impl ModuleEvent {
    pub fn new(module: &Module, event_type: ModuleEventType) -> Self {
        Self {
            module: module.id(),
            location: module.location().to_string(),
            event_type,
            state: module.state(),
        }
    }
}

/// A container-level notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub event_type: ContainerEventType,
    pub module: Option<ModuleId>,
    pub error: Option<String>,
    /// Listeners the event is addressed to; empty means all
    pub listeners: Vec<ListenerId>,
}

impl ContainerEvent {
    pub fn new(event_type: ContainerEventType) -> Self {
        Self {
            event_type,
            module: None,
            error: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: ModuleId) -> Self {
        self.module = Some(module);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_listeners(mut self, listeners: Vec<ListenerId>) -> Self {
        self.listeners = listeners;
        self
    }
}

type Listeners<E> = Arc<TokioMutex<BTreeMap<ListenerId, mpsc::Sender<E>>>>;

/// Event subscription manager
pub struct EventManager {
    module_listeners: Listeners<ModuleEvent>,
    container_listeners: Listeners<ContainerEvent>,
    next_listener: AtomicU64,
    channel_capacity: usize,
    publish_timeout: Duration,
}

impl EventManager {
    /// Create a new event manager
    pub fn new(config: &EventConfig) -> Self {
        Self {
            module_listeners: Arc::new(TokioMutex::new(BTreeMap::new())),
            container_listeners: Arc::new(TokioMutex::new(BTreeMap::new())),
            next_listener: AtomicU64::new(1),
            channel_capacity: config.channel_capacity.max(1),
            publish_timeout: config.publish_timeout(),
        }
    }

    fn allocate(&self) -> ListenerId {
        self.next_listener.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a module event listener
    pub async fn subscribe_module_events(&self) -> (ListenerId, mpsc::Receiver<ModuleEvent>) {
        let id = self.allocate();
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        self.module_listeners.lock().await.insert(id, sender);
        debug!("Module event listener {} registered", id);
        (id, receiver)
    }

    /// Register a container event listener
    pub async fn subscribe_container_events(&self) -> (ListenerId, mpsc::Receiver<ContainerEvent>) {
        let id = self.allocate();
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        self.container_listeners.lock().await.insert(id, sender);
        debug!("Container event listener {} registered", id);
        (id, receiver)
    }

    /// Remove a listener of either kind
    pub async fn unsubscribe(&self, listener: ListenerId) -> bool {
        let module = self.module_listeners.lock().await.remove(&listener).is_some();
        let container = self.container_listeners.lock().await.remove(&listener).is_some();
        module || container
    }

    /// Publish a module event to all module listeners
    pub async fn publish_module_event(&self, event: ModuleEvent) {
        debug!(
            "Publishing {:?} for module {} ({})",
            event.event_type, event.module, event.state
        );
        let senders: Vec<_> = {
            let listeners = self.module_listeners.lock().await;
            listeners.iter().map(|(id, s)| (*id, s.clone())).collect()
        };
        let closed = deliver(senders, event, self.publish_timeout).await;
        prune(&self.module_listeners, closed).await;
    }

    /// Publish a container event to its addressed listeners, or all of them
    pub async fn publish_container_event(&self, event: ContainerEvent) {
        debug!("Publishing container {:?} event", event.event_type);
        let senders: Vec<_> = {
            let listeners = self.container_listeners.lock().await;
            listeners
                .iter()
                .filter(|(id, _)| event.listeners.is_empty() || event.listeners.contains(*id))
                .map(|(id, s)| (*id, s.clone()))
                .collect()
        };
        let closed = deliver(senders, event, self.publish_timeout).await;
        prune(&self.container_listeners, closed).await;
    }

    /// Number of registered listeners (module, container)
    pub async fn listener_count(&self) -> (usize, usize) {
        (
            self.module_listeners.lock().await.len(),
            self.container_listeners.lock().await.len(),
        )
    }
}

/// Send to every listener; returns the listeners whose channel is closed
async fn deliver<E: Clone>(
    senders: Vec<(ListenerId, mpsc::Sender<E>)>,
    event: E,
    publish_timeout: Duration,
) -> Vec<ListenerId> {
    let sends = senders.into_iter().map(|(id, sender)| {
        let event = event.clone();
        async move { (id, sender.send_timeout(event, publish_timeout).await) }
    });

    let mut closed = Vec::new();
    for (id, result) in join_all(sends).await {
        match result {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Listener {} did not accept event within {:?}", id, publish_timeout);
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!("Listener {} closed its channel", id);
                closed.push(id);
            }
        }
    }
    closed
}

async fn prune<E>(listeners: &Listeners<E>, closed: Vec<ListenerId>) {
    if closed.is_empty() {
        return;
    }
    let mut listeners = listeners.lock().await;
    for id in closed {
        listeners.remove(&id);
    }
}
