//! # Event Router
//!
//! The single entry point for native SDK callbacks. Glue code holds an [`EventSink`]
//! (usually a clone of [`EventRouter`]) instead of subscribing to global SDK callbacks,
//! and calls [`EventSink::deliver`] from whatever thread the SDK uses.
//!
//! Delivery is synchronous and never blocks: the event is translated and pushed onto the
//! owning bridge's unbounded mailbox. Events for keys with no registered bridge are
//! dropped with a warning and counted.

use crate::error::BridgeError;
use crate::event::RawEvent;
use crate::message::BridgeMessage;
use crate::resource::ResourceKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capability handed to SDK glue code.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: RawEvent);
}

type RouteTable = HashMap<ResourceKey, mpsc::UnboundedSender<BridgeMessage>>;

#[derive(Clone, Default)]
pub struct EventRouter {
    routes: Arc<RwLock<RouteTable>>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("routes", &self.routes.read().len())
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes events for `key` into `mailbox` until the returned guard is dropped.
    ///
    /// A route whose bridge has already stopped is replaced.
    pub(crate) fn register(
        &self,
        key: ResourceKey,
        mailbox: mpsc::UnboundedSender<BridgeMessage>,
    ) -> Result<Registration, BridgeError> {
        let mut routes = self.routes.write();
        if let Some(existing) = routes.get(&key) {
            if !existing.is_closed() {
                return Err(BridgeError::DuplicateResource(key));
            }
            debug!(resource = %key, "Replacing stale route");
        }
        routes.insert(key.clone(), mailbox.clone());
        Ok(Registration {
            key,
            mailbox,
            routes: Arc::clone(&self.routes),
        })
    }

    /// Translates and forwards one event, reporting why it could not be routed.
    pub fn route(&self, event: RawEvent) -> Result<(), BridgeError> {
        let (key, event) = event.translate();
        let routes = self.routes.read();
        let Some(mailbox) = routes.get(&key) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BridgeError::UnknownResource(key));
        };

        debug!(resource = %key, ?event, "Routing event");
        mailbox.send(BridgeMessage::Event(event)).map_err(|_| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            BridgeError::BridgeClosed
        })
    }

    pub fn is_registered(&self, key: &ResourceKey) -> bool {
        self.routes.read().contains_key(key)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for EventRouter {
    fn deliver(&self, event: RawEvent) {
        let key = event.key.clone();
        if let Err(error) = self.route(event) {
            warn!(resource = %key, %error, "Dropped SDK event");
        }
    }
}

/// Keeps a route alive. Dropping it removes the route unless it was replaced since.
pub struct Registration {
    key: ResourceKey,
    mailbox: mpsc::UnboundedSender<BridgeMessage>,
    routes: Arc<RwLock<RouteTable>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut routes = self.routes.write();
        let owned = routes
            .get(&self.key)
            .is_some_and(|current| current.same_channel(&self.mailbox));
        if owned {
            routes.remove(&self.key);
            debug!(resource = %self.key, "Route removed");
        }
    }
}
