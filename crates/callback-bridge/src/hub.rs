//! # Bridge Hub
//!
//! The host-facing facade. A hub owns one bridge per configured resource, all sharing a
//! single [`OperationLedger`], [`OutcomeFanout`] and [`EventRouter`], and exposes keyed
//! operations so the host never touches individual actors.
//!
//! ## Lifecycle
//!
//! 1. **Initialize** – [`BridgeHub::initialize`] creates and spawns every bridge, injects
//!    the SDK and issues the first `load` for each resource.
//! 2. **Use** – `show`, `purchase`, `restore`, `request_permission` by key; query
//!    readiness with `is_ready`; listen with `subscribe` or `register_subscriber`.
//! 3. **Shutdown** – [`BridgeHub::shutdown`] stops every bridge and waits for its task.
//!    Operations still in flight settle as `Failed(BridgeClosed)`.

use crate::bridge::LifecycleBridge;
use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::fanout::{BridgeEvent, EventSubscriber, OutcomeFanout, SubscriptionHandle};
use crate::ledger::OperationLedger;
use crate::operation::Outcome;
use crate::policy::BridgeConfig;
use crate::resource::{Readiness, ResourceKey, ResourceKind};
use crate::router::EventRouter;
use crate::sdk::{OperationContext, SdkAdapter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// One resource the hub should manage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub key: ResourceKey,
    pub kind: ResourceKind,
}

impl ResourceDefinition {
    pub fn new(key: impl Into<ResourceKey>, kind: ResourceKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

pub struct BridgeHub {
    config: BridgeConfig,
    router: EventRouter,
    ledger: OperationLedger,
    fanout: OutcomeFanout,
    sdk: Arc<dyn SdkAdapter>,
    clients: HashMap<ResourceKey, BridgeClient>,
    handles: Vec<(ResourceKey, JoinHandle<()>)>,
}

impl BridgeHub {
    /// Spawns a bridge for every resource and starts loading them.
    ///
    /// Returns the hub and whether the SDK reported itself available. With an unavailable
    /// SDK the hub still works, but every resource stays not ready.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`BridgeError::DuplicateResource`] if a key appears twice or is already routed.
    /// Nothing is spawned or registered in that case.
    pub fn initialize(
        config: BridgeConfig,
        router: EventRouter,
        sdk: Arc<dyn SdkAdapter>,
        resources: impl IntoIterator<Item = ResourceDefinition>,
    ) -> Result<(Self, bool), BridgeError> {
        let fanout = OutcomeFanout::new(config.event_buffer);
        Self::initialize_with_fanout(config, router, sdk, fanout, resources)
    }

    /// Like [`initialize`](Self::initialize), publishing on a fan-out the caller created.
    ///
    /// Subscribers registered on `fanout` beforehand see every event, including the
    /// first loads.
    pub fn initialize_with_fanout(
        config: BridgeConfig,
        router: EventRouter,
        sdk: Arc<dyn SdkAdapter>,
        fanout: OutcomeFanout,
        resources: impl IntoIterator<Item = ResourceDefinition>,
    ) -> Result<(Self, bool), BridgeError> {
        let resources: Vec<ResourceDefinition> = resources.into_iter().collect();
        let mut keys = HashSet::with_capacity(resources.len());
        for resource in &resources {
            if !keys.insert(&resource.key) || router.is_registered(&resource.key) {
                return Err(BridgeError::DuplicateResource(resource.key.clone()));
            }
        }

        let available = sdk.is_available();
        let mut hub = Self {
            fanout,
            config,
            router,
            ledger: OperationLedger::new(),
            sdk,
            clients: HashMap::new(),
            handles: Vec::new(),
        };

        for resource in resources {
            if let Err(error) = hub.add_resource(resource) {
                hub.abort();
                return Err(error);
            }
        }

        if !available {
            warn!("SDK unavailable, resources will report NotReady");
        }
        info!(resources = hub.clients.len(), available, "Bridge hub initialized");
        Ok((hub, available))
    }

    /// Stops every bridge without waiting. Only used when initialization fails partway,
    /// before any operation could have started.
    fn abort(self) {
        for (key, handle) in &self.handles {
            warn!(resource = %key, "Aborting bridge after failed initialization");
            handle.abort();
        }
    }

    /// Adds and starts one more resource.
    pub fn add_resource(&mut self, resource: ResourceDefinition) -> Result<BridgeClient, BridgeError> {
        let ResourceDefinition { key, kind } = resource;
        if self.clients.contains_key(&key) {
            return Err(BridgeError::DuplicateResource(key));
        }

        let (bridge, client) = LifecycleBridge::new(
            key.clone(),
            kind,
            self.config.clone(),
            self.ledger.clone(),
            self.fanout.clone(),
            &self.router,
        )?;
        let handle = tokio::spawn(bridge.run(Arc::clone(&self.sdk)));
        client.load()?;

        self.clients.insert(key.clone(), client.clone());
        self.handles.push((key, handle));
        Ok(client)
    }

    pub fn client(&self, key: &ResourceKey) -> Result<&BridgeClient, BridgeError> {
        self.clients
            .get(key)
            .ok_or_else(|| BridgeError::UnknownResource(key.clone()))
    }

    pub fn clients(&self) -> impl Iterator<Item = &BridgeClient> {
        self.clients.values()
    }

    pub fn load(&self, key: &ResourceKey) -> Result<(), BridgeError> {
        self.client(key)?.load()
    }

    pub fn is_ready(&self, key: &ResourceKey) -> bool {
        self.clients.get(key).is_some_and(BridgeClient::is_ready)
    }

    pub fn readiness(&self, key: &ResourceKey) -> Option<Readiness> {
        self.clients.get(key).map(BridgeClient::readiness)
    }

    pub async fn show(&self, key: &ResourceKey, context: OperationContext) -> Outcome {
        match self.client(key) {
            Ok(client) => client.show(context).await,
            Err(error) => Outcome::rejected(key.clone(), error),
        }
    }

    pub async fn purchase(&self, key: &ResourceKey) -> Outcome {
        match self.client(key) {
            Ok(client) => client.purchase().await,
            Err(error) => Outcome::rejected(key.clone(), error),
        }
    }

    pub async fn confirm_purchase(&self, key: &ResourceKey) -> Result<(), BridgeError> {
        self.client(key)?.confirm_purchase().await
    }

    pub async fn restore(&self, key: &ResourceKey) -> Outcome {
        match self.client(key) {
            Ok(client) => client.restore().await,
            Err(error) => Outcome::rejected(key.clone(), error),
        }
    }

    pub async fn request_permission(&self, key: &ResourceKey) -> Outcome {
        match self.client(key) {
            Ok(client) => client.request_permission().await,
            Err(error) => Outcome::rejected(key.clone(), error),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.fanout.subscribe()
    }

    pub fn register_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionHandle {
        self.fanout.register(subscriber)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    pub fn fanout(&self) -> &OutcomeFanout {
        &self.fanout
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Stops every bridge and waits for its task.
    ///
    /// # Errors
    /// [`BridgeError::TaskFailed`] if any bridge task panicked. Its pending operation, if
    /// any, is failed so no caller hangs.
    pub async fn shutdown(self) -> Result<(), BridgeError> {
        info!(resources = self.clients.len(), "Shutting down bridge hub");

        for client in self.clients.values() {
            // A bridge that already stopped has nothing left to shut down.
            let _ = client.shutdown();
        }

        let mut failure = None;
        for (key, handle) in self.handles {
            if let Err(join_error) = handle.await {
                error!(resource = %key, error = %join_error, "Bridge task failed");
                let error = BridgeError::TaskFailed(join_error.to_string());
                self.ledger.abandon(&key, error.clone());
                failure.get_or_insert(error);
            }
        }

        match failure {
            Some(error) => Err(error),
            None => {
                info!("Bridge hub shutdown complete");
                Ok(())
            }
        }
    }
}
