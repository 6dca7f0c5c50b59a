use crate::catalog::ProductCatalog;
use crate::clients::{AdClient, PushPermissionClient, StoreClient};
use crate::config::IntegrationConfig;
use crate::error::IntegrationError;
use callback_bridge::{
    BridgeClient, BridgeEvent, BridgeHub, EventRouter, EventSubscriber, OutcomeFanout,
    ResourceKey, SdkAdapter, SubscriptionHandle,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// The runtime orchestrator for every SDK integration.
///
/// `IntegrationSystem` is responsible for:
/// - **Lifecycle Management**: starting one bridge per configured resource and stopping
///   them all on shutdown
/// - **Wiring**: handing each client the bridges it drives (placements share ad unit
///   bridges, the store client owns product bridges plus the storefront)
/// - **Observation**: exposing the shared event fan-out to analytics subscribers, and
///   feeding store metadata into the product catalog from the first load on
///
/// # Example
///
/// ```ignore
/// let router = EventRouter::new();
/// let sdk = Arc::new(SimulatedSdk::new(Arc::new(router.clone()), SimulationProfile::default()));
/// let system = IntegrationSystem::initialize(config, router, sdk)?;
///
/// let result = system.ads.show_rewarded("double_coins").await?;
/// let purchase = system.store.purchase("gems_100").await?;
///
/// system.shutdown().await?;
/// ```
pub struct IntegrationSystem {
    /// Rewarded and interstitial placements.
    pub ads: AdClient,

    /// Product purchases and restore.
    pub store: StoreClient,

    /// `None` when push is disabled in the configuration.
    pub push: Option<PushPermissionClient>,

    hub: BridgeHub,
    sdk_available: bool,
    catalog_subscription: SubscriptionHandle,
}

impl IntegrationSystem {
    /// Validates `config`, starts every bridge and begins loading.
    ///
    /// The router must be the one the SDK delivers its callbacks to. Must be called from
    /// within a Tokio runtime.
    pub fn initialize(
        config: IntegrationConfig,
        router: EventRouter,
        sdk: Arc<dyn SdkAdapter>,
    ) -> Result<Self, IntegrationError> {
        config.validate()?;

        // Registered before any bridge starts, so no product metadata report is missed.
        let fanout = OutcomeFanout::new(config.bridge.event_buffer);
        let catalog = ProductCatalog::new();
        let catalog_subscription = fanout.register(Arc::new(catalog.clone()));

        let (hub, sdk_available) = BridgeHub::initialize_with_fanout(
            config.bridge.clone(),
            router,
            sdk,
            fanout,
            config.resources(),
        )?;

        let bridges: HashMap<String, BridgeClient> = hub
            .clients()
            .map(|client| (client.key().to_string(), client.clone()))
            .collect();

        let ads = AdClient::new(&config.placements, &bridges)?;
        let storefront = hub.client(&ResourceKey::new(config.store_key.as_str()))?.clone();
        let store = StoreClient::new(&config.products, &bridges, storefront, catalog)?;
        let push = if config.push.enabled {
            let bridge = hub.client(&ResourceKey::new(config.push.key.as_str()))?.clone();
            Some(PushPermissionClient::new(bridge))
        } else {
            None
        };

        info!(
            placements = config.placements.len(),
            products = config.products.len(),
            push = push.is_some(),
            sdk_available,
            "Integration system started"
        );
        Ok(Self {
            ads,
            store,
            push,
            hub,
            sdk_available,
            catalog_subscription,
        })
    }

    /// Whether the SDK reported itself initialized at startup.
    pub fn sdk_available(&self) -> bool {
        self.sdk_available
    }

    pub fn hub(&self) -> &BridgeHub {
        &self.hub
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.hub.subscribe()
    }

    pub fn register_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionHandle {
        self.hub.register_subscriber(subscriber)
    }

    /// Gracefully shuts down every bridge.
    ///
    /// Operations still in flight settle as failed, so no caller is left waiting. Returns
    /// an error if any bridge task panicked.
    pub async fn shutdown(self) -> Result<(), IntegrationError> {
        info!("Shutting down integrations...");
        drop(self.ads);
        drop(self.store);
        drop(self.push);
        self.catalog_subscription.unsubscribe();

        if let Err(e) = self.hub.shutdown().await {
            error!(error = %e, "Integration shutdown failed");
            return Err(e.into());
        }

        info!("Integration shutdown complete.");
        Ok(())
    }
}
