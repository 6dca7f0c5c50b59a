//! # Store Client
//!
//! Purchases by product id, confirms purchases the store left pending, and restores
//! previous purchases. Each product is its own bridge, so purchases of different products
//! never block each other. Receipts are passed through untouched.
use crate::catalog::ProductCatalog;
use crate::error::IntegrationError;
use crate::model::{ProductConfig, PurchaseResult, StoreProduct};
use callback_bridge::{BridgeClient, BridgeError, OutcomePayload, OutcomeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct StoreClient {
    products: Arc<HashMap<String, (ProductConfig, BridgeClient)>>,
    storefront: BridgeClient,
    catalog: ProductCatalog,
}

impl StoreClient {
    pub(crate) fn new(
        configured: &[ProductConfig],
        bridges: &HashMap<String, BridgeClient>,
        storefront: BridgeClient,
        catalog: ProductCatalog,
    ) -> Result<Self, IntegrationError> {
        let mut products = HashMap::with_capacity(configured.len());
        for product in configured {
            let bridge = bridges
                .get(&product.id)
                .cloned()
                .ok_or_else(|| BridgeError::UnknownResource(product.id.as_str().into()))?;
            products.insert(product.id.clone(), (product.clone(), bridge));
        }
        Ok(Self {
            products: Arc::new(products),
            storefront,
            catalog,
        })
    }

    /// Whether the store finished initializing.
    pub fn is_ready(&self) -> bool {
        self.storefront.is_ready()
    }

    pub fn is_product_ready(&self, product_id: &str) -> bool {
        self.products
            .get(product_id)
            .is_some_and(|(_, bridge)| bridge.is_ready())
    }

    /// The configured product with the store's latest metadata for it.
    pub fn product(&self, product_id: &str) -> Option<StoreProduct> {
        self.products.get(product_id).map(|(config, _)| StoreProduct {
            config: config.clone(),
            details: self.catalog.get(product_id),
        })
    }

    /// Every configured product, sorted by id.
    pub fn products(&self) -> Vec<StoreProduct> {
        let mut ids: Vec<&String> = self.products.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.product(id)).collect()
    }

    /// Buys one product. Declines, cancellations and an uninitialized store are reported
    /// in the [`PurchaseResult`]; only an unknown product id is an error.
    #[instrument(skip(self))]
    pub async fn purchase(&self, product_id: &str) -> Result<PurchaseResult, IntegrationError> {
        let (_, bridge) = self
            .products
            .get(product_id)
            .ok_or_else(|| IntegrationError::UnknownProduct(product_id.to_string()))?;

        debug!("Sending purchase request");
        let outcome = bridge.purchase().await;
        let result = PurchaseResult::from_outcome(product_id, &outcome);
        match result.failure_reason {
            None => info!(transaction_id = ?result.transaction_id, "Purchase completed"),
            Some(reason) => info!(?reason, "Purchase not completed"),
        }
        Ok(result)
    }

    /// Finalizes a purchase the store reported as `ExistingPurchasePending`, once the
    /// host has delivered the content.
    #[instrument(skip(self))]
    pub async fn confirm_purchase(&self, product_id: &str) -> Result<(), IntegrationError> {
        let (_, bridge) = self
            .products
            .get(product_id)
            .ok_or_else(|| IntegrationError::UnknownProduct(product_id.to_string()))?;

        bridge.confirm_purchase().await.map_err(|error| {
            warn!(%error, "Pending purchase not confirmed");
            IntegrationError::from(error)
        })?;
        info!("Pending purchase confirmed");
        Ok(())
    }

    /// Restores non-consumables and subscriptions. `true` once the store confirms.
    #[instrument(skip(self))]
    pub async fn restore_purchases(&self) -> bool {
        let outcome = self.storefront.restore().await;
        match (outcome.status(), outcome.payload()) {
            (OutcomeStatus::Success, Some(OutcomePayload::Restored { count })) => {
                info!(restored = count, "Purchases restored");
                true
            }
            (OutcomeStatus::Success, _) => true,
            (status, _) => {
                warn!(?status, error = ?outcome.error(), "Restore did not complete");
                false
            }
        }
    }
}
