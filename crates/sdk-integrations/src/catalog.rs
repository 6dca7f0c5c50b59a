//! Store product metadata.
//!
//! The store reports title, price and availability for each product when it initializes.
//! [`ProductCatalog`] listens for those reports on the fan-out and keeps the latest one
//! per product id, for [`StoreClient`](crate::clients::StoreClient) to hand out.
use async_trait::async_trait;
use callback_bridge::{BridgeEvent, EventSubscriber, ProductDetails, SubscriberError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    details: Arc<Mutex<HashMap<String, ProductDetails>>>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product_id: &str) -> Option<ProductDetails> {
        self.details.lock().get(product_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.details.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.details.lock().is_empty()
    }
}

#[async_trait]
impl EventSubscriber for ProductCatalog {
    fn name(&self) -> &str {
        "product-catalog"
    }

    async fn on_event(&self, event: &BridgeEvent) -> Result<(), SubscriberError> {
        if let BridgeEvent::ProductDetails { key, details } = event {
            debug!(product = %key, price = %details.price_string, available = details.available, "Product metadata");
            self.details
                .lock()
                .insert(key.to_string(), details.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback_bridge::ResourceKey;

    fn details(price: f64) -> ProductDetails {
        ProductDetails {
            title: "100 Gems".to_string(),
            description: "A small pouch of gems".to_string(),
            price_string: format!("${price:.2}"),
            price,
            currency_code: "USD".to_string(),
            available: true,
        }
    }

    #[tokio::test]
    async fn test_latest_report_wins() {
        let catalog = ProductCatalog::new();
        assert!(catalog.is_empty());

        for price in [0.99, 1.49] {
            catalog
                .on_event(&BridgeEvent::ProductDetails {
                    key: ResourceKey::new("gems_100"),
                    details: details(price),
                })
                .await
                .unwrap();
        }
        catalog
            .on_event(&BridgeEvent::Loaded {
                key: ResourceKey::new("gems_100"),
            })
            .await
            .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("gems_100"), Some(details(1.49)));
        assert_eq!(catalog.get("no_ads"), None);
    }
}
