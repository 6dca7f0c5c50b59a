//! # Integration Configuration
//!
//! Everything the integrations need at startup lives in one TOML document:
//!
//! ```toml
//! store_key = "store"
//!
//! [bridge]
//! operation_timeout_ms = 60000
//!
//! [bridge.retry]
//! strategy = "exponential"
//! initial_delay_ms = 1000
//! factor = 2.0
//! max_delay_ms = 64000
//!
//! [[placements]]
//! id = "double_coins"
//! ad_type = "rewarded"
//! ad_unit_id = "rewarded_main"
//!
//! [[placements]]
//! id = "level_end"
//! ad_type = "interstitial"
//! ad_unit_id = "inter_main"
//! enabled = false
//!
//! [[products]]
//! id = "gems_100"
//! product_type = "consumable"
//!
//! [push]
//! enabled = true
//! key = "push"
//! ```
//!
//! Every section is optional. [`IntegrationConfig::validate`] runs on every load.

use crate::error::ConfigError;
use crate::model::{AdPlacement, AdType, ProductConfig};
use callback_bridge::{BridgeConfig, ResourceDefinition, ResourceKey, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

fn default_store_key() -> String {
    "store".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub key: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: "push".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub placements: Vec<AdPlacement>,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
    /// Key of the storefront resource, which is ready once the store is initialized.
    #[serde(default = "default_store_key")]
    pub store_key: String,
    #[serde(default)]
    pub push: PushConfig,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            placements: Vec::new(),
            products: Vec::new(),
            store_key: default_store_key(),
            push: PushConfig::default(),
        }
    }
}

impl IntegrationConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        debug!(
            placements = config.placements.len(),
            products = config.products.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_key.is_empty() {
            return Err(ConfigError::EmptyKey("store key"));
        }
        if self.push.enabled && self.push.key.is_empty() {
            return Err(ConfigError::EmptyKey("push key"));
        }

        let mut placement_ids = HashSet::new();
        let mut ad_units: HashMap<&str, AdType> = HashMap::new();
        for placement in &self.placements {
            if placement.id.is_empty() {
                return Err(ConfigError::EmptyKey("placement id"));
            }
            if placement.ad_unit_id.is_empty() {
                return Err(ConfigError::EmptyKey("ad unit id"));
            }
            if !placement_ids.insert(placement.id.as_str()) {
                return Err(ConfigError::DuplicatePlacement(placement.id.clone()));
            }
            match ad_units.get(placement.ad_unit_id.as_str()) {
                Some(&first) if first != placement.ad_type => {
                    return Err(ConfigError::ConflictingAdUnit {
                        ad_unit_id: placement.ad_unit_id.clone(),
                        first,
                        second: placement.ad_type,
                    });
                }
                Some(_) => {}
                None => {
                    ad_units.insert(&placement.ad_unit_id, placement.ad_type);
                }
            }
        }

        let mut product_ids = HashSet::new();
        for product in &self.products {
            if product.id.is_empty() {
                return Err(ConfigError::EmptyKey("product id"));
            }
            if !product_ids.insert(product.id.as_str()) {
                return Err(ConfigError::DuplicateProduct(product.id.clone()));
            }
        }

        let mut claimed = HashSet::new();
        for definition in self.resources() {
            if !claimed.insert(definition.key.clone()) {
                return Err(ConfigError::KeyCollision(definition.key.to_string()));
            }
        }
        Ok(())
    }

    /// The bridge resources this configuration needs: one per distinct ad unit, one per
    /// product, the storefront and, when enabled, push permission.
    pub fn resources(&self) -> Vec<ResourceDefinition> {
        let mut seen_units = HashSet::new();
        let mut resources: Vec<ResourceDefinition> = self
            .placements
            .iter()
            .filter(|placement| seen_units.insert(placement.ad_unit_id.as_str()))
            .map(|placement| {
                ResourceDefinition::new(
                    ResourceKey::new(placement.ad_unit_id.as_str()),
                    placement.ad_type.resource_kind(),
                )
            })
            .collect();

        resources.extend(self.products.iter().map(|product| {
            ResourceDefinition::new(ResourceKey::new(product.id.as_str()), ResourceKind::Product)
        }));
        resources.push(ResourceDefinition::new(
            ResourceKey::new(self.store_key.as_str()),
            ResourceKind::Storefront,
        ));
        if self.push.enabled {
            resources.push(ResourceDefinition::new(
                ResourceKey::new(self.push.key.as_str()),
                ResourceKind::PushPermission,
            ));
        }
        resources
    }
}
