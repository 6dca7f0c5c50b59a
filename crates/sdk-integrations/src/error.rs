use crate::model::AdType;
use callback_bridge::BridgeError;
use std::path::PathBuf;

/// Errors raised while loading or validating an [`IntegrationConfig`](crate::config::IntegrationConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Empty {0}")]
    EmptyKey(&'static str),

    #[error("Duplicate placement id: {0}")]
    DuplicatePlacement(String),

    #[error("Duplicate product id: {0}")]
    DuplicateProduct(String),

    #[error("Ad unit {ad_unit_id} is used as both {first:?} and {second:?}")]
    ConflictingAdUnit {
        ad_unit_id: String,
        first: AdType,
        second: AdType,
    },

    /// Two resources of different kinds would share one router key.
    #[error("Resource key {0} is claimed more than once")]
    KeyCollision(String),
}

/// Errors surfaced by the integration clients.
///
/// Operation outcomes (a declined payment, a skipped ad) are results, not errors; these
/// variants cover misuse and infrastructure failures only.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown placement: {0}")]
    UnknownPlacement(String),

    #[error("Placement {placement} is {actual:?}, not {expected:?}")]
    WrongAdType {
        placement: String,
        expected: AdType,
        actual: AdType,
    },

    #[error("Unknown product: {0}")]
    UnknownProduct(String),
}
