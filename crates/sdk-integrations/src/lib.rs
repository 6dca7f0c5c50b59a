//! # SDK Integrations
//!
//! Ad, store and push-permission integrations built on `callback-bridge`.
//!
//! - **[config]**: the TOML document describing placements, products and push.
//! - **[model]**: host-facing data (`AdPlacement`, `AdResult`, `StoreProduct`, `PurchaseResult`).
//! - **[clients]**: `AdClient`, `StoreClient` and `PushPermissionClient`.
//! - **[lifecycle]**: `IntegrationSystem`, which starts and stops everything.
//! - **[revenue]**: a subscriber that totals impression revenue per currency.
//! - **[catalog]**: a subscriber that keeps the store's product metadata.
//! - **[simulator]**: an SDK that answers with delayed callbacks, for the demo and tests.

pub mod catalog;
pub mod clients;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod revenue;
pub mod simulator;

pub use config::{IntegrationConfig, PushConfig};
pub use error::{ConfigError, IntegrationError};
pub use lifecycle::IntegrationSystem;
