pub mod ad;
pub mod store;

pub use ad::{AdPlacement, AdResult, AdResultStatus, AdType};
pub use store::{ProductConfig, ProductType, PurchaseResult, StoreProduct};
