//! Store catalog entries and purchase results.
//!
//! Each configured product becomes its own `Product` resource keyed by the product id,
//! so one product can be mid-purchase while another is still purchasable.
use callback_bridge::{
    BridgeError, Outcome, OutcomePayload, OutcomeStatus, ProductDetails, PurchaseFailureReason,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Consumable,
    NonConsumable,
    Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Store product id. Also the bridge resource key.
    pub id: String,
    pub product_type: ProductType,
}

impl ProductConfig {
    pub fn new(id: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            id: id.into(),
            product_type,
        }
    }
}

/// A configured product and what the store reported about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreProduct {
    pub config: ProductConfig,
    /// `None` until the store has reported metadata for the product.
    pub details: Option<ProductDetails>,
}

impl StoreProduct {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Whether the store will sell the product. Products without metadata are not.
    pub fn is_available(&self) -> bool {
        self.details.as_ref().is_some_and(|details| details.available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseResult {
    pub product_id: String,
    pub transaction_id: Option<String>,
    /// Store receipt, passed on untouched for server-side validation.
    pub receipt: Option<String>,
    pub failure_reason: Option<PurchaseFailureReason>,
    pub error_message: Option<String>,
}

impl PurchaseResult {
    pub fn success(
        product_id: impl Into<String>,
        transaction_id: impl Into<String>,
        receipt: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: Some(transaction_id.into()),
            receipt: Some(receipt.into()),
            failure_reason: None,
            error_message: None,
        }
    }

    pub fn failure(
        product_id: impl Into<String>,
        reason: PurchaseFailureReason,
        message: Option<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            transaction_id: None,
            receipt: None,
            failure_reason: Some(reason),
            error_message: message,
        }
    }

    /// Maps a purchase outcome.
    ///
    /// A product that is not ready means the store is not initialized, so it reports
    /// `PurchasingUnavailable`. Bridge-level failures (timeouts, a closed bridge) have no
    /// store reason and report `Unknown`.
    pub fn from_outcome(product_id: &str, outcome: &Outcome) -> Self {
        match (outcome.status(), outcome.payload(), outcome.error()) {
            (
                OutcomeStatus::Success,
                Some(OutcomePayload::Transaction {
                    transaction_id,
                    receipt,
                }),
                _,
            ) => Self::success(product_id, transaction_id.as_str(), receipt.as_str()),
            (OutcomeStatus::Cancelled, _, _) => {
                Self::failure(product_id, PurchaseFailureReason::UserCancelled, None)
            }
            (OutcomeStatus::NotReady, _, _) => Self::failure(
                product_id,
                PurchaseFailureReason::PurchasingUnavailable,
                Some("Store not initialized".to_string()),
            ),
            (_, _, Some(BridgeError::PurchaseFailed { reason, message })) => {
                Self::failure(product_id, *reason, message.clone())
            }
            (_, _, error) => Self::failure(
                product_id,
                PurchaseFailureReason::Unknown,
                error.map(ToString::to_string),
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback_bridge::{OperationId, ResourceKey};
    use std::time::Duration;

    fn key() -> ResourceKey {
        ResourceKey::new("gems_100")
    }

    #[test]
    fn test_store_reason_is_kept() {
        let outcome = Outcome::failed(
            key(),
            Some(OperationId::from(4)),
            BridgeError::PurchaseFailed {
                reason: PurchaseFailureReason::PaymentDeclined,
                message: Some("card expired".to_string()),
            },
        );
        let result = PurchaseResult::from_outcome("gems_100", &outcome);
        assert!(!result.is_success());
        assert_eq!(result.failure_reason, Some(PurchaseFailureReason::PaymentDeclined));
        assert_eq!(result.error_message.as_deref(), Some("card expired"));
    }

    #[test]
    fn test_product_without_metadata_is_unavailable() {
        let config = ProductConfig::new("no_ads", ProductType::NonConsumable);
        let mut product = StoreProduct {
            config,
            details: None,
        };
        assert!(!product.is_available());

        product.details = Some(ProductDetails {
            title: "Remove Ads".to_string(),
            description: String::new(),
            price_string: "$2.99".to_string(),
            price: 2.99,
            currency_code: "USD".to_string(),
            available: false,
        });
        assert!(!product.is_available());
        assert_eq!(product.id(), "no_ads");
    }

    #[test]
    fn test_not_ready_means_purchasing_unavailable() {
        let result = PurchaseResult::from_outcome("gems_100", &Outcome::not_ready(key()));
        assert_eq!(
            result.failure_reason,
            Some(PurchaseFailureReason::PurchasingUnavailable)
        );
    }

    #[test]
    fn test_timeout_has_no_store_reason() {
        let outcome = Outcome::failed(
            key(),
            Some(OperationId::from(5)),
            BridgeError::Timeout(Duration::from_secs(30)),
        );
        let result = PurchaseResult::from_outcome("gems_100", &outcome);
        assert_eq!(result.failure_reason, Some(PurchaseFailureReason::Unknown));
        assert!(result.error_message.unwrap().contains("timed out"));
    }
}
