//! # External SDK Capability
//!
//! [`SdkAdapter`] is the inbound seam to a native SDK. Calls only *request* work; results
//! come back later as [`RawEvent`](crate::event::RawEvent)s through the router. An `Ok(())`
//! from `show` means "the SDK accepted the request", nothing more.
//!
//! Ad networks only need `load` and `show`; the store and push adapters override the
//! remaining calls.

use crate::resource::{ResourceKey, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw failure reported synchronously by an SDK call.
///
/// Stops at the bridge: it is converted into a [`BridgeError`](crate::error::BridgeError)
/// or a failed outcome and never returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("SDK error {code}: {message}")]
pub struct SdkError {
    pub code: i32,
    pub message: String,
}

impl SdkError {
    pub const UNSUPPORTED: i32 = -1;
    pub const UNAVAILABLE: i32 = -2;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unsupported() -> Self {
        Self::new(Self::UNSUPPORTED, "operation not supported by this SDK")
    }

    pub fn unavailable() -> Self {
        Self::new(Self::UNAVAILABLE, "SDK not initialized")
    }
}

/// Per-call data forwarded to the SDK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Placement name reported to the ad network for analytics.
    pub placement: Option<String>,
}

impl OperationContext {
    pub fn with_placement(placement: impl Into<String>) -> Self {
        Self {
            placement: Some(placement.into()),
        }
    }
}

#[async_trait]
pub trait SdkAdapter: Send + Sync + 'static {
    /// `false` when the SDK is missing or failed to initialize. Loads are then reported
    /// as `SdkUnavailable` and never retried.
    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self, key: &ResourceKey, kind: ResourceKind) -> Result<(), SdkError>;

    async fn show(&self, key: &ResourceKey, context: &OperationContext) -> Result<(), SdkError>;

    async fn purchase(&self, _key: &ResourceKey) -> Result<(), SdkError> {
        Err(SdkError::unsupported())
    }

    /// Finalizes a purchase the store reported as pending (`ExistingPurchasePending`).
    async fn confirm_purchase(&self, _key: &ResourceKey) -> Result<(), SdkError> {
        Err(SdkError::unsupported())
    }

    async fn restore(&self, _key: &ResourceKey) -> Result<(), SdkError> {
        Err(SdkError::unsupported())
    }

    async fn request_permission(&self, _key: &ResourceKey) -> Result<(), SdkError> {
        Err(SdkError::unsupported())
    }
}
