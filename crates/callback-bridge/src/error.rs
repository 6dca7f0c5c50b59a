//! # Bridge Errors
//!
//! This module defines the error taxonomy shared by every bridge, client and hub.
//! Raw SDK failures ([`SdkError`](crate::sdk::SdkError)) are translated into one of
//! these variants at the router or bridge boundary and never travel further.
//!
//! Not every variant is a failure in the usual sense: [`BridgeError::NotReady`] is a
//! synchronous, non-exceptional answer, and [`BridgeError::UserCancelled`] is a terminal
//! result the caller is expected to branch on.

use crate::event::PurchaseFailureReason;
use crate::resource::{ResourceKey, ResourceKind};
use crate::operation::OperationKind;
use std::time::Duration;

/// Errors produced by the bridge layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The resource exists but is not currently usable. Never retried by the bridge.
    #[error("Resource not ready: {0}")]
    NotReady(ResourceKey),

    /// A load attempt failed. Retried automatically according to the retry policy.
    #[error("Load failed: {0}")]
    LoadFailed(String),

    /// The SDK could not display the resource. Terminal for the operation.
    #[error("Display failed: {0}")]
    DisplayFailed(String),

    /// The store reported a failed purchase.
    #[error("Purchase failed ({reason:?}){}", detail_suffix(.message))]
    PurchaseFailed {
        reason: PurchaseFailureReason,
        message: Option<String>,
    },

    /// The store refused to finalize a pending purchase.
    #[error("Confirm purchase failed: {0}")]
    ConfirmFailed(String),

    /// The store could not restore previous purchases.
    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    /// The user backed out (closed a rewarded ad early, cancelled a purchase sheet).
    #[error("User cancelled")]
    UserCancelled,

    /// The user declined the permission prompt.
    #[error("Permission denied")]
    PermissionDenied,

    /// The external SDK is absent or misconfigured.
    #[error("SDK unavailable")]
    SdkUnavailable,

    /// No terminal event arrived within the configured operation timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The resource kind cannot run this operation (e.g. `Purchase` on an ad unit).
    #[error("{operation:?} is not supported by {kind:?} resource {key}")]
    Unsupported {
        key: ResourceKey,
        kind: ResourceKind,
        operation: OperationKind,
    },

    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceKey),

    #[error("Resource already registered: {0}")]
    DuplicateResource(ResourceKey),

    /// The bridge actor has stopped and no longer accepts messages.
    #[error("Bridge closed")]
    BridgeClosed,

    /// The bridge dropped a response channel without answering.
    #[error("Bridge dropped response channel")]
    BridgeDropped,

    #[error("Bridge task failed: {0}")]
    TaskFailed(String),
}

fn detail_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl BridgeError {
    /// Whether the bridge will retry this failure on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::LoadFailed(_))
    }
}
