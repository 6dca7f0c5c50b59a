//! # Resource State
//!
//! Per-resource data owned by exactly one [`LifecycleBridge`](crate::bridge::LifecycleBridge).
//! Nothing in here performs I/O; the transition helpers only keep the record internally
//! consistent so the bridge cannot break the in-flight invariant by accident.
//!
//! ## The In-Flight Invariant
//!
//! `pending_operation` is `Some` **if and only if** `readiness == Readiness::InFlight`.
//! Every mutation goes through a helper that moves both fields together, and
//! [`ResourceState::is_consistent`] is asserted throughout the test suite.
//!
//! ## State Names
//!
//! The bridge state machine is usually described as `Idle → Loading → Ready → Busy`.
//! Those map onto [`Readiness`] as:
//!
//! | State machine | `Readiness` |
//! |---------------|-------------|
//! | Idle | `NotLoaded` |
//! | Loading | `Loading` |
//! | Ready | `Ready` |
//! | Busy | `InFlight` |

use crate::operation::{OperationId, OperationKind};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque identifier of a resource (ad unit id, product id, permission name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// The family a resource belongs to.
///
/// The kind decides three things about a bridge:
/// - which [`OperationKind`]s it accepts,
/// - whether it reloads itself after a terminal outcome (reusable) or stops (one-shot),
/// - whether `Dismissed` is reward-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    InterstitialAd,
    RewardedAd,
    /// A purchasable store product.
    Product,
    /// The store itself; ready once the store is initialized. Hosts `Restore`.
    Storefront,
    PushPermission,
}

impl ResourceKind {
    pub fn accepts(self, operation: OperationKind) -> bool {
        matches!(
            (self, operation),
            (ResourceKind::InterstitialAd, OperationKind::Show)
                | (ResourceKind::RewardedAd, OperationKind::Show)
                | (ResourceKind::Product, OperationKind::Purchase)
                | (ResourceKind::Storefront, OperationKind::Restore)
                | (ResourceKind::PushPermission, OperationKind::PermissionRequest)
        )
    }

    /// Reusable resources reload automatically once an operation ends.
    pub fn is_reusable(self) -> bool {
        !matches!(self, ResourceKind::PushPermission)
    }

    pub fn is_reward_gated(self) -> bool {
        matches!(self, ResourceKind::RewardedAd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Readiness {
    NotLoaded,
    Loading,
    Ready,
    InFlight,
}

/// The persistent record of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    key: ResourceKey,
    kind: ResourceKind,
    readiness: Readiness,
    pending_operation: Option<OperationId>,
    retry_attempt: u32,
}

impl ResourceState {
    pub fn new(key: ResourceKey, kind: ResourceKind) -> Self {
        Self {
            key,
            kind,
            readiness: Readiness::NotLoaded,
            pending_operation: None,
            retry_attempt: 0,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn pending_operation(&self) -> Option<OperationId> {
        self.pending_operation
    }

    /// Load failures since the last successful load.
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn is_consistent(&self) -> bool {
        self.pending_operation.is_some() == (self.readiness == Readiness::InFlight)
    }

    // --- Transitions (bridge only) ---

    pub(crate) fn begin_loading(&mut self) {
        debug_assert!(self.pending_operation.is_none());
        self.readiness = Readiness::Loading;
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.readiness = Readiness::Ready;
        self.retry_attempt = 0;
    }

    /// Returns the attempt number the backoff should be computed from (pre-increment).
    pub(crate) fn mark_load_failed(&mut self) -> u32 {
        let attempt = self.retry_attempt;
        self.readiness = Readiness::NotLoaded;
        self.retry_attempt = self.retry_attempt.saturating_add(1);
        attempt
    }

    /// Used when loading cannot even be attempted (SDK unavailable).
    pub(crate) fn mark_idle(&mut self) {
        if self.pending_operation.is_none() {
            self.readiness = Readiness::NotLoaded;
        }
    }

    pub(crate) fn enter_flight(&mut self, id: OperationId) {
        self.readiness = Readiness::InFlight;
        self.pending_operation = Some(id);
    }

    pub(crate) fn leave_flight(&mut self) -> Option<OperationId> {
        let id = self.pending_operation.take();
        self.readiness = Readiness::NotLoaded;
        id
    }
}
