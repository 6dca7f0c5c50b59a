//! # Callback Bridge
//!
//! Ad mediation, in-app purchase and push SDKs report results through native callbacks:
//! unordered, sometimes late, sometimes duplicated, and delivered on threads the host
//! does not control. This crate turns that stream into ordinary awaitable operations:
//!
//! ```rust,ignore
//! let outcome = hub.show(&ResourceKey::new("rewarded_main"), OperationContext::default()).await;
//! match outcome.status() {
//!     OutcomeStatus::Success => grant_coins(),
//!     OutcomeStatus::Cancelled => { /* closed early, no reward */ }
//!     OutcomeStatus::NotReady => show_retry_later(),
//!     OutcomeStatus::Failed => log_failure(outcome.error()),
//! }
//! ```
//!
//! while tracking per-resource *readiness* that outlives any single operation (an ad unit
//! reloads itself after every show and retries failed loads with backoff).
//!
//! ## Architecture Overview
//!
//! ```text
//!  SDK callbacks ──> EventRouter ──(per-key mailbox)──> LifecycleBridge ──> OperationLedger
//!   (any thread)     (EventSink)                        (one per resource)   (settles once)
//!                                                              │                   │
//!  host ──> BridgeHub / BridgeClient ──(same mailbox)──────────┘      OperationHandle (caller)
//!                                                              │
//!                                                              └──> OutcomeFanout ──> subscribers
//! ```
//!
//! 1. **State layer** ([`ResourceState`], [`Operation`], [`Outcome`]) - plain data with
//!    the in-flight invariant built into its transitions.
//! 2. **Runtime layer** ([`LifecycleBridge`], [`OperationLedger`], [`EventRouter`]) -
//!    message processing, settlement races and event routing.
//! 3. **Interface layer** ([`BridgeHub`], [`BridgeClient`], [`OutcomeFanout`]) - what the
//!    host calls and listens to.
//!
//! ## Concurrency Model
//!
//! - Each resource is owned by one bridge task; its transitions are serialized by the
//!   mailbox, so [`ResourceState`] needs no lock.
//! - SDK events and host calls share that mailbox, so per-key arrival order is preserved.
//!   There is no ordering across keys.
//! - The ledger is the only shared mutable structure on the hot path. The first of
//!   {terminal event, caller cancel, timeout} to reach it wins; the rest are no-ops.
//!
//! ## Testing
//!
//! [`mock::MockSdk`] stands in for a native SDK: it records calls, injects failures and
//! emits scripted events through the router. See the [`mock`] module for patterns.

pub mod bridge;
pub mod client;
pub mod error;
pub mod event;
pub mod fanout;
pub mod hub;
pub mod ledger;
pub mod message;
pub mod mock;
pub mod operation;
pub mod policy;
pub mod resource;
pub mod router;
pub mod sdk;
pub mod tracing;

// Re-export core types for convenience
pub use bridge::LifecycleBridge;
pub use client::BridgeClient;
pub use error::BridgeError;
pub use event::{
    PermissionStatus, ProductDetails, PurchaseFailureReason, RawEvent, RawEventKind, Reward,
};
pub use fanout::{
    BridgeEvent, EventSubscriber, OutcomeFanout, RevenueRecord, SubscriberError,
    SubscriptionHandle,
};
pub use hub::{BridgeHub, ResourceDefinition};
pub use ledger::{OperationLedger, Settlement};
pub use operation::{
    CancelHandle, Operation, OperationHandle, OperationId, OperationKind, Outcome, OutcomePayload,
    OutcomeStatus,
};
pub use policy::{BridgeConfig, RetryPolicy};
pub use resource::{Readiness, ResourceKey, ResourceKind, ResourceState};
pub use router::{EventRouter, EventSink};
pub use sdk::{OperationContext, SdkAdapter, SdkError};
