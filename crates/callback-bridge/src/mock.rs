//! # Mock SDK & Testing Guide
//!
//! [`MockSdk`] implements [`SdkAdapter`] entirely in memory. It records every call, can be
//! told to reject the next call of a given kind, and can answer calls by emitting scripted
//! [`RawEvent`]s through an attached [`EventSink`], exactly as a native SDK would.
//!
//! ## When to use the mock vs a scripted SDK
//!
//! | Feature | `MockSdk` | Hand-written `SdkAdapter` |
//! |---------|-----------|---------------------------|
//! | **Setup** | One line | A struct and an `impl` |
//! | **Determinism** | Events pushed synchronously from the call | Whatever you write |
//! | **Event order** | Test drives it through the router | Built into the adapter |
//! | **Error injection** | `on(kind).fail_next(..)` | Manual |
//!
//! ## Testing Strategies
//!
//! <details>
//! <summary><b>Pattern 1: Test drives the events (ordering contracts)</b></summary>
//!
//! Let loads succeed automatically, then deliver the interesting events by hand so the
//! test controls their order precisely.
//!
//! ```rust
//! use callback_bridge::mock::{CallKind, MockSdk};
//! use callback_bridge::{
//!     BridgeConfig, BridgeHub, EventRouter, EventSink, OperationContext, OutcomeStatus,
//!     RawEvent, RawEventKind, ResourceDefinition, ResourceKey, ResourceKind,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = EventRouter::new();
//!     let sdk = MockSdk::new();
//!     sdk.attach(Arc::new(router.clone()));
//!     sdk.on(CallKind::Load).emit([RawEventKind::LoadSucceeded]);
//!
//!     let key = ResourceKey::new("rewarded_main");
//!     let (hub, _) = BridgeHub::initialize(
//!         BridgeConfig::default(),
//!         router.clone(),
//!         Arc::new(sdk.clone()),
//!         [ResourceDefinition::new(key.clone(), ResourceKind::RewardedAd)],
//!     )
//!     .unwrap();
//!     hub.client(&key).unwrap().wait_until_ready().await.unwrap();
//!
//!     let client = hub.client(&key).unwrap().clone();
//!     let show = tokio::spawn(async move { client.show(OperationContext::default()).await });
//!     sdk.wait_for_calls(CallKind::Show, &key, 1).await;
//!
//!     router.deliver(RawEvent::new("rewarded_main", RawEventKind::Dismissed));
//!     let outcome = show.await.unwrap();
//!     assert_eq!(outcome.status(), OutcomeStatus::Cancelled); // no reward was granted
//!
//!     hub.shutdown().await.unwrap();
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 2: Mock answers by itself (flows around the bridge)</b></summary>
//!
//! Script every call kind, e.g. `on(CallKind::Purchase).emit([PurchaseCompleted {..}])`,
//! and test the code that sits on top of the hub without touching the router at all.
//! See the `sdk-integrations` client tests.
//! </details>
//!
//! <details>
//! <summary><b>Pattern 3: Failure injection</b></summary>
//!
//! `sdk.on(CallKind::Show).fail_next(SdkError::new(3, "activity destroyed"))` makes the
//! next `show` call return an error, which the bridge turns into a `Failed` outcome
//! without waiting for any event.
//! </details>

use crate::event::{RawEvent, RawEventKind};
use crate::resource::{ResourceKey, ResourceKind};
use crate::router::EventSink;
use crate::sdk::{OperationContext, SdkAdapter, SdkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Load,
    Show,
    Purchase,
    ConfirmPurchase,
    Restore,
    RequestPermission,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkCall {
    pub kind: CallKind,
    pub key: ResourceKey,
    pub placement: Option<String>,
}

struct MockState {
    available: bool,
    sink: Option<Arc<dyn EventSink>>,
    calls: Vec<SdkCall>,
    failures: HashMap<CallKind, VecDeque<SdkError>>,
    responses: HashMap<CallKind, Vec<RawEventKind>>,
}

/// In-memory [`SdkAdapter`]. Clones share state.
#[derive(Clone)]
pub struct MockSdk {
    state: Arc<Mutex<MockState>>,
    changed: Arc<Notify>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockSdk")
            .field("available", &state.available)
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl MockSdk {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                available: true,
                sink: None,
                calls: Vec::new(),
                failures: HashMap::new(),
                responses: HashMap::new(),
            })),
            changed: Arc::new(Notify::new()),
        }
    }

    /// A mock whose SDK never initialized.
    pub fn unavailable() -> Self {
        let sdk = Self::new();
        sdk.set_available(false);
        sdk
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Where scripted events are delivered, usually a clone of the router.
    pub fn attach(&self, sink: Arc<dyn EventSink>) {
        self.state.lock().sink = Some(sink);
    }

    /// Configures how calls of `kind` are answered.
    pub fn on(&self, kind: CallKind) -> ResponseBuilder {
        ResponseBuilder {
            kind,
            state: Arc::clone(&self.state),
        }
    }

    pub fn calls(&self) -> Vec<SdkCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, kind: CallKind, key: &ResourceKey) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind && &call.key == key)
            .count()
    }

    /// Resolves once at least `n` calls of `kind` were made for `key`.
    pub async fn wait_for_calls(&self, kind: CallKind, key: &ResourceKey, n: usize) {
        loop {
            let notified = self.changed.notified();
            if self.count(kind, key) >= n {
                return;
            }
            notified.await;
        }
    }

    fn record(
        &self,
        kind: CallKind,
        key: &ResourceKey,
        placement: Option<String>,
    ) -> Result<(), SdkError> {
        let mut state = self.state.lock();
        state.calls.push(SdkCall {
            kind,
            key: key.clone(),
            placement,
        });

        let failure = state
            .failures
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        let scripted = match (&failure, &state.sink) {
            (None, Some(sink)) => state
                .responses
                .get(&kind)
                .map(|events| (Arc::clone(sink), events.clone())),
            _ => None,
        };
        drop(state);

        if let Some((sink, events)) = scripted {
            for event in events {
                sink.deliver(RawEvent::new(key.as_str(), event));
            }
        }
        self.changed.notify_waiters();

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Fluent configuration returned by [`MockSdk::on`].
pub struct ResponseBuilder {
    kind: CallKind,
    state: Arc<Mutex<MockState>>,
}

impl ResponseBuilder {
    /// Every successful call of this kind delivers `events` for the called key, in order.
    pub fn emit(self, events: impl IntoIterator<Item = RawEventKind>) {
        self.state
            .lock()
            .responses
            .insert(self.kind, events.into_iter().collect());
    }

    /// The next call of this kind returns `error` and emits nothing.
    pub fn fail_next(self, error: SdkError) {
        self.state
            .lock()
            .failures
            .entry(self.kind)
            .or_default()
            .push_back(error);
    }
}

#[async_trait]
impl SdkAdapter for MockSdk {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    async fn load(&self, key: &ResourceKey, _kind: ResourceKind) -> Result<(), SdkError> {
        self.record(CallKind::Load, key, None)
    }

    async fn show(&self, key: &ResourceKey, context: &OperationContext) -> Result<(), SdkError> {
        self.record(CallKind::Show, key, context.placement.clone())
    }

    async fn purchase(&self, key: &ResourceKey) -> Result<(), SdkError> {
        self.record(CallKind::Purchase, key, None)
    }

    async fn confirm_purchase(&self, key: &ResourceKey) -> Result<(), SdkError> {
        self.record(CallKind::ConfirmPurchase, key, None)
    }

    async fn restore(&self, key: &ResourceKey) -> Result<(), SdkError> {
        self.record(CallKind::Restore, key, None)
    }

    async fn request_permission(&self, key: &ResourceKey) -> Result<(), SdkError> {
        self.record(CallKind::RequestPermission, key, None)
    }
}
