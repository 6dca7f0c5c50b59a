//! # Lifecycle Bridge
//!
//! The `LifecycleBridge` is the per-resource actor. It owns one [`ResourceState`], reads a
//! single mailbox and turns the unordered stream of SDK events for its key into exactly
//! one [`Outcome`] per operation, while keeping readiness alive across operations.
//!
//! ## State machine
//!
//! ```text
//!            load()              LoadSucceeded
//!   Idle ───────────> Loading ─────────────────> Ready
//!    ^  <─────────────   │                         │ show / purchase /
//!    │   LoadFailed      │                         │ restore / request_permission
//!    │  (retry timer)    │                         v
//!    └──────────────────────────────────────────  Busy
//!         terminal event, cancel or timeout
//!         (reusable kinds reload once the SDK answered)
//! ```
//!
//! A cancel or timeout settles the operation without the SDK's answer. The SDK still owes
//! that answer, so the resource stays out of `Ready` until the late terminal event arrives
//! or `orphan_grace_ms` passes. Otherwise the late event would end the next operation.
//!
//! If the task dies while an operation is in flight (a panicking adapter), dropping the
//! bridge settles it `Failed(TaskFailed)` so the caller is never left waiting.
//!
//! ## Concurrency Model
//!
//! Host requests, translated SDK events, retry timers and ledger notifications all arrive
//! on the same unbounded mailbox and are processed one at a time, so the state needs no
//! lock. The only shared structures are the [`OperationLedger`] (settlement races with
//! caller cancellation and timeouts) and the fan-out channel.
//!
//! ## Usage Pattern
//!
//! Same three steps as any actor in this crate: create, wire, run. The SDK is injected
//! late, when the loop starts, so glue code can be built from the router first.
//!
//! ```rust
//! use callback_bridge::mock::MockSdk;
//! use callback_bridge::{
//!     BridgeConfig, EventRouter, LifecycleBridge, OperationLedger, OutcomeFanout,
//!     ResourceKey, ResourceKind,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = EventRouter::new();
//!     let (bridge, client) = LifecycleBridge::new(
//!         ResourceKey::new("interstitial_main"),
//!         ResourceKind::InterstitialAd,
//!         BridgeConfig::default(),
//!         OperationLedger::new(),
//!         OutcomeFanout::new(16),
//!         &router,
//!     )
//!     .unwrap();
//!
//!     tokio::spawn(bridge.run(Arc::new(MockSdk::new())));
//!
//!     client.load().unwrap();
//!     assert!(!client.is_ready());
//!     client.shutdown().unwrap();
//! }
//! ```

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::event::{PermissionStatus, PurchaseFailureReason, ResourceEvent, Reward};
use crate::fanout::{BridgeEvent, OutcomeFanout};
use crate::ledger::{OperationLedger, Settlement};
use crate::message::{BridgeMessage, SettleNotifier};
use crate::operation::{OperationHandle, OperationId, OperationKind, Outcome, OutcomePayload};
use crate::policy::BridgeConfig;
use crate::resource::{Readiness, ResourceKey, ResourceKind, ResourceState};
use crate::router::{EventRouter, Registration};
use crate::sdk::{OperationContext, SdkAdapter, SdkError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bookkeeping for the operation currently in flight.
struct CurrentOperation {
    id: OperationId,
    kind: OperationKind,
    /// Set by `RewardGranted` and consumed by `Dismissed`.
    reward: Option<Reward>,
    timeout: Option<JoinHandle<()>>,
}

impl CurrentOperation {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timeout.take() {
            timer.abort();
        }
    }
}

/// An operation settled by cancel or timeout whose terminal event the SDK still owes.
struct OrphanedOperation {
    id: OperationId,
    kind: OperationKind,
    grace: JoinHandle<()>,
}

/// The per-resource actor. See the module docs for the state machine.
pub struct LifecycleBridge {
    state: ResourceState,
    receiver: mpsc::UnboundedReceiver<BridgeMessage>,
    mailbox: mpsc::UnboundedSender<BridgeMessage>,
    ledger: OperationLedger,
    fanout: OutcomeFanout,
    config: BridgeConfig,
    readiness: watch::Sender<Readiness>,
    current: Option<CurrentOperation>,
    /// Most recent operation, used to attribute late terminal events.
    last_operation: Option<(OperationId, OperationKind)>,
    orphan: Option<OrphanedOperation>,
    retry_generation: u64,
    _registration: Registration,
}

impl LifecycleBridge {
    /// Creates a bridge and its client, and registers the key with `router`.
    ///
    /// The bridge does nothing until [`run`](Self::run) is spawned.
    ///
    /// # Errors
    /// [`BridgeError::DuplicateResource`] if a live bridge already owns `key`.
    pub fn new(
        key: ResourceKey,
        kind: ResourceKind,
        config: BridgeConfig,
        ledger: OperationLedger,
        fanout: OutcomeFanout,
        router: &EventRouter,
    ) -> Result<(Self, BridgeClient), BridgeError> {
        let (mailbox, receiver) = mpsc::unbounded_channel();
        let registration = router.register(key.clone(), mailbox.clone())?;
        let (readiness, readiness_rx) = watch::channel(Readiness::NotLoaded);

        let client = BridgeClient::new(key.clone(), kind, mailbox.clone(), readiness_rx);
        let bridge = Self {
            state: ResourceState::new(key, kind),
            receiver,
            mailbox,
            ledger,
            fanout,
            config,
            readiness,
            current: None,
            last_operation: None,
            orphan: None,
            retry_generation: 0,
            _registration: registration,
        };
        Ok((bridge, client))
    }

    /// Runs the mailbox loop until a `Shutdown` message arrives.
    ///
    /// Any operation still pending at shutdown is settled `Failed(BridgeClosed)`, and
    /// requests still queued behind the shutdown are refused.
    pub async fn run(mut self, sdk: Arc<dyn SdkAdapter>) {
        let key = self.state.key().clone();
        info!(resource = %key, kind = ?self.state.kind(), "Bridge started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                BridgeMessage::Load => self.load(sdk.as_ref()).await,
                BridgeMessage::Begin {
                    kind,
                    context,
                    respond_to,
                } => self.begin(sdk.as_ref(), kind, context, respond_to).await,
                BridgeMessage::Snapshot { respond_to } => {
                    let _ = respond_to.send(self.state.clone());
                }
                BridgeMessage::ConfirmPurchase { respond_to } => {
                    let result = self.confirm_purchase(sdk.as_ref()).await;
                    let _ = respond_to.send(result);
                }
                BridgeMessage::Event(event) => self.on_event(sdk.as_ref(), event).await,
                BridgeMessage::RetryDue { generation } => {
                    if generation == self.retry_generation {
                        debug!(resource = %key, generation, "Retrying load");
                        self.load(sdk.as_ref()).await;
                    } else {
                        debug!(resource = %key, generation, "Stale retry timer ignored");
                    }
                }
                BridgeMessage::Settled { id } => self.on_settled_elsewhere(id),
                BridgeMessage::OrphanExpired { id } => {
                    self.on_orphan_expired(sdk.as_ref(), id).await
                }
                BridgeMessage::Shutdown => break,
            }
            debug_assert!(self.state.is_consistent());
        }

        self.close();
        info!(resource = %key, "Bridge stopped");
    }

    // --- Loading ---

    async fn load(&mut self, sdk: &dyn SdkAdapter) {
        let key = self.state.key().clone();
        if self.state.readiness() != Readiness::NotLoaded {
            debug!(resource = %key, readiness = ?self.state.readiness(), "Load ignored");
            return;
        }
        if let Some(orphan) = &self.orphan {
            debug!(resource = %key, op = %orphan.id, "Load deferred until the SDK answers");
            return;
        }

        // Any timer scheduled before this point is now stale.
        self.retry_generation += 1;

        if !sdk.is_available() {
            self.state.mark_idle();
            self.publish_readiness();
            warn!(resource = %key, "SDK unavailable, load skipped");
            self.fanout.publish(BridgeEvent::LoadFailed {
                key,
                attempt: self.state.retry_attempt(),
                retry_in: None,
                reason: BridgeError::SdkUnavailable.to_string(),
            });
            return;
        }

        self.state.begin_loading();
        self.publish_readiness();
        info!(resource = %key, attempt = self.state.retry_attempt(), "Loading");

        if let Err(error) = sdk.load(&key, self.state.kind()).await {
            let error = match error.code {
                SdkError::UNAVAILABLE => BridgeError::SdkUnavailable,
                _ => BridgeError::LoadFailed(error.to_string()),
            };
            self.on_load_failed(error);
        }
    }

    fn on_load_succeeded(&mut self) {
        let key = self.state.key().clone();
        if self.orphan.is_some() {
            debug!(resource = %key, "LoadSucceeded ignored while an answer is owed");
            return;
        }
        match self.state.readiness() {
            Readiness::Loading | Readiness::NotLoaded => {
                self.state.mark_loaded();
                self.publish_readiness();
                info!(resource = %key, "Ready");
                self.fanout.publish(BridgeEvent::Loaded { key });
            }
            readiness => debug!(resource = %key, ?readiness, "LoadSucceeded ignored"),
        }
    }

    fn on_load_failed(&mut self, error: BridgeError) {
        let key = self.state.key().clone();
        if self.state.readiness() != Readiness::Loading {
            debug!(resource = %key, readiness = ?self.state.readiness(), %error, "LoadFailed ignored");
            return;
        }

        let attempt = self.state.mark_load_failed();
        self.publish_readiness();
        let retry_in = if error.is_transient() {
            self.config.retry.delay_for(attempt)
        } else {
            None
        };
        warn!(resource = %key, attempt = self.state.retry_attempt(), ?retry_in, %error, "Load failed");

        if let Some(delay) = retry_in {
            self.retry_generation += 1;
            let generation = self.retry_generation;
            let mailbox = self.mailbox.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = mailbox.send(BridgeMessage::RetryDue { generation });
            });
        }

        self.fanout.publish(BridgeEvent::LoadFailed {
            key,
            attempt: self.state.retry_attempt(),
            retry_in,
            reason: error.to_string(),
        });
    }

    // --- Operations ---

    async fn begin(
        &mut self,
        sdk: &dyn SdkAdapter,
        kind: OperationKind,
        context: OperationContext,
        respond_to: oneshot::Sender<Result<OperationHandle, BridgeError>>,
    ) {
        let key = self.state.key().clone();
        let notifier = SettleNotifier(self.mailbox.clone());
        let handle = match self.ledger.try_begin(&mut self.state, kind, notifier) {
            Ok(handle) => handle,
            Err(error) => {
                debug!(resource = %key, ?kind, %error, "Operation refused");
                let _ = respond_to.send(Err(error));
                return;
            }
        };

        let id = handle.id();
        self.publish_readiness();
        self.last_operation = Some((id, kind));
        self.current = Some(CurrentOperation {
            id,
            kind,
            reward: None,
            timeout: self.spawn_timeout(id),
        });
        info!(resource = %key, op = %id, ?kind, "Operation in flight");

        if respond_to.send(Ok(handle)).is_err() {
            // Nobody is waiting and the SDK was never asked, so the resource is still usable.
            debug!(resource = %key, op = %id, "Caller went away before dispatch");
            self.ledger
                .complete(id, Outcome::cancelled(key, id, None));
            if let Some(mut current) = self.current.take() {
                current.stop_timer();
            }
            self.state.leave_flight();
            self.state.mark_loaded();
            self.publish_readiness();
            return;
        }

        let dispatched = match kind {
            OperationKind::Show => sdk.show(&key, &context).await,
            OperationKind::Purchase => sdk.purchase(&key).await,
            OperationKind::Restore => sdk.restore(&key).await,
            OperationKind::PermissionRequest => sdk.request_permission(&key).await,
        };

        if let Err(error) = dispatched {
            warn!(resource = %key, op = %id, %error, "SDK rejected the request");
            let error = self.translate_dispatch_error(kind, error);
            // The operation may already be settled (cancelled while the SDK call ran).
            if self.current.as_ref().map(|current| current.id) == Some(id) {
                self.finish(sdk, Outcome::failed(key, Some(id), error)).await;
            }
        }
    }

    async fn confirm_purchase(&mut self, sdk: &dyn SdkAdapter) -> Result<(), BridgeError> {
        let key = self.state.key().clone();
        let kind = self.state.kind();
        let unsupported = || BridgeError::Unsupported {
            key: key.clone(),
            kind,
            operation: OperationKind::Purchase,
        };
        if kind != ResourceKind::Product {
            return Err(unsupported());
        }

        info!(resource = %key, "Confirming pending purchase");
        sdk.confirm_purchase(&key).await.map_err(|error| {
            warn!(resource = %key, %error, "SDK rejected the confirmation");
            match error.code {
                SdkError::UNAVAILABLE => BridgeError::SdkUnavailable,
                SdkError::UNSUPPORTED => unsupported(),
                _ => BridgeError::ConfirmFailed(error.message),
            }
        })
    }

    fn spawn_timeout(&self, id: OperationId) -> Option<JoinHandle<()>> {
        let after = self.config.operation_timeout()?;
        let ledger = self.ledger.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if ledger.expire(id, after) {
                warn!(op = %id, ?after, "Operation timed out");
            }
        }))
    }

    fn translate_dispatch_error(&self, kind: OperationKind, error: SdkError) -> BridgeError {
        match error.code {
            SdkError::UNAVAILABLE => BridgeError::SdkUnavailable,
            SdkError::UNSUPPORTED => BridgeError::Unsupported {
                key: self.state.key().clone(),
                kind: self.state.kind(),
                operation: kind,
            },
            _ => match kind {
                OperationKind::Show => BridgeError::DisplayFailed(error.message),
                OperationKind::Purchase => BridgeError::PurchaseFailed {
                    reason: PurchaseFailureReason::Unknown,
                    message: Some(error.message),
                },
                OperationKind::Restore => BridgeError::RestoreFailed(error.message),
                OperationKind::PermissionRequest => BridgeError::TaskFailed(error.to_string()),
            },
        }
    }

    /// Settles the current operation, returns to idle and reloads reusable resources.
    async fn finish(&mut self, sdk: &dyn SdkAdapter, outcome: Outcome) {
        let Some(mut current) = self.current.take() else {
            return;
        };
        current.stop_timer();

        let key = self.state.key().clone();
        let settlement = self.ledger.complete(current.id, outcome.clone());
        self.state.leave_flight();
        self.publish_readiness();
        info!(resource = %key, op = %current.id, status = ?outcome.status(), "Operation finished");

        if settlement == Settlement::Settled {
            self.fanout.publish(BridgeEvent::OperationSettled(outcome));
        }
        self.reload_if_reusable(sdk).await;
    }

    /// The ledger settled the operation on its own (caller cancel or timeout).
    ///
    /// The SDK already has the request, so its terminal event is still coming. The
    /// resource is held back until that event arrives or the grace period ends.
    fn on_settled_elsewhere(&mut self, id: OperationId) {
        let key = self.state.key().clone();
        let is_current = self.current.as_ref().map(|current| current.id) == Some(id);
        if !is_current {
            debug!(resource = %key, op = %id, "Settlement notice for finished operation");
            return;
        }
        let Some(mut current) = self.current.take() else {
            return;
        };
        current.stop_timer();
        self.state.leave_flight();
        self.publish_readiness();

        let grace = self.config.orphan_grace();
        info!(resource = %key, op = %id, ?grace, "Operation ended without SDK result, awaiting its late event");
        let mailbox = self.mailbox.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = mailbox.send(BridgeMessage::OrphanExpired { id });
        });
        if let Some(previous) = self.orphan.replace(OrphanedOperation {
            id,
            kind: current.kind,
            grace: timer,
        }) {
            previous.grace.abort();
        }
    }

    /// The SDK never answered. The request is treated as dropped, so even one-shot
    /// resources load again.
    async fn on_orphan_expired(&mut self, sdk: &dyn SdkAdapter, id: OperationId) {
        let key = self.state.key().clone();
        if self.orphan.as_ref().map(|orphan| orphan.id) != Some(id) {
            debug!(resource = %key, op = %id, "Stale grace timer ignored");
            return;
        }
        self.orphan = None;
        warn!(resource = %key, op = %id, "SDK never answered the settled operation, releasing resource");
        self.load(sdk).await;
    }

    async fn reload_if_reusable(&mut self, sdk: &dyn SdkAdapter) {
        if self.state.kind().is_reusable() {
            self.load(sdk).await;
        }
    }

    // --- SDK events ---

    async fn on_event(&mut self, sdk: &dyn SdkAdapter, event: ResourceEvent) {
        if event.is_terminal() {
            self.on_terminal(sdk, event).await;
            return;
        }

        let key = self.state.key().clone();
        match event {
            ResourceEvent::LoadSucceeded => self.on_load_succeeded(),
            ResourceEvent::LoadFailed(error) => self.on_load_failed(error),
            ResourceEvent::DisplayStarted => {
                debug!(resource = %key, "Displayed");
                self.fanout.publish(BridgeEvent::Displayed { key });
            }
            ResourceEvent::RewardGranted(reward) => {
                match self.current.as_mut() {
                    Some(current) if current.kind == OperationKind::Show => {
                        debug!(resource = %key, op = %current.id, ?reward, "Reward granted");
                        current.reward = Some(reward.clone());
                    }
                    _ => debug!(resource = %key, ?reward, "Reward outside an operation"),
                }
                self.fanout.publish(BridgeEvent::RewardEarned { key, reward });
            }
            ResourceEvent::RevenuePaid(record) => {
                debug!(resource = %key, amount = record.amount, currency = %record.currency, "Revenue");
                self.fanout.publish(BridgeEvent::Revenue(record));
            }
            ResourceEvent::ProductDetails(details) => {
                debug!(resource = %key, price = %details.price_string, available = details.available, "Product details");
                self.fanout.publish(BridgeEvent::ProductDetails { key, details });
            }
            other => debug!(resource = %key, event = ?other, "Event ignored"),
        }
    }

    async fn on_terminal(&mut self, sdk: &dyn SdkAdapter, event: ResourceEvent) {
        let key = self.state.key().clone();
        match &event {
            ResourceEvent::Dismissed => self.fanout.publish(BridgeEvent::Dismissed { key: key.clone() }),
            ResourceEvent::DisplayFailed(reason) => self.fanout.publish(BridgeEvent::DisplayFailed {
                key: key.clone(),
                reason: reason.clone(),
            }),
            ResourceEvent::PermissionResolved(status) => {
                self.fanout.publish(BridgeEvent::PermissionChanged {
                    key: key.clone(),
                    status: *status,
                })
            }
            _ => {}
        }

        let current = self
            .current
            .as_ref()
            .map(|current| (current.id, current.kind, current.reward.clone()));

        match current {
            Some((id, kind, reward)) => match self.resolve(id, kind, reward.as_ref(), &event) {
                Some(outcome) => self.finish(sdk, outcome).await,
                None => debug!(resource = %key, op = %id, ?event, "Event does not end the operation"),
            },
            None => self.on_late_terminal(sdk, &event).await,
        }
    }

    /// A terminal event with nothing in flight: either the answer owed to an orphaned
    /// operation, or a duplicate. Both go to the ledger so they are detected and counted.
    async fn on_late_terminal(&mut self, sdk: &dyn SdkAdapter, event: &ResourceEvent) {
        let key = self.state.key().clone();
        if let Some((id, kind)) = self.orphan.as_ref().map(|orphan| (orphan.id, orphan.kind)) {
            let Some(outcome) = self.resolve(id, kind, None, event) else {
                debug!(resource = %key, op = %id, ?event, "Event does not answer the settled operation");
                return;
            };
            if let Some(orphan) = self.orphan.take() {
                orphan.grace.abort();
            }
            self.ledger.complete(id, outcome);
            info!(resource = %key, op = %id, "Late answer for settled operation discarded");
            self.reload_if_reusable(sdk).await;
            return;
        }

        let Some((id, kind)) = self.last_operation else {
            debug!(resource = %key, ?event, "Terminal event with no operation");
            return;
        };
        if let Some(outcome) = self.resolve(id, kind, None, event) {
            self.ledger.complete(id, outcome);
        }
    }

    /// Maps a terminal event onto an outcome for an operation of `kind`, or `None` if the
    /// event does not end that kind of operation.
    fn resolve(
        &self,
        id: OperationId,
        kind: OperationKind,
        reward: Option<&Reward>,
        event: &ResourceEvent,
    ) -> Option<Outcome> {
        let key = self.state.key().clone();
        let outcome = match (kind, event) {
            (OperationKind::Show, ResourceEvent::Dismissed) => {
                if !self.state.kind().is_reward_gated() {
                    Outcome::success(key, id, None)
                } else {
                    match reward {
                        Some(reward) => Outcome::success(
                            key,
                            id,
                            Some(OutcomePayload::Reward(reward.clone())),
                        ),
                        None => Outcome::cancelled(key, id, Some(BridgeError::UserCancelled)),
                    }
                }
            }
            (OperationKind::Show, ResourceEvent::DisplayFailed(reason)) => Outcome::failed(
                key,
                Some(id),
                BridgeError::DisplayFailed(reason.clone()),
            ),
            (
                OperationKind::Purchase,
                ResourceEvent::PurchaseCompleted {
                    transaction_id,
                    receipt,
                },
            ) => Outcome::success(
                key,
                id,
                Some(OutcomePayload::Transaction {
                    transaction_id: transaction_id.clone(),
                    receipt: receipt.clone(),
                }),
            ),
            (
                OperationKind::Purchase,
                ResourceEvent::PurchaseFailed {
                    reason: PurchaseFailureReason::UserCancelled,
                    ..
                },
            ) => Outcome::cancelled(key, id, Some(BridgeError::UserCancelled)),
            (OperationKind::Purchase, ResourceEvent::PurchaseFailed { reason, message }) => {
                Outcome::failed(
                    key,
                    Some(id),
                    BridgeError::PurchaseFailed {
                        reason: *reason,
                        message: message.clone(),
                    },
                )
            }
            (OperationKind::Restore, ResourceEvent::RestoreCompleted { restored }) => {
                Outcome::success(key, id, Some(OutcomePayload::Restored { count: *restored }))
            }
            (OperationKind::Restore, ResourceEvent::RestoreFailed(message)) => Outcome::failed(
                key,
                Some(id),
                BridgeError::RestoreFailed(message.clone()),
            ),
            (OperationKind::PermissionRequest, ResourceEvent::PermissionResolved(status)) => {
                match status {
                    granted if granted.is_granted() => {
                        Outcome::success(key, id, Some(OutcomePayload::Permission(*granted)))
                    }
                    PermissionStatus::Denied => {
                        Outcome::failed(key, Some(id), BridgeError::PermissionDenied)
                            .with_payload(OutcomePayload::Permission(PermissionStatus::Denied))
                    }
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(outcome)
    }

    // --- Helpers ---

    fn publish_readiness(&self) {
        self.readiness.send_replace(self.state.readiness());
    }

    /// Fails the operation in flight, if any, and returns the resource to idle.
    fn abandon_current(&mut self, error: BridgeError) {
        if let Some(orphan) = self.orphan.take() {
            orphan.grace.abort();
        }
        let key = self.state.key().clone();
        if let Some(mut current) = self.current.take() {
            current.stop_timer();
            let outcome = Outcome::failed(key, Some(current.id), error);
            if self.ledger.complete(current.id, outcome.clone()) == Settlement::Settled {
                self.fanout.publish(BridgeEvent::OperationSettled(outcome));
            }
            self.state.leave_flight();
        }
        self.state.mark_idle();
        self.publish_readiness();
    }

    fn close(&mut self) {
        let key = self.state.key().clone();
        self.abandon_current(BridgeError::BridgeClosed);

        // Refuse whatever was queued behind the shutdown.
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                BridgeMessage::Begin { respond_to, .. } => {
                    let _ = respond_to.send(Err(BridgeError::BridgeClosed));
                }
                BridgeMessage::ConfirmPurchase { respond_to } => {
                    let _ = respond_to.send(Err(BridgeError::BridgeClosed));
                }
                _ => {}
            }
        }
        debug!(resource = %key, "Mailbox drained");
    }
}

impl Drop for LifecycleBridge {
    /// Runs after `close` on a normal stop, where there is nothing left to do. When the
    /// task unwinds out of an SDK call instead, the operation in flight is failed here.
    fn drop(&mut self) {
        if self.current.is_none() {
            return;
        }
        let error = if std::thread::panicking() {
            BridgeError::TaskFailed("bridge task panicked".to_string())
        } else {
            BridgeError::BridgeClosed
        };
        error!(resource = %self.state.key(), %error, "Bridge dropped with an operation in flight");
        self.abandon_current(error);
    }
}
