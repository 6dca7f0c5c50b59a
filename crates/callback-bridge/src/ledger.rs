//! # Operation Ledger
//!
//! Owns every outstanding [`Operation`] and its completion slot. The ledger is the only
//! place where an operation's outcome is assigned, so "first settlement wins" is enforced
//! here and nowhere else.
//!
//! Three parties may try to settle the same operation:
//! - the bridge, when a terminal SDK event arrives ([`OperationLedger::complete`]),
//! - the caller, through [`OperationHandle::cancel`] ([`OperationLedger::cancel`]),
//! - the timeout task ([`OperationLedger::expire`]).
//!
//! Whoever takes the pending entry out of the map first wins. Late attempts are no-ops;
//! a late `complete` is additionally logged and counted as a duplicate settlement.

use crate::error::BridgeError;
use crate::message::SettleNotifier;
use crate::operation::{Operation, OperationHandle, OperationId, OperationKind, Outcome};
use crate::resource::{ResourceKey, ResourceState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Result of a [`OperationLedger::complete`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Settled,
    /// The operation had already been settled. Nothing changed.
    AlreadySettled,
    /// The id was never issued by this ledger.
    Unknown,
}

struct PendingOperation {
    operation: Operation,
    slot: oneshot::Sender<Outcome>,
    notifier: SettleNotifier,
}

struct LedgerInner {
    pending: HashMap<OperationId, PendingOperation>,
    by_key: HashMap<ResourceKey, OperationId>,
    next_id: u64,
    duplicate_settlements: u64,
}

impl LedgerInner {
    fn take(&mut self, id: OperationId) -> Option<PendingOperation> {
        let entry = self.pending.remove(&id)?;
        if self.by_key.get(entry.operation.resource_key()) == Some(&id) {
            self.by_key.remove(entry.operation.resource_key());
        }
        Some(entry)
    }

    fn was_issued(&self, id: OperationId) -> bool {
        id.value() >= 1 && id.value() < self.next_id
    }
}

/// Shared, thread-safe registry of outstanding operations.
#[derive(Clone)]
pub struct OperationLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl Default for OperationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OperationLedger")
            .field("pending", &inner.pending.len())
            .field("next_id", &inner.next_id)
            .field("duplicate_settlements", &inner.duplicate_settlements)
            .finish()
    }
}

impl OperationLedger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                pending: HashMap::new(),
                by_key: HashMap::new(),
                next_id: 1,
                duplicate_settlements: 0,
            })),
        }
    }

    /// Starts an operation on a `Ready` resource, moving it to `InFlight`.
    ///
    /// # Errors
    /// - [`BridgeError::Unsupported`] if the resource kind does not accept `kind`.
    /// - [`BridgeError::NotReady`] if the resource is not `Ready`, or already has an
    ///   operation registered.
    pub fn try_begin(
        &self,
        state: &mut ResourceState,
        kind: OperationKind,
        notifier: SettleNotifier,
    ) -> Result<OperationHandle, BridgeError> {
        if !state.kind().accepts(kind) {
            return Err(BridgeError::Unsupported {
                key: state.key().clone(),
                kind: state.kind(),
                operation: kind,
            });
        }
        if !state.is_ready() {
            return Err(BridgeError::NotReady(state.key().clone()));
        }

        let mut inner = self.inner.lock();
        if inner.by_key.contains_key(state.key()) {
            return Err(BridgeError::NotReady(state.key().clone()));
        }

        let id = OperationId::from(inner.next_id);
        inner.next_id += 1;

        let operation = Operation::new(id, state.key().clone(), kind);
        let (slot, receiver) = oneshot::channel();
        inner.by_key.insert(state.key().clone(), id);
        inner.pending.insert(
            id,
            PendingOperation {
                operation: operation.clone(),
                slot,
                notifier,
            },
        );
        drop(inner);

        state.enter_flight(id);
        debug!(resource = %state.key(), op = %id, ?kind, "Operation started");
        Ok(OperationHandle::new(operation, receiver, self.clone()))
    }

    /// Settles `id` with `outcome`. Called by the owning bridge.
    pub fn complete(&self, id: OperationId, outcome: Outcome) -> Settlement {
        let mut inner = self.inner.lock();
        match inner.take(id) {
            Some(entry) => {
                drop(inner);
                deliver(entry, outcome);
                Settlement::Settled
            }
            None if inner.was_issued(id) => {
                inner.duplicate_settlements += 1;
                let total = inner.duplicate_settlements;
                drop(inner);
                warn!(op = %id, status = ?outcome.status(), total, "Duplicate settlement ignored");
                Settlement::AlreadySettled
            }
            None => {
                drop(inner);
                warn!(op = %id, "Settlement for unknown operation ignored");
                Settlement::Unknown
            }
        }
    }

    /// Settles `id` as `Cancelled` and notifies the owning bridge.
    ///
    /// Returns `false` if the operation was already settled.
    pub fn cancel(&self, id: OperationId) -> bool {
        self.settle_out_of_band(id, |operation| {
            Outcome::cancelled(operation.resource_key().clone(), operation.id(), None)
        })
    }

    /// Settles `id` as `Failed(Timeout)` and notifies the owning bridge.
    pub fn expire(&self, id: OperationId, after: Duration) -> bool {
        self.settle_out_of_band(id, |operation| {
            Outcome::failed(
                operation.resource_key().clone(),
                Some(operation.id()),
                BridgeError::Timeout(after),
            )
        })
    }

    /// Fails whatever operation is pending for `key`. Used when the bridge task is gone
    /// and can no longer settle it.
    pub fn abandon(&self, key: &ResourceKey, error: BridgeError) -> Option<OperationId> {
        let mut inner = self.inner.lock();
        let id = *inner.by_key.get(key)?;
        let entry = inner.take(id)?;
        drop(inner);
        warn!(resource = %key, op = %id, %error, "Operation abandoned");
        let outcome = Outcome::failed(key.clone(), Some(id), error);
        deliver(entry, outcome);
        Some(id)
    }

    fn settle_out_of_band<F>(&self, id: OperationId, make_outcome: F) -> bool
    where
        F: FnOnce(&Operation) -> Outcome,
    {
        let Some(entry) = self.inner.lock().take(id) else {
            debug!(op = %id, "Operation already settled");
            return false;
        };

        let outcome = make_outcome(&entry.operation);
        debug!(op = %id, status = ?outcome.status(), "Operation settled out of band");
        let notifier = entry.notifier.clone();
        deliver(entry, outcome);
        notifier.notify(id);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn pending_for(&self, key: &ResourceKey) -> Option<OperationId> {
        self.inner.lock().by_key.get(key).copied()
    }

    pub fn is_pending(&self, id: OperationId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    /// Number of settlement attempts rejected because the operation was already settled.
    pub fn duplicate_settlements(&self) -> u64 {
        self.inner.lock().duplicate_settlements
    }
}

fn deliver(entry: PendingOperation, outcome: Outcome) {
    let id = entry.operation.id();
    let elapsed = entry.operation.created_at().elapsed();
    debug!(op = %id, kind = ?entry.operation.kind(), status = ?outcome.status(), ?elapsed, "Operation settled");
    if entry.slot.send(outcome).is_err() {
        debug!(op = %id, "Caller dropped the operation handle before settlement");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BridgeMessage;
    use crate::operation::OutcomeStatus;
    use crate::resource::ResourceKind;
    use tokio::sync::mpsc;

    fn ready_state(key: &str, kind: ResourceKind) -> ResourceState {
        let mut state = ResourceState::new(ResourceKey::new(key), kind);
        state.begin_loading();
        state.mark_loaded();
        state
    }

    fn notifier() -> (SettleNotifier, mpsc::UnboundedReceiver<BridgeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SettleNotifier(tx), rx)
    }

    #[test]
    fn test_begin_requires_ready() {
        let ledger = OperationLedger::new();
        let mut state = ResourceState::new(ResourceKey::new("inter"), ResourceKind::InterstitialAd);
        let (notifier, _rx) = notifier();

        let err = ledger
            .try_begin(&mut state, OperationKind::Show, notifier)
            .unwrap_err();
        assert_eq!(err, BridgeError::NotReady(ResourceKey::new("inter")));
        assert_eq!(ledger.pending_count(), 0);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_begin_rejects_unsupported_kind() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("inter", ResourceKind::InterstitialAd);
        let (notifier, _rx) = notifier();

        let err = ledger
            .try_begin(&mut state, OperationKind::Purchase, notifier)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported { .. }));
        assert!(state.is_ready());
    }

    #[test]
    fn test_second_begin_on_same_key_is_refused() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("rewarded", ResourceKind::RewardedAd);
        let (notifier, _rx) = notifier();

        let handle = ledger
            .try_begin(&mut state, OperationKind::Show, notifier.clone())
            .unwrap();
        assert_eq!(state.pending_operation(), Some(handle.id()));

        let err = ledger
            .try_begin(&mut state, OperationKind::Show, notifier)
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotReady(_)));
        assert_eq!(ledger.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_first_settlement_wins() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("sku", ResourceKind::Product);
        let (notifier, _rx) = notifier();
        let handle = ledger
            .try_begin(&mut state, OperationKind::Purchase, notifier)
            .unwrap();
        let id = handle.id();
        let key = ResourceKey::new("sku");

        assert_eq!(
            ledger.complete(id, Outcome::success(key.clone(), id, None)),
            Settlement::Settled
        );
        assert_eq!(
            ledger.complete(id, Outcome::failed(key, Some(id), BridgeError::UserCancelled)),
            Settlement::AlreadySettled
        );
        assert!(!ledger.cancel(id));
        assert_eq!(ledger.duplicate_settlements(), 1);

        let outcome = handle.wait().await;
        assert_eq!(outcome.status(), OutcomeStatus::Success);
    }

    #[test]
    fn test_unknown_id_is_not_a_duplicate() {
        let ledger = OperationLedger::new();
        let outcome = Outcome::success(ResourceKey::new("x"), OperationId::from(99), None);
        assert_eq!(ledger.complete(OperationId::from(99), outcome), Settlement::Unknown);
        assert_eq!(ledger.duplicate_settlements(), 0);
    }

    #[tokio::test]
    async fn test_cancel_settles_and_notifies_bridge() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("sku", ResourceKind::Product);
        let (notifier, mut rx) = notifier();
        let handle = ledger
            .try_begin(&mut state, OperationKind::Purchase, notifier)
            .unwrap();
        let id = handle.id();

        assert!(handle.cancel());
        assert!(!ledger.is_pending(id));
        assert_eq!(ledger.pending_for(&ResourceKey::new("sku")), None);

        match rx.recv().await {
            Some(BridgeMessage::Settled { id: notified }) => assert_eq!(notified, id),
            other => panic!("unexpected message: {other:?}"),
        }

        let outcome = handle.wait().await;
        assert_eq!(outcome.status(), OutcomeStatus::Cancelled);
        assert_eq!(outcome.operation_id(), Some(id));
    }

    #[tokio::test]
    async fn test_expire_reports_timeout() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("push", ResourceKind::PushPermission);
        let (notifier, _rx) = notifier();
        let handle = ledger
            .try_begin(&mut state, OperationKind::PermissionRequest, notifier)
            .unwrap();

        assert!(ledger.expire(handle.id(), Duration::from_secs(5)));
        let outcome = handle.wait().await;
        assert_eq!(outcome.status(), OutcomeStatus::Failed);
        assert_eq!(
            outcome.error(),
            Some(&BridgeError::Timeout(Duration::from_secs(5)))
        );
    }

    #[tokio::test]
    async fn test_abandon_fails_pending_operation() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("rewarded", ResourceKind::RewardedAd);
        let (notifier, _rx) = notifier();
        let handle = ledger
            .try_begin(&mut state, OperationKind::Show, notifier)
            .unwrap();
        let key = ResourceKey::new("rewarded");

        assert_eq!(
            ledger.abandon(&key, BridgeError::BridgeClosed),
            Some(handle.id())
        );
        assert_eq!(ledger.abandon(&key, BridgeError::BridgeClosed), None);
        assert_eq!(
            handle.wait().await.error(),
            Some(&BridgeError::BridgeClosed)
        );
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let ledger = OperationLedger::new();
        let mut state = ready_state("sku", ResourceKind::Product);
        let (notifier, _rx) = notifier();

        let first = ledger
            .try_begin(&mut state, OperationKind::Purchase, notifier.clone())
            .unwrap();
        ledger.cancel(first.id());
        state.leave_flight();
        state.begin_loading();
        state.mark_loaded();

        let second = ledger
            .try_begin(&mut state, OperationKind::Purchase, notifier)
            .unwrap();
        assert!(second.id() > first.id());
    }
}
