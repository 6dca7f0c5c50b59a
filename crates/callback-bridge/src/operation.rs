//! # Operations & Outcomes
//!
//! An [`Operation`] is one outstanding request (show an ad, buy a product, ask for a
//! permission) waiting for a terminal SDK event. The ledger owns it; the caller only ever
//! holds an [`OperationHandle`], which is the receiving end of the single-assignment
//! completion slot.
//!
//! Every operation resolves to exactly one [`Outcome`]. Outcomes are immutable values:
//! fields are private and only readable through accessors.

use crate::error::BridgeError;
use crate::event::{PermissionStatus, Reward};
use crate::ledger::OperationLedger;
use crate::resource::ResourceKey;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tokio::sync::oneshot;

/// Unique, monotonically increasing operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Show,
    Purchase,
    PermissionRequest,
    Restore,
}

/// Data describing an outstanding request. The completion slot lives in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    id: OperationId,
    resource_key: ResourceKey,
    kind: OperationKind,
    created_at: Instant,
}

impl Operation {
    pub(crate) fn new(id: OperationId, resource_key: ResourceKey, kind: OperationKind) -> Self {
        Self {
            id,
            resource_key,
            kind,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn resource_key(&self) -> &ResourceKey {
        &self.resource_key
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failed,
    Cancelled,
    NotReady,
}

/// Typed result data carried by successful (and some failed) outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutcomePayload {
    Reward(Reward),
    Transaction {
        transaction_id: String,
        receipt: String,
    },
    Restored {
        count: u32,
    },
    Permission(PermissionStatus),
}

/// Immutable terminal result of an operation (or of a call that never started one).
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    status: OutcomeStatus,
    resource_key: ResourceKey,
    operation_id: Option<OperationId>,
    payload: Option<OutcomePayload>,
    error: Option<BridgeError>,
}

impl Outcome {
    pub fn success(
        resource_key: ResourceKey,
        operation_id: OperationId,
        payload: Option<OutcomePayload>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Success,
            resource_key,
            operation_id: Some(operation_id),
            payload,
            error: None,
        }
    }

    pub fn failed(
        resource_key: ResourceKey,
        operation_id: Option<OperationId>,
        error: BridgeError,
    ) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            resource_key,
            operation_id,
            payload: None,
            error: Some(error),
        }
    }

    pub fn cancelled(
        resource_key: ResourceKey,
        operation_id: OperationId,
        error: Option<BridgeError>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Cancelled,
            resource_key,
            operation_id: Some(operation_id),
            payload: None,
            error,
        }
    }

    /// The synchronous answer for a resource that is not `Ready`. No operation exists.
    pub fn not_ready(resource_key: ResourceKey) -> Self {
        Self {
            status: OutcomeStatus::NotReady,
            error: Some(BridgeError::NotReady(resource_key.clone())),
            resource_key,
            operation_id: None,
            payload: None,
        }
    }

    /// Converts a refused `begin` into the matching outcome.
    pub fn rejected(resource_key: ResourceKey, error: BridgeError) -> Self {
        match error {
            BridgeError::NotReady(_) => Self::not_ready(resource_key),
            other => Self::failed(resource_key, None, other),
        }
    }

    pub(crate) fn with_payload(mut self, payload: OutcomePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn resource_key(&self) -> &ResourceKey {
        &self.resource_key
    }

    pub fn operation_id(&self) -> Option<OperationId> {
        self.operation_id
    }

    pub fn payload(&self) -> Option<&OutcomePayload> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&BridgeError> {
        self.error.as_ref()
    }
}

/// The caller's side of an operation.
///
/// Awaiting [`wait`](Self::wait) suspends until the ledger settles the operation;
/// settlement is pushed through a oneshot channel, there is no polling.
#[derive(Debug)]
pub struct OperationHandle {
    operation: Operation,
    receiver: oneshot::Receiver<Outcome>,
    ledger: OperationLedger,
}

impl OperationHandle {
    pub(crate) fn new(
        operation: Operation,
        receiver: oneshot::Receiver<Outcome>,
        ledger: OperationLedger,
    ) -> Self {
        Self {
            operation,
            receiver,
            ledger,
        }
    }

    pub fn id(&self) -> OperationId {
        self.operation.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Settles the operation as `Cancelled` unless something else settled it first.
    ///
    /// Returns `true` if this call won the race.
    pub fn cancel(&self) -> bool {
        self.ledger.cancel(self.operation.id)
    }

    /// A cloneable handle that can cancel this operation from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.operation.id,
            ledger: self.ledger.clone(),
        }
    }

    /// Returns the outcome if it has already been settled.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(self.dropped()),
        }
    }

    pub async fn wait(mut self) -> Outcome {
        let received = (&mut self.receiver).await;
        self.resolve(received)
    }

    /// Waits for the outcome, cancelling the operation if `signal` completes first.
    ///
    /// A cancellation that loses the race against a terminal SDK event yields that
    /// event's outcome instead.
    pub async fn wait_or_cancel<F>(mut self, signal: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        let early = tokio::select! {
            received = &mut self.receiver => Some(received),
            _ = signal => None,
        };

        match early {
            Some(received) => self.resolve(received),
            None => {
                self.cancel();
                let received = (&mut self.receiver).await;
                self.resolve(received)
            }
        }
    }

    fn resolve(&self, received: Result<Outcome, oneshot::error::RecvError>) -> Outcome {
        received.unwrap_or_else(|_| self.dropped())
    }

    fn dropped(&self) -> Outcome {
        Outcome::failed(
            self.operation.resource_key.clone(),
            Some(self.operation.id),
            BridgeError::BridgeDropped,
        )
    }
}

/// Cancels one specific operation. Cheap to clone and send across tasks.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: OperationId,
    ledger: OperationLedger,
}

impl CancelHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn cancel(&self) -> bool {
        self.ledger.cancel(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_outcome_has_no_operation() {
        let outcome = Outcome::not_ready(ResourceKey::new("inter"));
        assert_eq!(outcome.status(), OutcomeStatus::NotReady);
        assert_eq!(outcome.operation_id(), None);
        assert_eq!(
            outcome.error(),
            Some(&BridgeError::NotReady(ResourceKey::new("inter")))
        );
    }

    #[test]
    fn test_rejected_maps_not_ready_and_other_errors() {
        let key = ResourceKey::new("sku");
        let not_ready = Outcome::rejected(key.clone(), BridgeError::NotReady(key.clone()));
        assert_eq!(not_ready.status(), OutcomeStatus::NotReady);

        let closed = Outcome::rejected(key, BridgeError::BridgeClosed);
        assert_eq!(closed.status(), OutcomeStatus::Failed);
        assert_eq!(closed.error(), Some(&BridgeError::BridgeClosed));
    }

    #[test]
    fn test_operation_id_display() {
        assert_eq!(OperationId::from(12).to_string(), "op_12");
    }
}
