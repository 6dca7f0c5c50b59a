//! # Bridge Mailbox
//!
//! Every input to a [`LifecycleBridge`](crate::bridge::LifecycleBridge) arrives through one
//! unbounded mpsc mailbox: host requests from [`BridgeClient`](crate::client::BridgeClient),
//! translated SDK events from the router, timer expiries and ledger notifications.
//!
//! The mailbox is unbounded because SDK callbacks are delivered from synchronous threads
//! that must never block or await. Per-key arrival order is the mailbox order.

use crate::error::BridgeError;
use crate::event::ResourceEvent;
use crate::operation::{OperationHandle, OperationId, OperationKind};
use crate::resource::ResourceState;
use crate::sdk::OperationContext;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum BridgeMessage {
    /// Starts loading if the resource is idle; a no-op otherwise.
    Load,
    Begin {
        kind: OperationKind,
        context: OperationContext,
        respond_to: oneshot::Sender<Result<OperationHandle, BridgeError>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<ResourceState>,
    },
    /// Finalizes a purchase the store left pending. Not an operation: nothing is awaited
    /// beyond the SDK call itself.
    ConfirmPurchase {
        respond_to: oneshot::Sender<Result<(), BridgeError>>,
    },
    Event(ResourceEvent),
    /// A backoff timer fired. Ignored unless `generation` is still current.
    RetryDue { generation: u64 },
    /// The ledger settled an operation on its own (cancel or timeout).
    Settled { id: OperationId },
    /// The SDK never answered an operation settled out of band; release the resource.
    OrphanExpired { id: OperationId },
    Shutdown,
}

/// Lets the ledger tell the owning bridge that an operation was settled out of band.
#[derive(Debug, Clone)]
pub struct SettleNotifier(pub(crate) mpsc::UnboundedSender<BridgeMessage>);

impl SettleNotifier {
    pub(crate) fn notify(&self, id: OperationId) {
        // A closed mailbox means the bridge already stopped and has nothing to reconcile.
        let _ = self.0.send(BridgeMessage::Settled { id });
    }
}
