//! # Bridge Client
//!
//! The host-facing handle to one [`LifecycleBridge`](crate::bridge::LifecycleBridge).

use crate::error::BridgeError;
use crate::message::BridgeMessage;
use crate::operation::{OperationHandle, OperationKind, Outcome};
use crate::resource::{Readiness, ResourceKey, ResourceKind, ResourceState};
use crate::sdk::OperationContext;
use tokio::sync::{mpsc, oneshot, watch};

/// A cheap, cloneable handle for one resource.
///
/// * **Synchronous queries** – `is_ready` and `readiness` read a watch channel the bridge
///   updates on every transition; they never wait on the mailbox.
/// * **Awaitable operations** – `show`, `purchase`, `restore` and `request_permission`
///   resolve to exactly one [`Outcome`]. A resource that is not `Ready` answers
///   `NotReady` immediately and no operation is created.
#[derive(Clone, Debug)]
pub struct BridgeClient {
    key: ResourceKey,
    kind: ResourceKind,
    sender: mpsc::UnboundedSender<BridgeMessage>,
    readiness: watch::Receiver<Readiness>,
}

impl BridgeClient {
    pub(crate) fn new(
        key: ResourceKey,
        kind: ResourceKind,
        sender: mpsc::UnboundedSender<BridgeMessage>,
        readiness: watch::Receiver<Readiness>,
    ) -> Self {
        Self {
            key,
            kind,
            sender,
            readiness,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// Asks the bridge to load. Idempotent while loading, ready or busy.
    pub fn load(&self) -> Result<(), BridgeError> {
        self.sender
            .send(BridgeMessage::Load)
            .map_err(|_| BridgeError::BridgeClosed)
    }

    /// Stops the bridge. Pending operations settle as `Failed(BridgeClosed)`.
    pub fn shutdown(&self) -> Result<(), BridgeError> {
        self.sender
            .send(BridgeMessage::Shutdown)
            .map_err(|_| BridgeError::BridgeClosed)
    }

    /// Resolves once the resource reaches `Ready`.
    pub async fn wait_until_ready(&self) -> Result<(), BridgeError> {
        let mut readiness = self.readiness.clone();
        readiness
            .wait_for(|readiness| *readiness == Readiness::Ready)
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::BridgeClosed)
    }

    /// A consistent copy of the bridge's state, taken between two mailbox messages.
    pub async fn snapshot(&self) -> Result<ResourceState, BridgeError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(BridgeMessage::Snapshot { respond_to })
            .map_err(|_| BridgeError::BridgeClosed)?;
        response.await.map_err(|_| BridgeError::BridgeDropped)
    }

    /// Asks the store to finalize a purchase it left pending. Works in any readiness,
    /// since the pending transaction outlives the operation that produced it.
    ///
    /// # Errors
    /// `Unsupported` for anything but a product, `ConfirmFailed` if the store refused,
    /// or `BridgeClosed` if the bridge has stopped.
    pub async fn confirm_purchase(&self) -> Result<(), BridgeError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(BridgeMessage::ConfirmPurchase { respond_to })
            .map_err(|_| BridgeError::BridgeClosed)?;
        response.await.map_err(|_| BridgeError::BridgeDropped)?
    }

    /// Starts an operation and returns its handle without waiting for the outcome.
    ///
    /// # Errors
    /// `NotReady`, `Unsupported`, or `BridgeClosed` if the bridge has stopped.
    pub async fn begin(
        &self,
        kind: OperationKind,
        context: OperationContext,
    ) -> Result<OperationHandle, BridgeError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(BridgeMessage::Begin {
                kind,
                context,
                respond_to,
            })
            .map_err(|_| BridgeError::BridgeClosed)?;
        response.await.map_err(|_| BridgeError::BridgeDropped)?
    }

    /// Runs one operation to its outcome.
    pub async fn perform(&self, kind: OperationKind, context: OperationContext) -> Outcome {
        if !self.kind.accepts(kind) {
            return Outcome::rejected(
                self.key.clone(),
                BridgeError::Unsupported {
                    key: self.key.clone(),
                    kind: self.kind,
                    operation: kind,
                },
            );
        }
        if !self.is_ready() {
            return Outcome::not_ready(self.key.clone());
        }

        match self.begin(kind, context).await {
            Ok(handle) => handle.wait().await,
            Err(error) => Outcome::rejected(self.key.clone(), error),
        }
    }

    #[tracing::instrument(skip(self), fields(resource = %self.key))]
    pub async fn show(&self, context: OperationContext) -> Outcome {
        self.perform(OperationKind::Show, context).await
    }

    #[tracing::instrument(skip(self), fields(resource = %self.key))]
    pub async fn purchase(&self) -> Outcome {
        self.perform(OperationKind::Purchase, OperationContext::default())
            .await
    }

    #[tracing::instrument(skip(self), fields(resource = %self.key))]
    pub async fn restore(&self) -> Outcome {
        self.perform(OperationKind::Restore, OperationContext::default())
            .await
    }

    #[tracing::instrument(skip(self), fields(resource = %self.key))]
    pub async fn request_permission(&self) -> Outcome {
        self.perform(OperationKind::PermissionRequest, OperationContext::default())
            .await
    }
}
