//! # Revenue & Outcome Fan-out
//!
//! Bridges publish lifecycle notifications ([`BridgeEvent`]) on a shared
//! `tokio::sync::broadcast` channel. Analytics, attribution and UI code listen here
//! instead of hooking SDK callbacks directly.
//!
//! ```text
//! ┌─────────┐  publish   ┌───────────────┐  subscribe()  ┌──────────────┐
//! │ bridge  ├───────────>│               ├──────────────>│ Receiver     │
//! └─────────┘            │ OutcomeFanout │               └──────────────┘
//! ┌─────────┐  publish   │  (broadcast)  │  register()   ┌──────────────┐
//! │ bridge  ├───────────>│               ├──────────────>│ EventSubscriber (own task)
//! └─────────┘            └───────────────┘               └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Publishing never blocks and never fails the bridge, even with zero subscribers.
//! - A slow receiver loses the oldest events (`RecvError::Lagged`) but never slows the
//!   publisher or other receivers.
//! - A registered [`EventSubscriber`] runs on its own task. Each delivery runs in a child
//!   task, so an error or panic is logged and the subscriber keeps receiving.

use crate::event::{PermissionStatus, ProductDetails, Reward};
use crate::operation::Outcome;
use crate::resource::ResourceKey;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// An impression-level revenue report. Emitted independently of any outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueRecord {
    pub resource_key: ResourceKey,
    pub network_name: String,
    pub placement: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Loaded {
        key: ResourceKey,
    },
    LoadFailed {
        key: ResourceKey,
        /// Failures since the last successful load, including this one.
        attempt: u32,
        /// `None` when no retry is scheduled.
        retry_in: Option<Duration>,
        reason: String,
    },
    Displayed {
        key: ResourceKey,
    },
    DisplayFailed {
        key: ResourceKey,
        reason: String,
    },
    Dismissed {
        key: ResourceKey,
    },
    Revenue(RevenueRecord),
    RewardEarned {
        key: ResourceKey,
        reward: Reward,
    },
    PermissionChanged {
        key: ResourceKey,
        status: PermissionStatus,
    },
    ProductDetails {
        key: ResourceKey,
        details: ProductDetails,
    },
    OperationSettled(Outcome),
}

impl BridgeEvent {
    pub fn resource_key(&self) -> &ResourceKey {
        match self {
            BridgeEvent::Loaded { key }
            | BridgeEvent::LoadFailed { key, .. }
            | BridgeEvent::Displayed { key }
            | BridgeEvent::DisplayFailed { key, .. }
            | BridgeEvent::Dismissed { key }
            | BridgeEvent::RewardEarned { key, .. }
            | BridgeEvent::PermissionChanged { key, .. }
            | BridgeEvent::ProductDetails { key, .. } => key,
            BridgeEvent::Revenue(record) => &record.resource_key,
            BridgeEvent::OperationSettled(outcome) => outcome.resource_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

/// A listener driven by the fan-out on its own task.
#[async_trait]
pub trait EventSubscriber: Send + Sync + 'static {
    fn name(&self) -> &str {
        "subscriber"
    }

    async fn on_event(&self, event: &BridgeEvent) -> Result<(), SubscriberError>;
}

/// Handle to a registered subscriber's task.
#[derive(Debug)]
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeFanout {
    sender: broadcast::Sender<BridgeEvent>,
}

impl OutcomeFanout {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: BridgeEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Event published"),
            Err(_) => debug!("Event published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Drives `subscriber` on a dedicated task until the fan-out closes.
    ///
    /// Must be called from within a Tokio runtime. Events published after this returns
    /// are guaranteed to reach the subscriber (unless it lags).
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionHandle {
        let mut receiver = self.sender.subscribe();
        let name = subscriber.name().to_string();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let target = Arc::clone(&subscriber);
                        let delivery = tokio::spawn(async move { target.on_event(&event).await });
                        match delivery.await {
                            Ok(Ok(())) => {}
                            Ok(Err(error)) => {
                                warn!(subscriber = %name, %error, "Subscriber returned an error")
                            }
                            Err(error) => {
                                warn!(subscriber = %name, %error, "Subscriber task failed")
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(subscriber = %name, skipped, "Subscriber lagged, events lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(subscriber = %name, "Subscriber stopped");
        });

        SubscriptionHandle { task }
    }
}
