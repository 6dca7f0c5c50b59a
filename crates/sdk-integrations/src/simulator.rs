//! # Simulated SDK
//!
//! [`SimulatedSdk`] behaves like a native SDK with a network behind it: every call
//! returns at once and the callbacks arrive later, from a spawned task, through the
//! [`EventSink`]. It drives the demo binary and end-to-end tests.
//!
//! Behaviour is set by a [`SimulationProfile`]: callback latency, how many loads per
//! resource fail before one succeeds, whether users skip rewarded ads or cancel purchases,
//! whether the store defers purchases until they are confirmed, and how users answer the
//! permission prompt. Products report their store metadata before each successful load.
use async_trait::async_trait;
use callback_bridge::{
    EventSink, OperationContext, ProductDetails, RawEvent, RawEventKind, ResourceKey,
    ResourceKind, SdkAdapter, SdkError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// No-fill code used for simulated load failures.
pub const NO_FILL: i32 = 204;
/// Returned when confirming a product that has no pending purchase.
pub const NOTHING_PENDING: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationProfile {
    pub latency_ms: u64,
    /// Loads that fail with no fill, per resource, before the first success.
    pub failed_loads: u32,
    pub skip_rewarded: bool,
    pub cancel_purchases: bool,
    /// Purchases end as `ExistingPurchasePending` until confirmed.
    pub defer_purchases: bool,
    pub grant_permission: bool,
    pub restored_purchases: u32,
    pub network_name: String,
    pub revenue_per_impression: f64,
    pub reward_label: String,
    pub reward_amount: u32,
    pub product_price: f64,
    pub currency_code: String,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            failed_loads: 0,
            skip_rewarded: false,
            cancel_purchases: false,
            defer_purchases: false,
            grant_permission: true,
            restored_purchases: 1,
            network_name: "Simulated".to_string(),
            revenue_per_impression: 0.015,
            reward_label: "coins".to_string(),
            reward_amount: 100,
            product_price: 0.99,
            currency_code: "USD".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct SimulationState {
    kinds: HashMap<ResourceKey, ResourceKind>,
    load_attempts: HashMap<ResourceKey, u32>,
    pending_purchases: HashSet<ResourceKey>,
}

#[derive(Clone)]
pub struct SimulatedSdk {
    sink: Arc<dyn EventSink>,
    profile: SimulationProfile,
    state: Arc<Mutex<SimulationState>>,
    transactions: Arc<AtomicU64>,
}

impl std::fmt::Debug for SimulatedSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSdk")
            .field("profile", &self.profile)
            .finish()
    }
}

impl SimulatedSdk {
    pub fn new(sink: Arc<dyn EventSink>, profile: SimulationProfile) -> Self {
        Self {
            sink,
            profile,
            state: Arc::new(Mutex::new(SimulationState::default())),
            transactions: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Delivers `events` for `key` after the configured latency, from another task.
    fn emit_later(&self, key: &ResourceKey, events: Vec<RawEventKind>) {
        let sink = Arc::clone(&self.sink);
        let key = key.to_string();
        let latency = Duration::from_millis(self.profile.latency_ms);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            for event in events {
                sink.deliver(RawEvent::new(key.as_str(), event));
            }
        });
    }

    fn kind_of(&self, key: &ResourceKey) -> Option<ResourceKind> {
        self.state.lock().kinds.get(key).copied()
    }

    fn product_details(&self, key: &ResourceKey) -> ProductDetails {
        ProductDetails {
            title: key.to_string(),
            description: format!("Simulated product {key}"),
            price_string: format!("{:.2} {}", self.profile.product_price, self.profile.currency_code),
            price: self.profile.product_price,
            currency_code: self.profile.currency_code.clone(),
            available: true,
        }
    }

    fn ad_events(&self, kind: ResourceKind, placement: Option<String>) -> Vec<RawEventKind> {
        let mut events = vec![
            RawEventKind::DisplayStarted,
            RawEventKind::RevenuePaid {
                network: self.profile.network_name.clone(),
                placement,
                amount: self.profile.revenue_per_impression,
                currency: None,
                country_code: Some("US".to_string()),
            },
        ];
        if kind == ResourceKind::RewardedAd && !self.profile.skip_rewarded {
            events.push(RawEventKind::RewardGranted {
                label: self.profile.reward_label.clone(),
                amount: self.profile.reward_amount,
            });
        }
        events.push(RawEventKind::Dismissed);
        events
    }
}

#[async_trait]
impl SdkAdapter for SimulatedSdk {
    async fn load(&self, key: &ResourceKey, kind: ResourceKind) -> Result<(), SdkError> {
        let attempt = {
            let mut state = self.state.lock();
            state.kinds.insert(key.clone(), kind);
            let attempts = state.load_attempts.entry(key.clone()).or_insert(0);
            *attempts += 1;
            *attempts
        };
        debug!(resource = %key, attempt, "Simulated load");

        let events = if attempt <= self.profile.failed_loads {
            vec![RawEventKind::LoadFailed {
                code: NO_FILL,
                message: "No fill".to_string(),
            }]
        } else if kind == ResourceKind::Product {
            vec![
                RawEventKind::ProductDetails(self.product_details(key)),
                RawEventKind::LoadSucceeded,
            ]
        } else {
            vec![RawEventKind::LoadSucceeded]
        };
        self.emit_later(key, events);
        Ok(())
    }

    async fn show(&self, key: &ResourceKey, context: &OperationContext) -> Result<(), SdkError> {
        let kind = self
            .kind_of(key)
            .ok_or_else(|| SdkError::new(1, format!("{key} was never loaded")))?;
        self.emit_later(key, self.ad_events(kind, context.placement.clone()));
        Ok(())
    }

    async fn purchase(&self, key: &ResourceKey) -> Result<(), SdkError> {
        let event = if self.profile.cancel_purchases {
            RawEventKind::PurchaseFailed {
                reason: "UserCancelled".to_string(),
                message: None,
            }
        } else if self.profile.defer_purchases {
            self.state.lock().pending_purchases.insert(key.clone());
            RawEventKind::PurchaseFailed {
                reason: "ExistingPurchasePending".to_string(),
                message: Some("Awaiting confirmation".to_string()),
            }
        } else {
            let n = self.transactions.fetch_add(1, Ordering::Relaxed);
            RawEventKind::PurchaseCompleted {
                transaction_id: format!("sim-{n:06}"),
                receipt: format!("{{\"product\":\"{key}\",\"transaction\":{n}}}"),
            }
        };
        self.emit_later(key, vec![event]);
        Ok(())
    }

    async fn confirm_purchase(&self, key: &ResourceKey) -> Result<(), SdkError> {
        if self.state.lock().pending_purchases.remove(key) {
            debug!(resource = %key, "Simulated purchase confirmed");
            Ok(())
        } else {
            Err(SdkError::new(
                NOTHING_PENDING,
                format!("no pending purchase for {key}"),
            ))
        }
    }

    async fn restore(&self, key: &ResourceKey) -> Result<(), SdkError> {
        self.emit_later(
            key,
            vec![RawEventKind::RestoreCompleted {
                restored: self.profile.restored_purchases,
            }],
        );
        Ok(())
    }

    async fn request_permission(&self, key: &ResourceKey) -> Result<(), SdkError> {
        let event = if self.profile.grant_permission {
            RawEventKind::PermissionGranted
        } else {
            RawEventKind::PermissionDenied
        };
        self.emit_later(key, vec![event]);
        Ok(())
    }
}
