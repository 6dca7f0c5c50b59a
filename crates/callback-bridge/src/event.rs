//! # SDK Events
//!
//! [`RawEvent`] is what SDK glue code hands to the [`EventSink`](crate::router::EventSink):
//! a resource key plus loosely typed callback data (numeric error codes, store reason
//! strings). The router translates it into a [`ResourceEvent`] before any bridge sees it,
//! so raw SDK codes stop at this boundary.

use crate::error::BridgeError;
use crate::fanout::RevenueRecord;
use crate::resource::ResourceKey;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "USD";

/// A native callback, as reported by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub key: String,
    pub kind: RawEventKind,
}

impl RawEvent {
    pub fn new(key: impl Into<String>, kind: RawEventKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawEventKind {
    LoadSucceeded,
    LoadFailed {
        code: i32,
        message: String,
    },
    DisplayStarted,
    DisplayFailed {
        code: i32,
        message: String,
    },
    Dismissed,
    RewardGranted {
        label: String,
        amount: u32,
    },
    RevenuePaid {
        network: String,
        placement: Option<String>,
        amount: f64,
        /// ISO 4217 code; `USD` when the network does not report one.
        currency: Option<String>,
        country_code: Option<String>,
    },
    PurchaseCompleted {
        transaction_id: String,
        receipt: String,
    },
    PurchaseFailed {
        /// The store's failure reason name, e.g. `"UserCancelled"` or `"payment_declined"`.
        reason: String,
        message: Option<String>,
    },
    RestoreCompleted {
        restored: u32,
    },
    RestoreFailed {
        message: String,
    },
    /// Store metadata for a product, reported when the store initializes.
    ProductDetails(ProductDetails),
    PermissionGranted,
    PermissionProvisional,
    PermissionDenied,
}

/// Why the store rejected a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseFailureReason {
    Unknown,
    UserCancelled,
    PaymentDeclined,
    ProductUnavailable,
    PurchasingUnavailable,
    SignatureInvalid,
    DuplicateTransaction,
    ExistingPurchasePending,
}

impl PurchaseFailureReason {
    /// Parses a store reason name. Case and `_`/`-` separators are ignored; anything
    /// unrecognised maps to `Unknown`.
    pub fn from_store_code(code: &str) -> Self {
        let normalized: String = code
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "usercancelled" | "cancelled" | "canceled" => Self::UserCancelled,
            "paymentdeclined" => Self::PaymentDeclined,
            "productunavailable" => Self::ProductUnavailable,
            "purchasingunavailable" => Self::PurchasingUnavailable,
            "signatureinvalid" => Self::SignatureInvalid,
            "duplicatetransaction" => Self::DuplicateTransaction,
            "existingpurchasepending" => Self::ExistingPurchasePending,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionStatus {
    Unknown,
    NotDetermined,
    Denied,
    Authorized,
    Provisional,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Authorized | Self::Provisional)
    }
}

/// Localized store metadata for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    pub description: String,
    /// Formatted by the store for display, e.g. `"$0.99"`.
    pub price_string: String,
    pub price: f64,
    /// ISO 4217 code.
    pub currency_code: String,
    /// `false` when the store lists the product but will not sell it right now.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub label: String,
    pub amount: u32,
}

/// Typed event consumed by a bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    LoadSucceeded,
    LoadFailed(BridgeError),
    DisplayStarted,
    DisplayFailed(String),
    Dismissed,
    RewardGranted(Reward),
    RevenuePaid(RevenueRecord),
    PurchaseCompleted {
        transaction_id: String,
        receipt: String,
    },
    PurchaseFailed {
        reason: PurchaseFailureReason,
        message: Option<String>,
    },
    RestoreCompleted {
        restored: u32,
    },
    RestoreFailed(String),
    ProductDetails(ProductDetails),
    PermissionResolved(PermissionStatus),
}

impl ResourceEvent {
    /// Terminal events end the current operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceEvent::DisplayFailed(_)
                | ResourceEvent::Dismissed
                | ResourceEvent::PurchaseCompleted { .. }
                | ResourceEvent::PurchaseFailed { .. }
                | ResourceEvent::RestoreCompleted { .. }
                | ResourceEvent::RestoreFailed(_)
                | ResourceEvent::PermissionResolved(_)
        )
    }
}

impl RawEvent {
    pub(crate) fn translate(self) -> (ResourceKey, ResourceEvent) {
        let key = ResourceKey::new(self.key);
        let event = match self.kind {
            RawEventKind::LoadSucceeded => ResourceEvent::LoadSucceeded,
            RawEventKind::LoadFailed { code, message } => {
                ResourceEvent::LoadFailed(BridgeError::LoadFailed(format!("{message} (code {code})")))
            }
            RawEventKind::DisplayStarted => ResourceEvent::DisplayStarted,
            RawEventKind::DisplayFailed { code, message } => {
                ResourceEvent::DisplayFailed(format!("{message} (code {code})"))
            }
            RawEventKind::Dismissed => ResourceEvent::Dismissed,
            RawEventKind::RewardGranted { label, amount } => {
                ResourceEvent::RewardGranted(Reward { label, amount })
            }
            RawEventKind::RevenuePaid {
                network,
                placement,
                amount,
                currency,
                country_code,
            } => ResourceEvent::RevenuePaid(RevenueRecord {
                resource_key: key.clone(),
                network_name: network,
                placement,
                amount,
                currency: currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                country_code,
            }),
            RawEventKind::PurchaseCompleted {
                transaction_id,
                receipt,
            } => ResourceEvent::PurchaseCompleted {
                transaction_id,
                receipt,
            },
            RawEventKind::PurchaseFailed { reason, message } => ResourceEvent::PurchaseFailed {
                reason: PurchaseFailureReason::from_store_code(&reason),
                message,
            },
            RawEventKind::RestoreCompleted { restored } => {
                ResourceEvent::RestoreCompleted { restored }
            }
            RawEventKind::RestoreFailed { message } => ResourceEvent::RestoreFailed(message),
            RawEventKind::ProductDetails(details) => ResourceEvent::ProductDetails(details),
            RawEventKind::PermissionGranted => {
                ResourceEvent::PermissionResolved(PermissionStatus::Authorized)
            }
            RawEventKind::PermissionProvisional => {
                ResourceEvent::PermissionResolved(PermissionStatus::Provisional)
            }
            RawEventKind::PermissionDenied => {
                ResourceEvent::PermissionResolved(PermissionStatus::Denied)
            }
        };
        (key, event)
    }
}
