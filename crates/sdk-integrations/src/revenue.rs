//! Impression revenue bookkeeping.
//!
//! [`RevenueLedger`] is an [`EventSubscriber`] that logs every revenue report and keeps a
//! per-currency running total, the shape analytics forwarding usually needs. Only the
//! most recent impressions are kept; the totals cover the whole session.
use async_trait::async_trait;
use callback_bridge::{BridgeEvent, EventSubscriber, RevenueRecord, SubscriberError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::info;

pub const MAX_RECENT_IMPRESSIONS: usize = 256;

#[derive(Debug, Clone)]
pub struct RevenueLedger {
    totals: Arc<Mutex<HashMap<String, f64>>>,
    impressions: Arc<Mutex<VecDeque<RevenueRecord>>>,
    capacity: usize,
}

impl Default for RevenueLedger {
    fn default() -> Self {
        Self::with_capacity(MAX_RECENT_IMPRESSIONS)
    }
}

impl RevenueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` recent impressions (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            totals: Arc::new(Mutex::new(HashMap::new())),
            impressions: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn total(&self, currency: &str) -> f64 {
        self.totals.lock().get(currency).copied().unwrap_or(0.0)
    }

    /// The most recent impressions, oldest first.
    pub fn impressions(&self) -> Vec<RevenueRecord> {
        self.impressions.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl EventSubscriber for RevenueLedger {
    fn name(&self) -> &str {
        "revenue-ledger"
    }

    async fn on_event(&self, event: &BridgeEvent) -> Result<(), SubscriberError> {
        let BridgeEvent::Revenue(record) = event else {
            return Ok(());
        };
        if !record.amount.is_finite() || record.amount < 0.0 {
            return Err(SubscriberError(format!(
                "invalid revenue amount {} from {}",
                record.amount, record.network_name
            )));
        }

        info!(
            resource = %record.resource_key,
            network = %record.network_name,
            placement = ?record.placement,
            amount = record.amount,
            currency = %record.currency,
            "Ad revenue"
        );
        *self
            .totals
            .lock()
            .entry(record.currency.clone())
            .or_insert(0.0) += record.amount;
        let mut impressions = self.impressions.lock();
        if impressions.len() == self.capacity {
            impressions.pop_front();
        }
        impressions.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback_bridge::ResourceKey;

    fn record(amount: f64, currency: &str) -> BridgeEvent {
        BridgeEvent::Revenue(RevenueRecord {
            resource_key: ResourceKey::new("rewarded_main"),
            network_name: "AppLovin".to_string(),
            placement: Some("double_coins".to_string()),
            amount,
            currency: currency.to_string(),
            country_code: Some("US".to_string()),
        })
    }

    #[tokio::test]
    async fn test_totals_per_currency() {
        let ledger = RevenueLedger::new();
        ledger.on_event(&record(0.02, "USD")).await.unwrap();
        ledger.on_event(&record(0.03, "USD")).await.unwrap();
        ledger.on_event(&record(0.01, "EUR")).await.unwrap();
        ledger
            .on_event(&BridgeEvent::Dismissed {
                key: ResourceKey::new("rewarded_main"),
            })
            .await
            .unwrap();

        assert!((ledger.total("USD") - 0.05).abs() < 1e-9);
        assert!((ledger.total("EUR") - 0.01).abs() < 1e-9);
        assert_eq!(ledger.total("JPY"), 0.0);
        assert_eq!(ledger.impressions().len(), 3);
    }

    #[tokio::test]
    async fn test_keeps_only_recent_impressions_but_full_totals() {
        let ledger = RevenueLedger::with_capacity(2);
        for amount in [0.01, 0.02, 0.03, 0.04] {
            ledger.on_event(&record(amount, "USD")).await.unwrap();
        }

        let amounts: Vec<f64> = ledger.impressions().iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![0.03, 0.04]);
        assert!((ledger.total("USD") - 0.10).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejects_negative_amount() {
        let ledger = RevenueLedger::new();
        assert!(ledger.on_event(&record(-1.0, "USD")).await.is_err());
        assert!(ledger.impressions().is_empty());
    }
}
