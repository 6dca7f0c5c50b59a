//! # Ad Client
//!
//! Shows ads by placement id. Placements resolve to ad unit bridges; the bridge decides
//! whether the show succeeded, was skipped or failed, and reloads the unit afterwards.
use crate::error::IntegrationError;
use crate::model::{AdPlacement, AdResult, AdType};
use callback_bridge::{BridgeClient, BridgeError, OperationContext, Readiness};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
struct PlacementEntry {
    placement: AdPlacement,
    unit: BridgeClient,
}

/// Client for rewarded and interstitial placements.
#[derive(Debug, Clone)]
pub struct AdClient {
    placements: Arc<HashMap<String, PlacementEntry>>,
}

impl AdClient {
    /// `units` must contain a bridge client for every placement's ad unit.
    pub(crate) fn new(
        placements: &[AdPlacement],
        units: &HashMap<String, BridgeClient>,
    ) -> Result<Self, IntegrationError> {
        let mut entries = HashMap::with_capacity(placements.len());
        for placement in placements {
            let unit = units.get(&placement.ad_unit_id).cloned().ok_or_else(|| {
                BridgeError::UnknownResource(placement.ad_unit_id.as_str().into())
            })?;
            entries.insert(
                placement.id.clone(),
                PlacementEntry {
                    placement: placement.clone(),
                    unit,
                },
            );
        }
        Ok(Self {
            placements: Arc::new(entries),
        })
    }

    fn entry(&self, placement_id: &str) -> Result<&PlacementEntry, IntegrationError> {
        self.placements
            .get(placement_id)
            .ok_or_else(|| IntegrationError::UnknownPlacement(placement_id.to_string()))
    }

    pub fn placement(&self, placement_id: &str) -> Option<&AdPlacement> {
        self.placements.get(placement_id).map(|entry| &entry.placement)
    }

    pub fn placements(&self) -> impl Iterator<Item = &AdPlacement> {
        self.placements.values().map(|entry| &entry.placement)
    }

    /// `false` for unknown and disabled placements.
    pub fn is_ready(&self, placement_id: &str) -> bool {
        self.placements
            .get(placement_id)
            .is_some_and(|entry| entry.placement.enabled && entry.unit.is_ready())
    }

    /// Asks the placement's ad unit to load. A no-op unless the unit is idle.
    #[instrument(skip(self))]
    pub fn load(&self, placement_id: &str) -> Result<(), IntegrationError> {
        let entry = self.entry(placement_id)?;
        entry.unit.load()?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn show_rewarded(&self, placement_id: &str) -> Result<AdResult, IntegrationError> {
        self.show_typed(placement_id, AdType::Rewarded).await
    }

    #[instrument(skip(self))]
    pub async fn show_interstitial(&self, placement_id: &str) -> Result<AdResult, IntegrationError> {
        self.show_typed(placement_id, AdType::Interstitial).await
    }

    async fn show_typed(
        &self,
        placement_id: &str,
        expected: AdType,
    ) -> Result<AdResult, IntegrationError> {
        let actual = self.entry(placement_id)?.placement.ad_type;
        if actual != expected {
            return Err(IntegrationError::WrongAdType {
                placement: placement_id.to_string(),
                expected,
                actual,
            });
        }
        self.show(placement_id).await
    }

    /// Shows a placement of any type.
    ///
    /// An idle ad unit is asked to load and the result is `NotLoaded`; a unit that is
    /// loading or busy yields `NotReady`. Neither reaches the SDK's show call.
    pub async fn show(&self, placement_id: &str) -> Result<AdResult, IntegrationError> {
        let PlacementEntry { placement, unit } = self.entry(placement_id)?;
        if !placement.enabled {
            debug!(placement = %placement.id, "Placement disabled");
            return Ok(AdResult::failed(placement, "Placement disabled"));
        }
        if unit.readiness() == Readiness::NotLoaded {
            debug!(placement = %placement.id, "Ad unit idle, requesting load");
            unit.load()?;
            return Ok(AdResult::not_loaded(placement));
        }

        let outcome = unit
            .show(OperationContext::with_placement(placement.id.as_str()))
            .await;
        let result = AdResult::from_outcome(placement, &outcome);
        info!(placement = %placement.id, status = ?result.status, "Ad finished");
        Ok(result)
    }
}
