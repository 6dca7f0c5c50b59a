//! Ad placements and the results of showing them.
//!
//! A placement is a host-side name for a spot in the game ("level_complete",
//! "double_coins") mapped onto an ad unit. Several placements may share one ad unit, in
//! which case they share its readiness too.
use callback_bridge::{Outcome, OutcomePayload, OutcomeStatus, ResourceKind, Reward};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    Rewarded,
    Interstitial,
}

impl AdType {
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            AdType::Rewarded => ResourceKind::RewardedAd,
            AdType::Interstitial => ResourceKind::InterstitialAd,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPlacement {
    pub id: String,
    pub ad_type: AdType,
    pub ad_unit_id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl AdPlacement {
    pub fn new(id: impl Into<String>, ad_type: AdType, ad_unit_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ad_type,
            ad_unit_id: ad_unit_id.into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdResultStatus {
    Success,
    Failed,
    UserCancelled,
    /// The ad unit is loading or busy with another show.
    NotReady,
    /// The ad unit has no ad and is not loading one. A load was requested.
    NotLoaded,
}

/// What the host gets back from showing a placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdResult {
    pub status: AdResultStatus,
    pub placement: String,
    pub ad_unit_id: String,
    /// Set for rewarded placements that earned their reward.
    pub reward: Option<Reward>,
    pub error_message: Option<String>,
}

impl AdResult {
    fn with_status(placement: &AdPlacement, status: AdResultStatus) -> Self {
        Self {
            status,
            placement: placement.id.clone(),
            ad_unit_id: placement.ad_unit_id.clone(),
            reward: None,
            error_message: None,
        }
    }

    pub fn not_loaded(placement: &AdPlacement) -> Self {
        Self::with_status(placement, AdResultStatus::NotLoaded)
    }

    pub fn failed(placement: &AdPlacement, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_status(placement, AdResultStatus::Failed)
        }
    }

    /// Maps a show outcome of the placement's ad unit.
    pub fn from_outcome(placement: &AdPlacement, outcome: &Outcome) -> Self {
        match outcome.status() {
            OutcomeStatus::Success => {
                let reward = match outcome.payload() {
                    Some(OutcomePayload::Reward(reward)) => Some(reward.clone()),
                    _ => None,
                };
                Self {
                    reward,
                    ..Self::with_status(placement, AdResultStatus::Success)
                }
            }
            OutcomeStatus::Cancelled => Self::with_status(placement, AdResultStatus::UserCancelled),
            OutcomeStatus::NotReady => Self::with_status(placement, AdResultStatus::NotReady),
            OutcomeStatus::Failed => Self::failed(
                placement,
                outcome
                    .error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "Unknown failure".to_string()),
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AdResultStatus::Success
    }
}
