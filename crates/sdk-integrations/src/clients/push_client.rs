//! # Push Permission Client
//!
//! The permission prompt is a one-shot resource: once the user answered, the bridge does
//! not reload it, and this client answers from the recorded status instead.
use callback_bridge::{BridgeClient, OutcomePayload, PermissionStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
struct PushState {
    requested: bool,
    status: Option<PermissionStatus>,
}

#[derive(Debug, Clone)]
pub struct PushPermissionClient {
    bridge: BridgeClient,
    state: Arc<Mutex<PushState>>,
}

impl PushPermissionClient {
    pub(crate) fn new(bridge: BridgeClient) -> Self {
        Self {
            bridge,
            state: Arc::new(Mutex::new(PushState::default())),
        }
    }

    /// `Unknown` until the push SDK is ready, `NotDetermined` until the user answers.
    pub fn status(&self) -> PermissionStatus {
        match self.state.lock().status {
            Some(status) => status,
            None if self.bridge.is_ready() => PermissionStatus::NotDetermined,
            None => PermissionStatus::Unknown,
        }
    }

    pub fn has_requested_permission(&self) -> bool {
        self.state.lock().requested
    }

    /// Whether the host should explain notifications before the system prompt appears.
    pub fn should_show_pre_permission_prompt(&self) -> bool {
        !self.has_requested_permission() && self.status() == PermissionStatus::NotDetermined
    }

    /// Shows the system prompt. Returns whether notifications are allowed.
    ///
    /// After the first answer the prompt is not shown again; later calls return the
    /// recorded answer. A request the user never answered does not count.
    #[instrument(skip(self), fields(resource = %self.bridge.key()))]
    pub async fn request_permission(&self) -> bool {
        {
            let state = self.state.lock();
            if state.requested {
                return state.status.is_some_and(PermissionStatus::is_granted);
            }
        }

        let outcome = self.bridge.request_permission().await;
        let status = match outcome.payload() {
            Some(OutcomePayload::Permission(status)) => Some(*status),
            _ => None,
        };

        match status {
            Some(status) => {
                info!(?status, "Permission answered");
                let mut state = self.state.lock();
                state.requested = true;
                state.status = Some(status);
                status.is_granted()
            }
            // Without an answer (timeout, closed bridge) the prompt may be shown again.
            None => {
                warn!(status = ?outcome.status(), error = ?outcome.error(), "Permission request did not complete");
                false
            }
        }
    }
}
