//! # Retry Policy & Bridge Configuration
//!
//! Failed loads are retried by the bridge itself. The policy only computes delays; the
//! bridge owns the timer and the attempt counter.
//!
//! ```toml
//! operation_timeout_ms = 30000
//! orphan_grace_ms = 10000
//!
//! [retry]
//! strategy = "exponential"
//! initial_delay_ms = 1000
//! factor = 2.0
//! max_delay_ms = 60000
//! max_attempts = 8
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_EVENT_BUFFER: usize = 256;
pub const DEFAULT_ORPHAN_GRACE_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Same delay after every failure.
    Fixed {
        delay_ms: u64,
        #[serde(default)]
        max_attempts: Option<u32>,
    },
    /// `initial_delay_ms * factor^attempt`, capped at `max_delay_ms`.
    Exponential {
        initial_delay_ms: u64,
        factor: f64,
        max_delay_ms: u64,
        #[serde(default)]
        max_attempts: Option<u32>,
    },
    Disabled,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed {
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failure number `attempt` (zero-based), or
    /// `None` when no further retry should be scheduled.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Disabled => None,
            RetryPolicy::Fixed {
                delay_ms,
                max_attempts,
            } => {
                if exhausted(*max_attempts, attempt) {
                    return None;
                }
                Some(Duration::from_millis(*delay_ms))
            }
            RetryPolicy::Exponential {
                initial_delay_ms,
                factor,
                max_delay_ms,
                max_attempts,
            } => {
                if exhausted(*max_attempts, attempt) {
                    return None;
                }
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let scaled = (*initial_delay_ms as f64) * factor.max(1.0).powi(exponent);
                let capped = scaled.min(*max_delay_ms as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }
}

fn exhausted(max_attempts: Option<u32>, attempt: u32) -> bool {
    max_attempts.is_some_and(|max| attempt >= max)
}

/// Settings shared by every bridge in a hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub retry: RetryPolicy,
    /// Operations still pending after this long settle as `Failed(Timeout)`.
    pub operation_timeout_ms: Option<u64>,
    /// How long a resource waits for the SDK's own answer to an operation that was
    /// cancelled or timed out before it reloads anyway.
    pub orphan_grace_ms: u64,
    /// Capacity of the broadcast fan-out channel.
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            operation_timeout_ms: None,
            orphan_grace_ms: DEFAULT_ORPHAN_GRACE_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl BridgeConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_millis(self.orphan_grace_ms)
    }
}
