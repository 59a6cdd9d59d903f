//! Relay hub configuration
//!
//! Timings for the liveness protocol and the per-recipient send retry
//! budget, plus the per-room history bound.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Relay hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Maximum events retained per room for late joiners
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Heartbeat scheduler cadence in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Per-connection idle disconnect timer in milliseconds
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Per-send completion timeout in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Delay between send retries in milliseconds
    #[serde(default = "default_send_retry_delay_ms")]
    pub send_retry_delay_ms: u64,

    /// Maximum send passes per recipient
    #[serde(default = "default_send_max_retries")]
    pub send_max_retries: u32,

    /// Stamp relayed payloads with the sender's client id
    #[serde(default)]
    pub stamp_sender: bool,
}

impl RelayConfig {
    /// Heartbeat scheduler cadence
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Per-connection idle disconnect timer
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Absolute idle threshold past which a session is evicted
    pub fn liveness_threshold(&self) -> Duration {
        self.heartbeat_interval() + self.heartbeat_timeout()
    }

    /// Per-send completion timeout
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Delay between send retries
    pub fn send_retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.history_capacity == 0 {
            return Err(ValidationError::InvalidHistoryCapacity);
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ValidationError::InvalidHeartbeatInterval);
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(ValidationError::InvalidHeartbeatTimeout);
        }
        if self.send_timeout_ms == 0 {
            return Err(ValidationError::InvalidSendTimeout);
        }
        if self.send_max_retries == 0 {
            return Err(ValidationError::InvalidSendRetries);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            send_retry_delay_ms: default_send_retry_delay_ms(),
            send_max_retries: default_send_max_retries(),
            stamp_sender: false,
        }
    }
}

fn default_history_capacity() -> usize {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_send_retry_delay_ms() -> u64 {
    1_000
}

fn default_send_max_retries() -> u32 {
    3
}
