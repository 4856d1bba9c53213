//! System configuration parameters
//!
//! Capacity bounds for the FSM engine are compile-time constants so that
//! every engine structure is fixed-size.  Runtime tunables for the node's
//! machines live in [`NodeConfig`], which can be overridden from the
//! key-value store or during provisioning.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

// --- Engine capacity ---

/// Maximum number of machine instances a registry can hold.
pub const MAX_MACHINES: usize = 8;
/// Maximum number of states in one machine's table.
pub const MAX_STATES: usize = 16;
/// Pending-event slots in the global queue (tombstones included).
pub const EVENT_QUEUE_CAP: usize = 32;
/// Named-timer slots per machine instance.
pub const NAMED_TIMERS_PER_MACHINE: usize = 4;

/// Longest line a [`LineSocket`](crate::app::ports::LineSocket) delivers.
pub const LINE_MAX: usize = 64;

/// Runtime configuration for the node's state machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Heartbeat ---
    /// How long the heartbeat machine stays ACTIVE (ms).
    pub heartbeat_window_ms: u32,
    /// Period of the PING named timer while ACTIVE (ms).
    pub heartbeat_ping_ms: u32,
    /// How often the firmware re-activates the heartbeat (ms).
    pub heartbeat_period_ms: u32,

    // --- Modem link ---
    /// Device path handed to `LineSocket::open`.
    pub link_device: String<16>,
    /// UART baud rate applied via ioctl after opening.
    pub link_baud: u32,
    /// Time to wait for `OK` after each probe (ms).
    pub link_probe_timeout_ms: u32,
    /// Probes sent before the link is declared failed.
    pub link_probe_attempts: u8,
    /// Keep-alive period once the link is ready (ms).
    pub link_keepalive_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut link_device = String::new();
        // "uart1" is 5 bytes, always fits.
        let _ = link_device.push_str("uart1");

        Self {
            // Heartbeat
            heartbeat_window_ms: 100,
            heartbeat_ping_ms: 50,
            heartbeat_period_ms: 60_000,

            // Modem link
            link_device,
            link_baud: 115_200,
            link_probe_timeout_ms: 500,
            link_probe_attempts: 3,
            link_keepalive_ms: 30_000,
        }
    }
}

impl NodeConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_ping_ms == 0 {
            return Err(ConfigError::ValidationFailed("heartbeat_ping_ms must be > 0"));
        }
        if self.heartbeat_window_ms < self.heartbeat_ping_ms {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_window_ms must be >= heartbeat_ping_ms",
            ));
        }
        if self.heartbeat_period_ms <= self.heartbeat_window_ms {
            return Err(ConfigError::ValidationFailed(
                "heartbeat_period_ms must exceed heartbeat_window_ms",
            ));
        }
        if self.link_device.is_empty() {
            return Err(ConfigError::ValidationFailed("link_device must not be empty"));
        }
        if !(1_200..=921_600).contains(&self.link_baud) {
            return Err(ConfigError::ValidationFailed("link_baud must be 1200–921600"));
        }
        if self.link_probe_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "link_probe_timeout_ms must be > 0",
            ));
        }
        if self.link_probe_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "link_probe_attempts must be >= 1",
            ));
        }
        if self.link_keepalive_ms <= self.link_probe_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "link_keepalive_ms must exceed link_probe_timeout_ms",
            ));
        }
        Ok(())
    }

    /// Parse a provisioning document.  Unknown fields are ignored; missing
    /// ones are an error.  The result is validated before it is returned.
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(json).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for a provisioning client.
    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        serde_json::to_vec(self).map_err(|_| ConfigError::Corrupted)
    }
}
