//! Backend configuration
//!
//! Replaces the process-wide tracking and expression-index switches with
//! explicit configuration handed to the coordinator, cursor manager and codec
//! at construction time.
//!
//! ```
//! use fdb_core::config::BackendConfig;
//!
//! let config = BackendConfig::new()
//!     .track(true)
//!     .default_timezone("UTC");
//! assert!(config.track);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timezone used for temporal fields when a session has none configured
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Configuration for the federated backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Emit diagnostic lines for handle acquisition, release and commits
    pub track: bool,
    /// Convert expression-index keys; when off, keys pass through untouched
    pub expression_indexes: bool,
    /// Timezone for sessions that do not set one
    pub default_timezone: String,
    /// Upper bound on one wait of the commit/rollback drain barrier
    pub drain_poll_ms: u64,
    /// Upper bound on one wait for a transaction to be registered
    pub join_poll_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            track: false,
            expression_indexes: true,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            drain_poll_ms: 10,
            join_poll_ms: 10,
        }
    }
}

impl BackendConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with tracking enabled
    pub fn diagnostics() -> Self {
        BackendConfig {
            track: true,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::FatalConfiguration(format!("invalid backend config: {}", e)))
    }

    /// Enable or disable tracking diagnostics
    pub fn track(mut self, enabled: bool) -> Self {
        self.track = enabled;
        self
    }

    /// Enable or disable expression-index key conversion
    pub fn expression_indexes(mut self, enabled: bool) -> Self {
        self.expression_indexes = enabled;
        self
    }

    /// Set the default session timezone
    pub fn default_timezone(mut self, tz: impl Into<String>) -> Self {
        self.default_timezone = tz.into();
        self
    }

    /// Set the drain barrier wait interval
    pub fn drain_poll(mut self, interval: Duration) -> Self {
        self.drain_poll_ms = interval.as_millis() as u64;
        self
    }

    /// Set the registration wait interval
    pub fn join_poll(mut self, interval: Duration) -> Self {
        self.join_poll_ms = interval.as_millis() as u64;
        self
    }

    /// Drain barrier wait interval
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms.max(1))
    }

    /// Registration wait interval
    pub fn join_poll_interval(&self) -> Duration {
        Duration::from_millis(self.join_poll_ms.max(1))
    }
}
