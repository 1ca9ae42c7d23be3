//! Sync layer configuration
//!
//! Plain struct with environment overrides; the CLI binary layers clap
//! arguments on top of this for transport settings.

use std::time::Duration;

/// Tunables for the reader's refresh cadence and the transport timeouts
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Background re-fetch interval for all mirrored scopes
    pub refresh_interval: Duration,
    /// Timeout for ledger reads and submissions.
    /// Confirmation waits are deliberately unbounded (no client-side timeout
    /// on a pending write) so this does not apply to `await_confirmation`.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TURNOUT_REFRESH_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("TURNOUT_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        config
    }
}
