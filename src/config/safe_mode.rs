//! Safe mode supervisor configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Safe mode supervisor settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafeModeConfig {
    /// Polling interval of the expiry supervisor (default: 10s).
    #[serde(default, with = "duration")]
    pub monitor_interval: Duration,
}
