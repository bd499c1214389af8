//! Execution configuration.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Order execution settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    /// Delay before the single placement retry (default: 1s).
    #[serde(default, with = "duration")]
    pub retry_backoff: Duration,
    /// Interval between open-order monitoring passes (default: 5s).
    #[serde(default, with = "duration")]
    pub monitor_interval: Duration,
    /// Minimum signal confidence required to place an order (default: 0.7).
    pub min_confidence: Option<Decimal>,
}
