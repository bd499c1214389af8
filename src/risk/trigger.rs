//! Safe mode triggers and risk events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Danger signal able to switch safe mode on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeModeTrigger {
    /// Consecutive scoring failures.
    AiError,
    /// Consecutive losing trades.
    ContinuousLoss,
    /// Volatility reading above the configured threshold.
    HighAtrSpike,
    /// Daily drawdown beyond the configured limit.
    DrawdownExceeded,
}

impl SafeModeTrigger {
    /// Every trigger, in config order.
    pub const ALL: [SafeModeTrigger; 4] = [
        SafeModeTrigger::AiError,
        SafeModeTrigger::ContinuousLoss,
        SafeModeTrigger::HighAtrSpike,
        SafeModeTrigger::DrawdownExceeded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SafeModeTrigger::AiError => "ai_error",
            SafeModeTrigger::ContinuousLoss => "continuous_loss",
            SafeModeTrigger::HighAtrSpike => "high_atr_spike",
            SafeModeTrigger::DrawdownExceeded => "drawdown_exceeded",
        }
    }
}

impl fmt::Display for SafeModeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why safe mode was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseCause {
    /// The cooldown deadline passed.
    Expired,
    /// An operator switched safe mode off.
    Manual,
}

impl fmt::Display for ReleaseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseCause::Expired => write!(f, "expired"),
            ReleaseCause::Manual => write!(f, "manual"),
        }
    }
}

/// State transition published by the risk controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskEvent {
    /// Safe mode switched on, or its deadline was extended.
    Tripped { reason: String, until: DateTime<Utc> },
    /// Safe mode switched off.
    Released { cause: ReleaseCause },
}
