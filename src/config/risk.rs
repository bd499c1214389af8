//! Risk management configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::risk::SafeModeTrigger;

/// Longest accepted safe mode cooldown (one year).
pub const MAX_SAFE_MODE_COOLDOWN_MINUTES: i64 = 365 * 24 * 60;

/// Risk limits and safe mode triggers.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum position size as a fraction of the balance (e.g. "0.04" for 4%).
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: Decimal,
    /// Daily drawdown that trips safe mode (e.g. "0.05" for 5%).
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// Triggers allowed to switch safe mode on.
    #[serde(default = "default_safe_mode_triggers")]
    pub safe_mode_triggers: Vec<SafeModeTrigger>,
    /// How long safe mode lasts once tripped.
    #[serde(default = "default_safe_mode_cooldown_minutes")]
    pub safe_mode_cooldown_minutes: i64,
    /// Number of candles averaged for the ATR reading.
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    /// ATR / close ratio above which the ATR spike trigger fires.
    pub atr_spike_threshold: Option<Decimal>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_pct: default_max_position_size_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            safe_mode_triggers: default_safe_mode_triggers(),
            safe_mode_cooldown_minutes: default_safe_mode_cooldown_minutes(),
            atr_period: default_atr_period(),
            atr_spike_threshold: None,
        }
    }
}

fn default_max_position_size_pct() -> Decimal {
    dec!(0.10)
}

fn default_max_daily_loss_pct() -> Decimal {
    dec!(0.05)
}

fn default_safe_mode_triggers() -> Vec<SafeModeTrigger> {
    SafeModeTrigger::ALL.to_vec()
}

fn default_safe_mode_cooldown_minutes() -> i64 {
    60
}

fn default_atr_period() -> usize {
    14
}
