//! Capital and position sizing configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMethod {
    /// Kelly criterion scaled by the risk fraction.
    #[default]
    Kelly,
    /// Flat fraction of the balance.
    Fixed,
}

/// Capital ledger and sizing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CapitalConfig {
    /// Starting balance of the ledger (quote currency).
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    /// Sizing method used when a proposal carries no size.
    #[serde(default)]
    pub position_sizing_method: SizingMethod,
    /// Default risk fraction applied when a sizing call passes none.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    /// Win rate assumed when no strategy statistics are supplied.
    pub default_winrate: Option<Decimal>,
    /// Reward/risk ratio assumed when no strategy statistics are supplied.
    pub default_rr: Option<Decimal>,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            position_sizing_method: SizingMethod::default(),
            kelly_fraction: default_kelly_fraction(),
            default_winrate: None,
            default_rr: None,
        }
    }
}

fn default_initial_balance() -> Decimal {
    dec!(10000)
}

fn default_kelly_fraction() -> Decimal {
    dec!(0.01)
}
