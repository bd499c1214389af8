//! Inputs supplied by the strategy and scoring layer.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// ScoredSignal is the scoring layer's verdict on a candidate trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub symbol: String,
    /// Model confidence in [0, 1].
    pub confidence: Decimal,
    /// Whether the scorer approves the trade.
    pub pass: bool,
}

/// Historical performance used for Kelly sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Fraction of winning trades.
    pub winrate: Decimal,
    /// Average reward to risk ratio.
    pub rr: Decimal,
}

impl Default for StrategyStats {
    fn default() -> Self {
        Self {
            winrate: dec!(0.55),
            rr: dec!(2.0),
        }
    }
}
