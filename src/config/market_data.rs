//! Candle buffer configuration.

use serde::Deserialize;

/// Candle buffer bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDataConfig {
    /// Ceiling of candles kept per symbol and timeframe (default: 4000).
    pub max_candles: Option<usize>,
    /// Oldest candles dropped in one sweep once the ceiling is exceeded (default: 1000).
    pub eviction_batch: Option<usize>,
}
