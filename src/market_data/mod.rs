//! Candle storage and derived market readings.
//!
//! Feeds latest prices to order monitoring and ATR readings to the volatility
//! trigger.

mod buffer;

pub use buffer::{CandleBuffer, DEFAULT_EVICTION_BATCH, DEFAULT_MAX_CANDLES};

use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::domain::Candle;

/// MarketData holds one candle buffer per (symbol, timeframe).
pub struct MarketData {
    max_candles: usize,
    eviction_batch: usize,
    buffers: RwLock<HashMap<(String, String), CandleBuffer>>,
}

impl MarketData {
    pub fn new(max_candles: usize, eviction_batch: usize) -> Self {
        Self {
            max_candles,
            eviction_batch,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the store from the optional config section.
    pub fn from_config(config: Option<&MarketDataConfig>) -> Self {
        let max_candles = config
            .and_then(|c| c.max_candles)
            .unwrap_or(DEFAULT_MAX_CANDLES);
        let eviction_batch = config
            .and_then(|c| c.eviction_batch)
            .unwrap_or(DEFAULT_EVICTION_BATCH);
        Self::new(max_candles, eviction_batch)
    }

    /// Appends a candle to the buffer of `symbol` / `timeframe`.
    pub async fn append_candle(&self, symbol: &str, timeframe: &str, candle: Candle) {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers
            .entry((symbol.to_string(), timeframe.to_string()))
            .or_insert_with(|| CandleBuffer::new(self.max_candles, self.eviction_batch));

        let evicted = buffer.push(candle);
        if evicted > 0 {
            debug!(
                symbol = %symbol,
                timeframe = %timeframe,
                evicted = evicted,
                remaining = buffer.len(),
                "Candle buffer trimmed"
            );
        }
    }

    /// Candles of `symbol` / `timeframe`, oldest first.
    pub async fn candles(&self, symbol: &str, timeframe: &str) -> Vec<Candle> {
        self.buffers
            .read()
            .await
            .get(&(symbol.to_string(), timeframe.to_string()))
            .map(CandleBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Last close per symbol, taken from the most recent candle across
    /// timeframes.
    pub async fn latest_prices(&self) -> HashMap<String, Decimal> {
        let buffers = self.buffers.read().await;
        let mut latest: HashMap<String, &Candle> = HashMap::new();

        for ((symbol, _), buffer) in buffers.iter() {
            let Some(candle) = buffer.last() else {
                continue;
            };
            match latest.get(symbol) {
                Some(seen) if seen.timestamp >= candle.timestamp => {}
                _ => {
                    latest.insert(symbol.clone(), candle);
                }
            }
        }

        latest
            .into_iter()
            .map(|(symbol, candle)| (symbol, candle.close))
            .collect()
    }

    /// ATR of `symbol` / `timeframe` over `period` candles.
    pub async fn atr(&self, symbol: &str, timeframe: &str, period: usize) -> Option<Decimal> {
        let candles = self.candles(symbol, timeframe).await;
        average_true_range(&candles, period)
    }
}

/// Mean true range over the last `period` candles. Needs `period + 1`
/// candles so every range has a previous close.
pub fn average_true_range(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let window = &candles[candles.len() - period - 1..];
    let total: Decimal = window
        .windows(2)
        .map(|pair| pair[1].true_range(Some(pair[0].close)))
        .sum();

    Some(total / Decimal::from(period))
}

#[cfg(test)]
mod tests;
