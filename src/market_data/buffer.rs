//! Bounded candle buffer with batched eviction.

use std::collections::VecDeque;

use crate::domain::Candle;

/// Ceiling of candles kept per symbol and timeframe.
pub const DEFAULT_MAX_CANDLES: usize = 4000;

/// Oldest candles dropped in one sweep once the ceiling is exceeded.
pub const DEFAULT_EVICTION_BATCH: usize = 1000;

/// CandleBuffer keeps candles in arrival order.
///
/// Growing past `max_candles` drops the oldest `eviction_batch` entries at
/// once, so eviction cost is paid once per batch rather than per append.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    max_candles: usize,
    eviction_batch: usize,
}

impl CandleBuffer {
    pub fn new(max_candles: usize, eviction_batch: usize) -> Self {
        Self {
            candles: VecDeque::new(),
            max_candles,
            eviction_batch,
        }
    }

    /// Appends `candle`, evicting a batch when over the ceiling. Returns the
    /// number of candles evicted.
    pub fn push(&mut self, candle: Candle) -> usize {
        self.candles.push_back(candle);
        if self.candles.len() <= self.max_candles {
            return 0;
        }
        let evict = self.eviction_batch.min(self.candles.len());
        self.candles.drain(..evict);
        evict
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Copies the buffer out, oldest first.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().cloned().collect()
    }
}

impl Default for CandleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANDLES, DEFAULT_EVICTION_BATCH)
    }
}
