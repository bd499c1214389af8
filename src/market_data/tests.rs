//! Tests for market_data module.

use super::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn candle(minute: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
    Candle {
        timestamp: at(minute),
        open: close,
        high,
        low,
        close,
        volume: dec!(1),
    }
}

fn flat(minute: i64, close: Decimal) -> Candle {
    candle(minute, close, close, close)
}

// ==================== Buffer tests ====================

#[test]
fn test_buffer_evicts_one_batch_over_ceiling() {
    let mut buffer = CandleBuffer::new(10, 4);

    for i in 0..10 {
        assert_eq!(buffer.push(flat(i, dec!(1))), 0);
    }
    assert_eq!(buffer.len(), 10);

    assert_eq!(buffer.push(flat(10, dec!(1))), 4);
    assert_eq!(buffer.len(), 7);
    assert_eq!(buffer.to_vec()[0].timestamp, at(4));
    assert_eq!(buffer.last().unwrap().timestamp, at(10));
}

#[test]
fn test_buffer_defaults() {
    let mut buffer = CandleBuffer::default();
    for i in 0..=DEFAULT_MAX_CANDLES as i64 {
        buffer.push(flat(i, dec!(1)));
    }
    assert_eq!(buffer.len(), DEFAULT_MAX_CANDLES + 1 - DEFAULT_EVICTION_BATCH);
}

// ==================== Store tests ====================

#[tokio::test]
async fn test_append_and_read_candles() {
    let data = MarketData::new(100, 10);

    data.append_candle("BTCUSDT", "1m", flat(0, dec!(100))).await;
    data.append_candle("BTCUSDT", "1m", flat(1, dec!(101))).await;
    data.append_candle("BTCUSDT", "5m", flat(0, dec!(99))).await;

    assert_eq!(data.candles("BTCUSDT", "1m").await.len(), 2);
    assert_eq!(data.candles("BTCUSDT", "5m").await.len(), 1);
    assert!(data.candles("ETHUSDT", "1m").await.is_empty());
}

#[tokio::test]
async fn test_latest_prices_prefers_most_recent_timeframe() {
    let data = MarketData::new(100, 10);

    data.append_candle("BTCUSDT", "1m", flat(3, dec!(103))).await;
    data.append_candle("BTCUSDT", "5m", flat(0, dec!(99))).await;
    data.append_candle("ETHUSDT", "1h", flat(0, dec!(2000))).await;

    let prices = data.latest_prices().await;
    assert_eq!(prices.len(), 2);
    assert_eq!(prices["BTCUSDT"], dec!(103));
    assert_eq!(prices["ETHUSDT"], dec!(2000));
}

#[tokio::test]
async fn test_from_config_overrides_bounds() {
    let config = MarketDataConfig {
        max_candles: Some(3),
        eviction_batch: Some(2),
    };
    let data = MarketData::from_config(Some(&config));

    for i in 0..4 {
        data.append_candle("BTCUSDT", "1m", flat(i, dec!(1))).await;
    }
    assert_eq!(data.candles("BTCUSDT", "1m").await.len(), 2);
}

// ==================== ATR tests ====================

#[test]
fn test_atr_needs_period_plus_one() {
    let candles = vec![flat(0, dec!(100)), flat(1, dec!(100))];
    assert!(average_true_range(&candles, 2).is_none());
    assert!(average_true_range(&candles, 0).is_none());
    assert_eq!(average_true_range(&candles, 1), Some(Decimal::ZERO));
}

#[test]
fn test_atr_uses_previous_close() {
    let candles = vec![
        candle(0, dec!(105), dec!(95), dec!(100)),
        // gap up: high - prev close dominates
        candle(1, dec!(112), dec!(108), dec!(110)),
        candle(2, dec!(113), dec!(107), dec!(109)),
    ];

    // ranges 12 and 6
    assert_eq!(average_true_range(&candles, 2), Some(dec!(9)));
}

#[tokio::test]
async fn test_store_atr_over_last_window() {
    let data = MarketData::new(100, 10);
    data.append_candle("BTCUSDT", "1m", candle(0, dec!(150), dec!(50), dec!(100))).await;
    data.append_candle("BTCUSDT", "1m", candle(1, dec!(102), dec!(98), dec!(100))).await;
    data.append_candle("BTCUSDT", "1m", candle(2, dec!(101), dec!(99), dec!(100))).await;

    // first candle's wide range sits outside the window
    assert_eq!(data.atr("BTCUSDT", "1m", 2).await, Some(dec!(3)));
}
