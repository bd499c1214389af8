//! Tests for the bot orchestrator.

use super::*;
use crate::clock::ManualClock;
use crate::domain::{OrderSide, TrailingConfig};
use crate::notification::{EventType, NotificationError};
use chrono::{TimeZone, Utc};
use std::io::Write;
use std::sync::Mutex as StdMutex;
use tempfile::NamedTempFile;

#[derive(Default)]
struct RecordingNotifier {
    seen: StdMutex<Vec<EventType>>,
}

impl RecordingNotifier {
    fn count(&self, event_type: EventType) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == event_type)
            .count()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        self.seen.lock().unwrap().push(event.event_type);
        Ok(())
    }

    fn send_async(&self, event: Event) {
        self.seen.lock().unwrap().push(event.event_type);
    }

    fn is_enabled(&self, _event_type: EventType) -> bool {
        true
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

const YAML: &str = r#"
app:
  name: tradeguard-test
  env: test

risk:
  max_position_size_pct: "0.10"
  atr_period: 2
  atr_spike_threshold: "0.05"

execution:
  retry_backoff: 1ms
  monitor_interval: 10ms
  min_confidence: "0.7"

safe_mode:
  monitor_interval: 10ms
"#;

struct Harness {
    bot: Arc<Bot>,
    exchange: Arc<PaperExchange>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let config = Config::parse(YAML).unwrap();
    let exchange = Arc::new(PaperExchange::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));

    let bot = Bot::new(
        BotConfig::new(config)
            .with_exchange(exchange.clone())
            .with_notifier(notifier.clone())
            .with_clock(clock),
    )
    .unwrap();

    Harness {
        bot: Arc::new(bot),
        exchange,
        notifier,
    }
}

fn signal(confidence: Decimal, pass: bool) -> ScoredSignal {
    ScoredSignal {
        symbol: "BTCUSDT".to_string(),
        confidence,
        pass,
    }
}

fn proposal() -> OrderProposal {
    OrderProposal::new("BTCUSDT", OrderSide::Buy, dec!(100)).with_entry_price(dec!(100))
}

fn candle(minute: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
    Candle {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap() + chrono::Duration::minutes(minute),
        open: close,
        high,
        low,
        close,
        volume: dec!(1),
    }
}

async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ==================== Signal intake tests ====================

#[tokio::test]
async fn test_handle_signal_places_confident_pass() {
    let h = harness();

    let order = h
        .bot
        .handle_signal::<String>(Ok(signal(dec!(0.8), true)), proposal())
        .await
        .unwrap();

    assert!(order.is_some());
    assert_eq!(h.exchange.create_calls(), 1);
    assert_eq!(h.bot.stats().await.orders_placed, 1);
}

#[tokio::test]
async fn test_handle_signal_skips_low_confidence_and_rejected() {
    let h = harness();

    let low = h
        .bot
        .handle_signal::<String>(Ok(signal(dec!(0.69), true)), proposal())
        .await
        .unwrap();
    let rejected = h
        .bot
        .handle_signal::<String>(Ok(signal(dec!(0.95), false)), proposal())
        .await
        .unwrap();

    assert!(low.is_none());
    assert!(rejected.is_none());
    assert_eq!(h.exchange.create_calls(), 0);
    assert_eq!(h.bot.stats().await.signals_received, 2);
}

#[tokio::test]
async fn test_consecutive_scoring_failures_halt_trading() {
    let h = harness();

    for _ in 0..2 {
        let result = h
            .bot
            .handle_signal(Err::<ScoredSignal, _>("model timeout"), proposal())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    let report = h.bot.risk_report().await;
    assert!(report.state.safe_mode);
    assert_eq!(report.state.reason.as_deref(), Some("ai_error"));
    assert_eq!(h.bot.stats().await.scoring_failures, 2);

    let order = h
        .bot
        .handle_signal::<String>(Ok(signal(dec!(0.9), true)), proposal())
        .await
        .unwrap();
    assert!(order.is_none());
    assert_eq!(h.exchange.create_calls(), 0);
}

#[tokio::test]
async fn test_scoring_success_breaks_error_run() {
    let h = harness();

    h.bot
        .handle_signal(Err::<ScoredSignal, _>("boom"), proposal())
        .await
        .unwrap();
    h.bot
        .handle_signal::<String>(Ok(signal(dec!(0.1), true)), proposal())
        .await
        .unwrap();
    h.bot
        .handle_signal(Err::<ScoredSignal, _>("boom"), proposal())
        .await
        .unwrap();

    assert!(!h.bot.risk_report().await.state.safe_mode);
}

// ==================== Order tests ====================

#[tokio::test]
async fn test_submit_and_close_notifies_trade() {
    let h = harness();

    let order = h.bot.submit(proposal()).await.unwrap().unwrap();
    let pnl = h.bot.close(&order.id, dec!(103)).await.unwrap();

    assert_eq!(pnl, Some(dec!(300)));
    assert_eq!(h.notifier.count(EventType::Trade), 1);

    let stats = h.bot.stats().await;
    assert_eq!(stats.orders_closed, 1);
    assert_eq!(stats.winning_trades, 1);
    assert_eq!(stats.total_pnl, dec!(300));
    assert_eq!(h.bot.capital_report().await.balance, dec!(10300));
}

#[tokio::test]
async fn test_close_unknown_order() {
    let h = harness();
    assert_eq!(h.bot.close("paper-404", dec!(1)).await.unwrap(), None);
    assert_eq!(h.notifier.count(EventType::Trade), 0);
}

#[tokio::test]
async fn test_submit_batch_counts_rejections() {
    let h = harness();

    let results = h
        .bot
        .submit_batch(vec![
            proposal(),
            OrderProposal::new("ETHUSDT", OrderSide::Buy, dec!(5000)).with_entry_price(dec!(10)),
        ])
        .await
        .unwrap();

    assert!(results[0].is_some());
    assert!(results[1].is_none());
    let stats = h.bot.stats().await;
    assert_eq!(stats.orders_placed, 1);
    assert_eq!(stats.orders_rejected, 1);
    assert_eq!(h.bot.open_orders().await.len(), 1);
}

// ==================== Safe mode tests ====================

#[tokio::test]
async fn test_enable_and_disable_safe_mode() {
    let h = harness();

    assert!(h.bot.enable_safe_mode("operator").await);
    assert!(!h.bot.enable_safe_mode("operator").await);
    assert!(h.bot.submit(proposal()).await.unwrap().is_none());

    assert!(h.bot.disable_safe_mode(true).await);
    assert!(h.bot.submit(proposal()).await.unwrap().is_some());
    assert_eq!(h.notifier.count(EventType::SafeMode), 2);
}

#[tokio::test]
async fn test_atr_spike_from_candles() {
    let h = harness();

    assert_eq!(
        h.bot
            .ingest_candle("BTCUSDT", "1m", candle(0, dec!(101), dec!(99), dec!(100)))
            .await,
        None
    );
    assert_eq!(
        h.bot
            .ingest_candle("BTCUSDT", "1m", candle(1, dec!(101), dec!(99), dec!(100)))
            .await,
        None
    );
    // ranges 2 and 2 over close 100: 2% ATR
    assert_eq!(
        h.bot
            .ingest_candle("BTCUSDT", "1m", candle(2, dec!(101), dec!(99), dec!(100)))
            .await,
        None
    );
    // ranges 2 and 16 over close 100: 9% ATR
    assert_eq!(
        h.bot
            .ingest_candle("BTCUSDT", "1m", candle(3, dec!(108), dec!(92), dec!(100)))
            .await,
        Some(SafeModeTrigger::HighAtrSpike)
    );
    assert!(h.bot.risk_report().await.state.safe_mode);
}

// ==================== Lifecycle tests ====================

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn test_lifecycle_futures_are_send() {
    let h = harness();

    let start = h.bot.start();
    assert_send(&start);
    drop(start);

    let cycle = h.bot.monitor_cycle();
    assert_send(&cycle);
    cycle.await;
    assert_eq!(h.bot.stats().await.monitor_cycles, 1);
}

#[tokio::test]
async fn test_start_and_stop() {
    let h = harness();

    let runner = {
        let bot = Arc::clone(&h.bot);
        tokio::spawn(async move { bot.start().await })
    };

    let bot = Arc::clone(&h.bot);
    assert!(eventually(|| h.notifier.count(EventType::Startup) == 1).await);
    assert!(bot.is_running().await);
    assert!(matches!(bot.start().await, Err(BotError::AlreadyRunning)));

    bot.stop().await.unwrap();
    runner.await.unwrap().unwrap();

    assert!(!bot.is_running().await);
    assert_eq!(h.notifier.count(EventType::Shutdown), 1);
}

#[tokio::test]
async fn test_running_bot_trails_stops_from_candles() {
    let h = harness();

    let order = h
        .bot
        .submit(proposal().with_trailing(TrailingConfig::enabled(dec!(0.01), dec!(0.005))))
        .await
        .unwrap()
        .unwrap();
    h.bot
        .ingest_candle("BTCUSDT", "1m", candle(0, dec!(110), dec!(110), dec!(110)))
        .await;

    let runner = {
        let bot = Arc::clone(&h.bot);
        tokio::spawn(async move { bot.start().await })
    };

    let mut moved = false;
    for _ in 0..200 {
        if h.bot.stats().await.stops_adjusted > 0 {
            moved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(moved);
    assert_eq!(h.exchange.stop_loss(&order.id).await, Some(dec!(109.45)));

    h.bot.stop().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_from_config_path() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(YAML.as_bytes()).unwrap();

    let bot = Bot::from_config_path(file.path().to_str().unwrap()).await.unwrap();
    assert_eq!(bot.capital_report().await.balance, dec!(10000));
    assert!(!bot.is_running().await);
}

#[tokio::test]
async fn test_from_config_path_missing_file() {
    let result = Bot::from_config_path("does/not/exist.yaml").await;
    assert!(matches!(result, Err(BotError::Config(_))));
}
