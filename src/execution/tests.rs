//! Tests for execution module.

use super::*;
use crate::clock::ManualClock;
use crate::config::{CapitalConfig, RiskConfig};
use crate::domain::{OrderSide, TrailingConfig};
use crate::domain::PlacedOrder;
use crate::exchanges::{self, PaperExchange};
use crate::risk::SafeModeTrigger;
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tokio::sync::Notify;

struct Harness {
    exchange: Arc<PaperExchange>,
    capital: Arc<CapitalManager>,
    risk: Arc<RiskController>,
    engine: ExecutionEngine,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
    let risk_config = RiskConfig::default();

    let exchange = Arc::new(PaperExchange::new());
    let capital = Arc::new(CapitalManager::new(
        &CapitalConfig::default(),
        risk_config.max_position_size_pct,
        clock.clone(),
    ));
    let risk = Arc::new(RiskController::new(&risk_config, clock.clone()));
    let engine = ExecutionEngine::new(
        exchange.clone(),
        capital.clone(),
        risk.clone(),
        clock,
        RetryPolicy::new(Duration::from_millis(1)),
    );

    Harness {
        exchange,
        capital,
        risk,
        engine,
    }
}

/// Paper venue whose stop updates park until released.
struct GatedStops {
    inner: PaperExchange,
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl ExchangeClient for GatedStops {
    async fn create_order(&self, request: &OrderRequest) -> exchanges::Result<PlacedOrder> {
        self.inner.create_order(request).await
    }

    async fn update_stop_loss(&self, order_id: &str, stop_loss: Decimal) -> exchanges::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.update_stop_loss(order_id, stop_loss).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

fn limit(symbol: &str, side: OrderSide, size: Decimal, price: Decimal) -> OrderProposal {
    OrderProposal::new(symbol, side, size).with_entry_price(price)
}

// ==================== Placement tests ====================

#[tokio::test]
async fn test_place_order_registers_position() {
    let h = harness();

    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000)).with_stop_loss(dec!(29500)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(order.id, "paper-1");
    assert_eq!(order.entry_price, dec!(30000));
    assert!(!order.trailing.enabled);

    let positions = h.capital.open_positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].order_id.as_deref(), Some("paper-1"));
    assert_eq!(positions[0].size, dec!(100));
    assert_eq!(positions[0].side, OrderSide::Buy);
    assert_eq!(h.engine.open_orders().await.len(), 1);
}

#[tokio::test]
async fn test_market_order_uses_venue_price() {
    let h = harness();
    h.exchange.set_price("ETHUSDT", dec!(2050)).await;

    let order = h
        .engine
        .place_order(OrderProposal::new("ETHUSDT", OrderSide::Sell, dec!(50)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(order.entry_price, dec!(2050));
}

#[tokio::test]
async fn test_place_order_without_size_uses_default_sizing() {
    let h = harness();
    let mut proposal = limit("BTCUSDT", OrderSide::Buy, Decimal::ZERO, dec!(30000));
    proposal.size = None;

    let order = h.engine.place_order(proposal).await.unwrap().unwrap();
    assert_eq!(order.size, dec!(32.50));
}

#[tokio::test]
async fn test_place_order_in_safe_mode_is_rejected() {
    let h = harness();
    h.risk.trigger_safe_mode("test").await;

    let result = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000)))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.exchange.create_calls(), 0);
    assert!(h.capital.open_positions().await.is_empty());
    assert_eq!(h.capital.balance().await, dec!(10000));
}

#[tokio::test]
async fn test_place_order_over_max_position_is_rejected() {
    let h = harness();

    let result = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(1000.01), dec!(30000)))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.exchange.create_calls(), 0);
}

#[tokio::test]
async fn test_place_order_non_positive_size_is_rejected() {
    let h = harness();

    let result = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(-5), dec!(30000)))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.exchange.create_calls(), 0);
}

// ==================== Retry tests ====================

#[tokio::test]
async fn test_fail_once_retries_exactly_once() {
    let h = harness();
    h.exchange.fail_next_creates(1);

    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000)))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.exchange.create_calls(), 2);
    assert_eq!(order.id, "paper-1");
    assert_eq!(h.capital.open_positions().await.len(), 1);
    assert_eq!(h.risk.report().await.state.loss_streak, 0);
}

#[tokio::test]
async fn test_double_failure_reports_penalty_to_risk_only() {
    let h = harness();
    h.exchange.fail_next_creates(2);

    let result = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000)))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.exchange.create_calls(), 2);
    assert!(h.capital.open_positions().await.is_empty());
    assert_eq!(h.capital.balance().await, dec!(10000));
    assert_eq!(h.risk.report().await.state.loss_streak, 1);
}

#[tokio::test]
async fn test_repeated_placement_failures_trip_safe_mode() {
    let h = harness();

    for _ in 0..3 {
        h.exchange.fail_next_creates(2);
        let result = h
            .engine
            .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000)))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    assert!(!h.risk.should_trade().await);
}

// ==================== Trailing tests ====================

#[tokio::test]
async fn test_trailing_ratchets_and_reaches_exchange() {
    let h = harness();
    let order = h
        .engine
        .place_order(
            limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000))
                .with_stop_loss(dec!(29500))
                .with_trailing(TrailingConfig::enabled(dec!(0.015), dec!(0.004))),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(!h.engine.update_trailing(&order.id, dec!(30400)).await);
    assert!(h.engine.update_trailing(&order.id, dec!(30450)).await);

    let open = h.engine.open_orders().await;
    assert_eq!(open[0].stop_loss, Some(dec!(30328.2)));
    assert_eq!(h.exchange.stop_loss(&order.id).await, Some(dec!(30328.2)));

    // same candidate again is not an improvement
    assert!(!h.engine.update_trailing(&order.id, dec!(30450)).await);
}

#[tokio::test]
async fn test_failed_stop_update_leaves_stop_unchanged() {
    let h = harness();
    let order = h
        .engine
        .place_order(
            limit("BTCUSDT", OrderSide::Sell, dec!(100), dec!(30000))
                .with_stop_loss(dec!(30500))
                .with_trailing(TrailingConfig::enabled(dec!(0.015), dec!(0.004))),
        )
        .await
        .unwrap()
        .unwrap();

    h.exchange.fail_next_stop_updates(1);
    assert!(!h.engine.update_trailing(&order.id, dec!(29000)).await);
    assert_eq!(h.engine.open_orders().await[0].stop_loss, Some(dec!(30500)));

    assert!(h.engine.update_trailing(&order.id, dec!(29000)).await);
    assert_eq!(h.engine.open_orders().await[0].stop_loss, Some(dec!(29116)));
}

#[tokio::test]
async fn test_close_not_blocked_by_inflight_stop_update() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
    let risk_config = RiskConfig::default();
    let exchange = Arc::new(GatedStops {
        inner: PaperExchange::new(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let capital = Arc::new(CapitalManager::new(
        &CapitalConfig::default(),
        risk_config.max_position_size_pct,
        clock.clone(),
    ));
    let risk = Arc::new(RiskController::new(&risk_config, clock.clone()));
    let engine = Arc::new(ExecutionEngine::new(
        exchange.clone(),
        capital.clone(),
        risk,
        clock,
        RetryPolicy::new(Duration::from_millis(1)),
    ));

    let order = engine
        .place_order(
            limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(30000))
                .with_stop_loss(dec!(29500))
                .with_trailing(TrailingConfig::enabled(dec!(0.015), dec!(0.004))),
        )
        .await
        .unwrap()
        .unwrap();

    let trailing = {
        let engine = Arc::clone(&engine);
        let id = order.id.clone();
        tokio::spawn(async move { engine.update_trailing(&id, dec!(30450)).await })
    };
    exchange.entered.notified().await;

    let closed = tokio::time::timeout(Duration::from_secs(1), engine.close_order(&order.id, dec!(30450)))
        .await
        .expect("close waited on the stop update")
        .unwrap()
        .unwrap();
    assert_eq!(closed.pnl, dec!(45000));

    exchange.release.notify_one();
    // order is gone by the time the venue answers
    assert!(!trailing.await.unwrap());
    assert!(engine.open_orders().await.is_empty());
    assert!(capital.open_positions().await.is_empty());
}

#[tokio::test]
async fn test_trailing_unknown_order_is_noop() {
    let h = harness();
    assert!(!h.engine.update_trailing("paper-99", dec!(1)).await);
}

#[tokio::test]
async fn test_monitor_orders_counts_adjustments() {
    let h = harness();
    let trailing = TrailingConfig::enabled(dec!(0.01), dec!(0.005));

    h.engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(100)).with_trailing(trailing))
        .await
        .unwrap();
    h.engine
        .place_order(limit("ETHUSDT", OrderSide::Buy, dec!(100), dec!(100)).with_trailing(trailing))
        .await
        .unwrap();
    h.engine
        .place_order(limit("SOLUSDT", OrderSide::Buy, dec!(100), dec!(100)).with_trailing(trailing))
        .await
        .unwrap();

    let mut prices = HashMap::new();
    prices.insert("BTCUSDT".to_string(), dec!(110));
    prices.insert("ETHUSDT".to_string(), dec!(100.5));

    assert_eq!(h.engine.monitor_orders(&prices).await, 1);
    // BTC +10 and ETH +0.5 on size 100 each
    assert_eq!(h.capital.report().await.equity, dec!(11050));
}

// ==================== Close tests ====================

#[tokio::test]
async fn test_close_order_books_pnl_once() {
    let h = harness();
    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(100)))
        .await
        .unwrap()
        .unwrap();

    let closed = h.engine.close_order(&order.id, dec!(101)).await.unwrap().unwrap();
    assert_eq!(closed.pnl, dec!(100));
    assert_eq!(closed.order.id, order.id);
    assert_eq!(h.capital.balance().await, dec!(10100));
    assert!(h.engine.open_orders().await.is_empty());
    assert!(h.capital.open_positions().await.is_empty());

    let again = h.engine.close_order(&order.id, dec!(101)).await.unwrap();
    assert!(again.is_none());
    assert_eq!(h.capital.balance().await, dec!(10100));
}

#[tokio::test]
async fn test_close_sell_order_pnl() {
    let h = harness();
    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Sell, dec!(10), dec!(100)))
        .await
        .unwrap()
        .unwrap();

    let closed = h.engine.close_order(&order.id, dec!(90)).await.unwrap().unwrap();
    assert_eq!(closed.pnl, dec!(100));
}

#[tokio::test]
async fn test_close_unknown_order_returns_none() {
    let h = harness();
    assert!(h.engine.close_order("paper-42", dec!(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_close_orphaned_order_fails_loudly() {
    let h = harness();
    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(100)))
        .await
        .unwrap()
        .unwrap();

    h.capital.close_position(0, dec!(100)).await.unwrap();

    let result = h.engine.close_order(&order.id, dec!(100)).await;
    assert!(matches!(result, Err(ExecutionError::OrphanedOrder(id)) if id == order.id));
}

#[tokio::test]
async fn test_close_with_large_loss_trips_drawdown() {
    let h = harness();
    let order = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(1000), dec!(100)))
        .await
        .unwrap()
        .unwrap();

    // -0.6 * 1000 = -600, 6% of the start-of-day balance
    let closed = h.engine.close_order(&order.id, dec!(99.4)).await.unwrap().unwrap();
    assert_eq!(closed.pnl, dec!(-600));

    let report = h.risk.report().await;
    assert!(report.state.safe_mode);
    assert_eq!(report.state.reason.as_deref(), Some(SafeModeTrigger::DrawdownExceeded.as_str()));
    assert_eq!(report.state.drawdown, dec!(0.06));
}

#[tokio::test]
async fn test_three_losing_closes_halt_trading() {
    let h = harness();

    for _ in 0..3 {
        let order = h
            .engine
            .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(10), dec!(100)))
            .await
            .unwrap()
            .unwrap();
        h.engine.close_order(&order.id, dec!(99)).await.unwrap();
    }

    let result = h
        .engine
        .place_order(limit("BTCUSDT", OrderSide::Buy, dec!(10), dec!(100)))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(h.capital.balance().await, dec!(9970));
}

// ==================== Batch tests ====================

#[tokio::test]
async fn test_batch_orders_without_atomicity() {
    let h = harness();

    let results = h
        .engine
        .batch_orders(vec![
            limit("BTCUSDT", OrderSide::Buy, dec!(100), dec!(100)),
            limit("ETHUSDT", OrderSide::Buy, dec!(5000), dec!(100)),
            limit("SOLUSDT", OrderSide::Sell, dec!(50), dec!(20)),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_some());
    assert!(results[1].is_none());
    assert!(results[2].is_some());
    assert_eq!(h.capital.open_positions().await.len(), 2);
}
