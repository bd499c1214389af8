//! Trading bot orchestrator.
//!
//! Wires capital, risk, execution, safe mode, market data and notifications
//! from config, runs the monitoring loop and exposes the intake API used by
//! the strategy layer.

mod config;
mod error;
mod stats;

pub use config::BotConfig;
pub use error::BotError;
pub use stats::Stats;

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capital::{CapitalManager, CapitalReport};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, non_zero_or};
use crate::domain::{Candle, Order, OrderProposal, ScoredSignal};
use crate::exchanges::{ExchangeClient, PaperExchange};
use crate::execution::{ExecutionEngine, RetryPolicy};
use crate::market_data::MarketData;
use crate::notification::{
    self, Event, Notifier, OverviewData, ShutdownData, StartupData, TradeData,
};
use crate::risk::{RiskController, RiskReport, SafeModeTrigger};
use crate::safe_mode::SafeModeSystem;

const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_MIN_CONFIDENCE: Decimal = dec!(0.7);

/// Trading bot that coordinates all components.
pub struct Bot {
    cfg: Config,
    version: String,

    capital: Arc<CapitalManager>,
    risk: Arc<RiskController>,
    engine: ExecutionEngine,
    safe_mode: Arc<SafeModeSystem>,
    market_data: MarketData,
    notifier: Arc<dyn Notifier>,
    exchange_name: String,

    min_confidence: Decimal,
    monitor_interval: Duration,
    overview_interval: Duration,

    // Runtime state
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Mutex<Stats>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    /// Creates a new Bot instance. Must be called inside a tokio runtime when
    /// Telegram notifications are configured.
    pub fn new(cfg: BotConfig) -> Result<Self, BotError> {
        let app = cfg.app_config;

        let clock: Arc<dyn Clock> = cfg.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let exchange: Arc<dyn ExchangeClient> =
            cfg.exchange.unwrap_or_else(|| Arc::new(PaperExchange::new()));
        let notifier = cfg
            .notifier
            .unwrap_or_else(|| notification::from_config(app.notification.as_ref()));

        let execution = app.execution.clone().unwrap_or_default();
        let monitor_interval = non_zero_or(execution.monitor_interval, DEFAULT_MONITOR_INTERVAL);
        let min_confidence = execution.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);

        let overview_interval = app
            .notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .map(|t| non_zero_or(t.overview_interval, DEFAULT_OVERVIEW_INTERVAL))
            .unwrap_or(DEFAULT_OVERVIEW_INTERVAL);

        let capital = Arc::new(CapitalManager::from_config(&app, clock.clone()));
        let risk = Arc::new(RiskController::new(&app.risk, clock.clone()));
        let engine = ExecutionEngine::new(
            exchange.clone(),
            capital.clone(),
            risk.clone(),
            clock.clone(),
            RetryPolicy::new(execution.retry_backoff),
        );
        let safe_mode = Arc::new(SafeModeSystem::new(
            risk.clone(),
            notifier.clone(),
            clock,
            app.safe_mode.as_ref().map(|s| s.monitor_interval).unwrap_or_default(),
        ));
        let market_data = MarketData::from_config(app.market_data.as_ref());
        let (shutdown, _) = watch::channel(false);

        Ok(Bot {
            version: cfg.version,
            exchange_name: exchange.name().to_string(),
            cfg: app,
            capital,
            risk,
            engine,
            safe_mode,
            market_data,
            notifier,
            min_confidence,
            monitor_interval,
            overview_interval,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats: Mutex::new(Stats::default()),
            shutdown,
            supervisor: Mutex::new(None),
        })
    }

    /// Loads the config file at `path` and builds a bot with default
    /// collaborators.
    pub async fn from_config_path(path: &str) -> Result<Self, BotError> {
        let config = Config::load(path)?;
        Self::new(BotConfig::new(config))
    }

    // ==================== Intake ====================

    /// Handles the scoring layer's verdict on `proposal`.
    ///
    /// A scoring failure counts toward the `ai_error` trigger. A successful
    /// score places the order when it passes with enough confidence.
    pub async fn handle_signal<E: Display>(
        &self,
        scored: Result<ScoredSignal, E>,
        proposal: OrderProposal,
    ) -> Result<Option<Order>, BotError> {
        self.stats.lock().await.signals_received += 1;

        let signal = match scored {
            Ok(signal) => signal,
            Err(e) => {
                warn!(symbol = %proposal.symbol, error = %e, "Scoring failed");
                self.stats.lock().await.scoring_failures += 1;
                self.risk.on_ai_error().await;
                return Ok(None);
            }
        };

        self.risk.on_ai_success().await;

        if !signal.pass || signal.confidence < self.min_confidence {
            debug!(
                symbol = %signal.symbol,
                pass = signal.pass,
                confidence = %signal.confidence,
                min_confidence = %self.min_confidence,
                "Signal below threshold"
            );
            return Ok(None);
        }

        self.submit(proposal).await
    }

    /// Places one order.
    pub async fn submit(&self, proposal: OrderProposal) -> Result<Option<Order>, BotError> {
        let order = self.engine.place_order(proposal).await?;
        self.record_placement(order.is_some()).await;
        Ok(order)
    }

    /// Places orders one after another.
    pub async fn submit_batch(
        &self,
        proposals: Vec<OrderProposal>,
    ) -> Result<Vec<Option<Order>>, BotError> {
        let orders = self.engine.batch_orders(proposals).await?;
        for order in &orders {
            self.record_placement(order.is_some()).await;
        }
        Ok(orders)
    }

    /// Closes an open order at `exit_price`. Returns the realized PnL, or
    /// `None` for an unknown order.
    pub async fn close(&self, order_id: &str, exit_price: Decimal) -> Result<Option<Decimal>, BotError> {
        let Some(closed) = self.engine.close_order(order_id, exit_price).await? else {
            return Ok(None);
        };

        self.stats.lock().await.record_close(closed.pnl);

        let balance = self.capital.balance().await;
        self.notifier.send_async(Event::trade(TradeData {
            order_id: closed.order.id,
            symbol: closed.order.symbol,
            side: closed.order.side,
            size: closed.order.size,
            entry_price: closed.order.entry_price,
            exit_price: closed.exit_price,
            pnl: closed.pnl,
            balance,
        }));

        Ok(Some(closed.pnl))
    }

    /// Stores a candle and evaluates the ATR trigger when a threshold is
    /// configured. Returns the trigger that fired, if any.
    pub async fn ingest_candle(
        &self,
        symbol: &str,
        timeframe: &str,
        candle: Candle,
    ) -> Option<SafeModeTrigger> {
        let close = candle.close;
        self.market_data.append_candle(symbol, timeframe, candle).await;

        let threshold = self.cfg.risk.atr_spike_threshold?;
        if close <= Decimal::ZERO {
            return None;
        }

        let atr = self
            .market_data
            .atr(symbol, timeframe, self.cfg.risk.atr_period)
            .await?;
        let ratio = atr / close;
        debug!(symbol = %symbol, timeframe = %timeframe, atr = %atr, ratio = %ratio, "ATR reading");

        self.risk.on_atr_spike(ratio, threshold).await
    }

    /// Switches safe mode on unless a trigger fired within the cooldown.
    pub async fn enable_safe_mode(&self, reason: &str) -> bool {
        self.safe_mode.enable(reason).await
    }

    /// Switches safe mode off.
    pub async fn disable_safe_mode(&self, notify: bool) -> bool {
        self.safe_mode.disable(notify).await
    }

    // ==================== Lifecycle ====================

    /// Starts the bot and runs the monitoring loop until [`Bot::stop`].
    pub async fn start(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }

        *self.started_at.lock().await = Some(Instant::now());
        self.shutdown.send_replace(false);

        let handle = self.safe_mode.spawn_monitor(self.shutdown.subscribe());
        *self.supervisor.lock().await = Some(handle);

        let initial_balance = self.capital.initial_balance().await;
        let triggers: Vec<String> = self
            .risk
            .report()
            .await
            .triggers
            .iter()
            .map(|t| t.to_string())
            .collect();

        info!(
            version = %self.version,
            app = %self.cfg.app.name,
            env = %self.cfg.app.env,
            exchange = %self.exchange_name,
            balance = %initial_balance,
            triggers = ?triggers,
            "Starting trading bot"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            exchange: self.exchange_name.clone(),
            initial_balance,
            triggers,
        }))
        .await;

        self.run_main_loop().await
    }

    /// Gracefully stops the bot.
    pub async fn stop(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping bot...");

        self.shutdown.send_replace(true);
        if let Some(handle) = self.supervisor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Safe mode monitor task failed");
            }
        }

        let uptime = self.uptime().await;

        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        if let Err(e) = self.notifier.close().await {
            debug!(error = %e, "Failed to close notifier");
        }

        info!(uptime = ?uptime, "Bot stopped");

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Ledger snapshot.
    pub async fn capital_report(&self) -> CapitalReport {
        self.capital.report().await
    }

    /// Risk counters snapshot.
    pub async fn risk_report(&self) -> RiskReport {
        self.risk.report().await
    }

    /// Open orders snapshot.
    pub async fn open_orders(&self) -> Vec<Order> {
        self.engine.open_orders().await
    }

    /// Main monitoring loop.
    async fn run_main_loop(&self) -> Result<(), BotError> {
        let mut monitor_timer = tokio::time::interval(self.monitor_interval);
        let mut overview_timer = tokio::time::interval(self.overview_interval);
        let mut shutdown = self.shutdown.subscribe();

        // Both intervals fire immediately; skip the empty first overview.
        overview_timer.tick().await;

        info!(
            monitor_interval = ?self.monitor_interval,
            overview_interval = ?self.overview_interval,
            "Starting main loop"
        );

        loop {
            tokio::select! {
                _ = monitor_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    self.monitor_cycle().await;
                }
                _ = overview_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    self.send_overview().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs one pass of trailing-stop and equity updates.
    async fn monitor_cycle(&self) {
        let cycles = {
            let mut stats = self.stats.lock().await;
            stats.monitor_cycles += 1;
            stats.monitor_cycles
        };

        let prices = self.market_data.latest_prices().await;
        let moved = self.engine.monitor_orders(&prices).await;

        if moved > 0 {
            self.stats.lock().await.stops_adjusted += moved as u64;
        }

        // Log every 60 cycles (~5 min at the default interval) at Info level
        if cycles % 60 == 1 {
            let open_orders = self.engine.open_orders().await.len();
            info!(
                cycle = cycles,
                symbols = prices.len(),
                open_orders = open_orders,
                "Monitor cycle running"
            );
        }
    }

    async fn record_placement(&self, placed: bool) {
        let mut stats = self.stats.lock().await;
        if placed {
            stats.orders_placed += 1;
        } else {
            stats.orders_rejected += 1;
        }
    }

    /// Sends a notification event and logs delivery failures.
    async fn send_notification(&self, event: Event) {
        if !self.notifier.is_enabled(event.event_type) {
            return;
        }
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Sends a periodic overview notification with current stats.
    async fn send_overview(&self) {
        let stats = self.stats().await;
        let uptime = self.uptime().await;
        let report = self.capital.report().await;
        let safe_mode = self.risk.check_safe_mode().await;

        self.send_notification(Event::overview(OverviewData {
            uptime,
            monitor_cycles: stats.monitor_cycles,
            orders_placed: stats.orders_placed,
            orders_rejected: stats.orders_rejected,
            orders_closed: stats.orders_closed,
            open_orders: report.open_positions.len(),
            balance: report.balance,
            equity: report.equity,
            total_pnl: report.total_pnl,
            safe_mode,
        }))
        .await;
    }
}

#[cfg(test)]
mod tests;
