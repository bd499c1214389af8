//! Capital ledger, open positions and position sizing.
//!
//! The [`CapitalManager`] owns balance, equity and PnL counters together with
//! the set of open positions. All mutations go through one lock so the ledger
//! stays consistent under concurrent placement, closure and monitoring.

mod sizing;

pub use sizing::{fixed_size, kelly_fraction, kelly_size};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{CapitalConfig, Config, SizingMethod};
use crate::domain::{OrderSide, Position, StrategyStats};

/// Ledger invariant violations. These indicate a caller bug.
#[derive(Debug, Error)]
pub enum CapitalError {
    #[error("position size must be positive, got {0}")]
    InvalidSize(Decimal),
    #[error("position index {index} out of range ({len} open)")]
    PositionOutOfRange { index: usize, len: usize },
}

/// Read-only snapshot of the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct CapitalReport {
    pub balance: Decimal,
    pub equity: Decimal,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub open_positions: Vec<Position>,
}

/// Sizing parameters resolved once from config.
#[derive(Debug, Clone, Copy)]
struct Sizing {
    method: SizingMethod,
    default_risk_pct: Decimal,
    max_position_pct: Decimal,
    default_stats: StrategyStats,
}

#[derive(Debug)]
struct Ledger {
    initial_balance: Decimal,
    balance: Decimal,
    total_pnl: Decimal,
    daily_pnl: Decimal,
    current_day: Option<NaiveDate>,
    positions: Vec<Position>,
    marks: HashMap<String, Decimal>,
}

impl Ledger {
    fn apply(&mut self, realized_pnl: Decimal, day: Option<NaiveDate>) {
        if let Some(day) = day {
            if self.current_day != Some(day) {
                self.daily_pnl = Decimal::ZERO;
                self.current_day = Some(day);
            }
        }
        self.balance += realized_pnl;
        self.daily_pnl += realized_pnl;
        self.total_pnl += realized_pnl;
    }

    fn index_of(&self, order_id: &str) -> Option<usize> {
        self.positions
            .iter()
            .position(|p| p.order_id.as_deref() == Some(order_id))
    }

    /// Removes the position at `index` (must be in range) and books its PnL.
    fn close_at(&mut self, index: usize, exit_price: Decimal, today: NaiveDate) -> Decimal {
        let position = self.positions.remove(index);
        let pnl = position.pnl_at(exit_price);
        self.apply(pnl, Some(today));

        info!(
            symbol = %position.symbol,
            side = %position.side,
            exit = %exit_price,
            pnl = %pnl.round_dp(2),
            balance = %self.balance.round_dp(2),
            "Position closed"
        );
        pnl
    }

    fn equity(&self) -> Decimal {
        let unrealized: Decimal = self
            .positions
            .iter()
            .filter_map(|p| self.marks.get(&p.symbol).map(|mark| p.pnl_at(*mark)))
            .sum();
        self.balance + unrealized
    }
}

/// CapitalManager owns the balance ledger and the open-position set.
pub struct CapitalManager {
    sizing: Sizing,
    clock: Arc<dyn Clock>,
    ledger: Mutex<Ledger>,
}

impl CapitalManager {
    /// Creates a manager seeded from the capital section and the risk cap.
    pub fn new(config: &CapitalConfig, max_position_pct: Decimal, clock: Arc<dyn Clock>) -> Self {
        let defaults = StrategyStats::default();
        let sizing = Sizing {
            method: config.position_sizing_method,
            default_risk_pct: config.kelly_fraction,
            max_position_pct,
            default_stats: StrategyStats {
                winrate: config.default_winrate.unwrap_or(defaults.winrate),
                rr: config.default_rr.unwrap_or(defaults.rr),
            },
        };

        Self {
            sizing,
            clock,
            ledger: Mutex::new(Ledger {
                initial_balance: config.initial_balance,
                balance: config.initial_balance,
                total_pnl: Decimal::ZERO,
                daily_pnl: Decimal::ZERO,
                current_day: None,
                positions: Vec::new(),
                marks: HashMap::new(),
            }),
        }
    }

    /// Creates a manager from the full application config.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(&config.capital, config.risk.max_position_size_pct, clock)
    }

    /// Current balance.
    pub async fn balance(&self) -> Decimal {
        self.ledger.lock().await.balance
    }

    /// Balance the ledger started with.
    pub async fn initial_balance(&self) -> Decimal {
        self.ledger.lock().await.initial_balance
    }

    /// Kelly criterion size for the given win rate and reward/risk ratio.
    pub async fn kelly_position_size(&self, winrate: Decimal, rr: Decimal, risk_pct: Decimal) -> Decimal {
        let balance = self.balance().await;
        let size = kelly_size(balance, winrate, rr, risk_pct, self.sizing.max_position_pct);
        debug!(
            size = %size,
            kelly = %kelly_fraction(winrate, rr),
            risk_pct = %risk_pct,
            "Kelly size"
        );
        size
    }

    /// Flat fraction of the balance.
    pub async fn fixed_position_size(&self, risk_pct: Decimal) -> Decimal {
        let balance = self.balance().await;
        let size = fixed_size(balance, risk_pct, self.sizing.max_position_pct);
        debug!(size = %size, risk_pct = %risk_pct, "Fixed size");
        size
    }

    /// Sizes a trade with `method`. A missing `risk_pct` falls back to the
    /// configured kelly fraction.
    pub async fn get_position_size(
        &self,
        stats: &StrategyStats,
        method: SizingMethod,
        risk_pct: Option<Decimal>,
    ) -> Decimal {
        let risk_pct = risk_pct.unwrap_or(self.sizing.default_risk_pct);
        match method {
            SizingMethod::Kelly => self.kelly_position_size(stats.winrate, stats.rr, risk_pct).await,
            SizingMethod::Fixed => self.fixed_position_size(risk_pct).await,
        }
    }

    /// Sizes a trade with the configured method and default statistics.
    pub async fn default_position_size(&self) -> Decimal {
        let stats = self.sizing.default_stats;
        self.get_position_size(&stats, self.sizing.method, None).await
    }

    /// Opens a position.
    pub async fn add_position(&self, position: Position) -> Result<(), CapitalError> {
        if position.size <= Decimal::ZERO {
            return Err(CapitalError::InvalidSize(position.size));
        }

        info!(
            symbol = %position.symbol,
            side = %position.side,
            size = %position.size,
            entry = %position.entry_price,
            "Position opened"
        );

        self.ledger.lock().await.positions.push(position);
        Ok(())
    }

    /// Pyramiding: adds another same-direction position. Existing positions
    /// are left untouched.
    pub async fn scale_position(
        &self,
        symbol: &str,
        add_size: Decimal,
        entry_price: Decimal,
        side: OrderSide,
    ) -> Result<(), CapitalError> {
        self.add_position(Position::new(symbol, add_size, entry_price, side))
            .await?;
        info!(symbol = %symbol, side = %side, add_size = %add_size, "Position scaled");
        Ok(())
    }

    /// Closes the position at `index`, books its PnL and returns it.
    pub async fn close_position(&self, index: usize, exit_price: Decimal) -> Result<Decimal, CapitalError> {
        let today = self.clock.today();
        let mut ledger = self.ledger.lock().await;

        let len = ledger.positions.len();
        if index >= len {
            return Err(CapitalError::PositionOutOfRange { index, len });
        }

        Ok(ledger.close_at(index, exit_price, today))
    }

    /// Closes the position opened by `order_id`, looked up and removed under
    /// one ledger lock. `None` when no position is linked to the order.
    pub async fn close_by_order_id(&self, order_id: &str, exit_price: Decimal) -> Option<Decimal> {
        let today = self.clock.today();
        let mut ledger = self.ledger.lock().await;

        let index = ledger.index_of(order_id)?;
        Some(ledger.close_at(index, exit_price, today))
    }

    /// Index of the position opened by `order_id`.
    pub async fn position_index(&self, order_id: &str) -> Option<usize> {
        self.ledger
            .lock()
            .await
            .index_of(order_id)
    }

    /// Books realized PnL. Daily PnL restarts when `day` differs from the
    /// stored day.
    pub async fn update_balance(&self, realized_pnl: Decimal, day: Option<NaiveDate>) {
        let mut ledger = self.ledger.lock().await;
        ledger.apply(realized_pnl, day);
        info!(
            balance = %ledger.balance.round_dp(2),
            daily_pnl = %ledger.daily_pnl.round_dp(2),
            "Balance updated"
        );
    }

    /// Records latest prices and returns the resulting equity.
    pub async fn mark_to_market(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        let mut ledger = self.ledger.lock().await;
        for (symbol, price) in prices {
            ledger.marks.insert(symbol.clone(), *price);
        }
        ledger.equity()
    }

    /// Today's loss as a fraction of the start-of-day balance.
    pub async fn daily_drawdown(&self) -> Decimal {
        let today = self.clock.today();
        let ledger = self.ledger.lock().await;

        if ledger.current_day != Some(today) || ledger.daily_pnl >= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let start_of_day = ledger.balance - ledger.daily_pnl;
        if start_of_day <= Decimal::ZERO {
            return Decimal::ONE;
        }
        -ledger.daily_pnl / start_of_day
    }

    /// Snapshot of open positions.
    pub async fn open_positions(&self) -> Vec<Position> {
        self.ledger.lock().await.positions.clone()
    }

    /// Read-only snapshot of balance, PnLs and open positions.
    pub async fn report(&self) -> CapitalReport {
        let ledger = self.ledger.lock().await;
        CapitalReport {
            balance: ledger.balance.round_dp(2),
            equity: ledger.equity().round_dp(2),
            daily_pnl: ledger.daily_pnl.round_dp(2),
            total_pnl: ledger.total_pnl.round_dp(2),
            open_positions: ledger.positions.clone(),
        }
    }
}
