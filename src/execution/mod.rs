//! Order lifecycle against an exchange client.
//!
//! The [`ExecutionEngine`] gates placement on the risk controller, retries a
//! failed placement once, keeps every open order mirrored by exactly one
//! position in the capital ledger and ratchets trailing stops.

mod retry;

pub use retry::{DEFAULT_RETRY_BACKOFF, RetryPolicy};

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::capital::{CapitalError, CapitalManager};
use crate::clock::Clock;
use crate::domain::{Order, OrderProposal, OrderRequest, Position};
use crate::exchanges::ExchangeClient;
use crate::risk::RiskController;

/// Loss reported to the risk controller when placement fails twice, as a
/// fraction of the intended size.
const FAILED_PLACEMENT_PENALTY: Decimal = dec!(0.01);

/// Errors raised when the ledger and the order book disagree.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("capital ledger error: {0}")]
    Capital(#[from] CapitalError),
    #[error("order {0} has no linked position")]
    OrphanedOrder(String),
}

/// Outcome of a successful close.
#[derive(Debug, Clone)]
pub struct ClosedOrder {
    pub order: Order,
    pub exit_price: Decimal,
    pub pnl: Decimal,
}

/// ExecutionEngine drives placement, trailing and closure of orders.
pub struct ExecutionEngine {
    exchange: Arc<dyn ExchangeClient>,
    capital: Arc<CapitalManager>,
    risk: Arc<RiskController>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    orders: Mutex<Vec<Order>>,
}

impl ExecutionEngine {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        capital: Arc<CapitalManager>,
        risk: Arc<RiskController>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            exchange,
            capital,
            risk,
            clock,
            retry,
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Places an order for `proposal`.
    ///
    /// Returns `Ok(None)` without touching the ledger when trading is halted,
    /// the size is not positive, the size cap is exceeded or both placement
    /// attempts fail.
    pub async fn place_order(&self, proposal: OrderProposal) -> Result<Option<Order>, ExecutionError> {
        if !self.risk.should_trade().await {
            warn!(symbol = %proposal.symbol, "Safe mode active, order skipped");
            return Ok(None);
        }

        let size = match proposal.size {
            Some(size) => size,
            None => self.capital.default_position_size().await,
        };
        if size <= Decimal::ZERO {
            warn!(symbol = %proposal.symbol, size = %size, "Non-positive size, order skipped");
            return Ok(None);
        }

        let balance = self.capital.balance().await;
        if !self.risk.check_max_position(size, balance) {
            warn!(
                symbol = %proposal.symbol,
                size = %size,
                balance = %balance,
                "Size exceeds max position, order skipped"
            );
            return Ok(None);
        }

        let request = OrderRequest {
            symbol: proposal.symbol.clone(),
            side: proposal.side,
            size,
            price: proposal.entry_price,
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
        };

        let placed = self
            .retry
            .run(|attempt| {
                let request = &request;
                async move {
                    debug!(symbol = %request.symbol, attempt = attempt, "Creating order");
                    self.exchange.create_order(request).await
                }
            })
            .await;

        let placed = match placed {
            Ok(placed) => placed,
            Err(e) => {
                error!(
                    exchange = %self.exchange.name(),
                    symbol = %proposal.symbol,
                    error = %e,
                    "Order placement failed after retry"
                );
                self.risk.on_trade_result(-size * FAILED_PLACEMENT_PENALTY).await;
                return Ok(None);
            }
        };

        let order = Order {
            id: placed.id,
            symbol: proposal.symbol,
            side: proposal.side,
            size,
            entry_price: proposal.entry_price.unwrap_or(placed.price),
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
            trailing: proposal.trailing.unwrap_or_default(),
            opened_at: self.clock.now(),
        };

        let mut orders = self.orders.lock().await;
        self.capital
            .add_position(
                Position::new(&order.symbol, order.size, order.entry_price, order.side)
                    .with_order_id(&order.id),
            )
            .await?;
        orders.push(order.clone());

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            size = %order.size,
            entry = %order.entry_price,
            "Order placed"
        );

        Ok(Some(order))
    }

    /// Places each proposal in turn. A rejected proposal does not affect the
    /// others.
    pub async fn batch_orders(
        &self,
        proposals: Vec<OrderProposal>,
    ) -> Result<Vec<Option<Order>>, ExecutionError> {
        let mut results = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            results.push(self.place_order(proposal).await?);
        }
        Ok(results)
    }

    /// Ratchets the stop of `order_id` toward `market_price` when the
    /// trailing rule allows it. Returns whether the stop moved.
    ///
    /// The order lock is released while the exchange call is in flight. The
    /// stop is adopted afterwards only if the order is still open and the
    /// candidate still tightens it.
    pub async fn update_trailing(&self, order_id: &str, market_price: Decimal) -> bool {
        let candidate = {
            let orders = self.orders.lock().await;
            let Some(order) = orders.iter().find(|o| o.id == order_id) else {
                debug!(order_id = %order_id, "Trailing update for unknown order");
                return false;
            };
            match order.trailing_candidate(market_price) {
                Some(candidate) => candidate,
                None => return false,
            }
        };

        if let Err(e) = self.exchange.update_stop_loss(order_id, candidate).await {
            warn!(order_id = %order_id, stop = %candidate, error = %e, "Stop update failed");
            return false;
        }

        let mut orders = self.orders.lock().await;
        let Some(order) = orders.iter_mut().find(|o| o.id == order_id) else {
            debug!(order_id = %order_id, "Order closed while its stop was moving");
            return false;
        };
        if !order.tightens(candidate) {
            debug!(order_id = %order_id, stop = %candidate, "Stop already tighter, skipped");
            return false;
        }

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            old_stop = ?order.stop_loss,
            new_stop = %candidate,
            "Trailing stop moved"
        );
        order.stop_loss = Some(candidate);
        true
    }

    /// Closes `order_id` at `exit_price` together with its position and feeds
    /// the result to the risk controller. Unknown ids yield `Ok(None)`.
    pub async fn close_order(
        &self,
        order_id: &str,
        exit_price: Decimal,
    ) -> Result<Option<ClosedOrder>, ExecutionError> {
        let mut orders = self.orders.lock().await;

        let Some(index) = orders.iter().position(|o| o.id == order_id) else {
            warn!(order_id = %order_id, "Close requested for unknown order");
            return Ok(None);
        };

        let pnl = self
            .capital
            .close_by_order_id(order_id, exit_price)
            .await
            .ok_or_else(|| ExecutionError::OrphanedOrder(order_id.to_string()))?;
        let order = orders.remove(index);
        drop(orders);

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            exit = %exit_price,
            pnl = %pnl.round_dp(2),
            "Order closed"
        );

        self.risk.on_trade_result(pnl).await;
        let drawdown = self.capital.daily_drawdown().await;
        self.risk.on_drawdown(drawdown).await;

        Ok(Some(ClosedOrder {
            order,
            exit_price,
            pnl,
        }))
    }

    /// Runs a trailing update for every open order with a known price and
    /// marks the ledger. Returns the number of stops moved.
    pub async fn monitor_orders(&self, prices: &HashMap<String, Decimal>) -> usize {
        self.capital.mark_to_market(prices).await;

        let targets: Vec<(String, Decimal)> = self
            .orders
            .lock()
            .await
            .iter()
            .filter_map(|o| prices.get(&o.symbol).map(|p| (o.id.clone(), *p)))
            .collect();

        let mut moved = 0;
        for (order_id, price) in targets {
            if self.update_trailing(&order_id, price).await {
                moved += 1;
            }
        }

        if moved > 0 {
            debug!(moved = moved, "Monitor pass adjusted stops");
        }
        moved
    }

    /// Snapshot of open orders.
    pub async fn open_orders(&self) -> Vec<Order> {
        self.orders.lock().await.clone()
    }
}

#[cfg(test)]
mod tests;
