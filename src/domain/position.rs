//! Open position held in the capital ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Position represents capital committed to one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub side: OrderSide,
    /// Order that opened this position, when it came from the execution engine.
    pub order_id: Option<String>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, size: Decimal, entry_price: Decimal, side: OrderSide) -> Self {
        Self {
            symbol: symbol.into(),
            size,
            entry_price,
            side,
            order_id: None,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// PnL of closing this position at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            OrderSide::Buy => (exit_price - self.entry_price) * self.size,
            OrderSide::Sell => (self.entry_price - exit_price) * self.size,
        }
    }
}
