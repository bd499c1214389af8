//! Order lifecycle entities: proposals, exchange requests and open orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Long entry.
    Buy,
    /// Short entry.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Ok(OrderSide::Buy),
            "sell" | "short" => Ok(OrderSide::Sell),
            _ => Err(format!("unknown order side: {}", s)),
        }
    }
}

/// Trailing stop settings. Percentages are fractions (0.015 = 1.5%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Favorable move from entry required before the stop starts trailing.
    #[serde(default = "default_trigger_pct")]
    pub trigger_pct: Decimal,
    /// Distance kept between the market price and the trailed stop.
    #[serde(default = "default_trail_pct")]
    pub trail_pct: Decimal,
}

fn default_trigger_pct() -> Decimal {
    dec!(0.015)
}

fn default_trail_pct() -> Decimal {
    dec!(0.004)
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_pct: default_trigger_pct(),
            trail_pct: default_trail_pct(),
        }
    }
}

impl TrailingConfig {
    /// Enabled trailing with the given trigger and trail distances.
    pub fn enabled(trigger_pct: Decimal, trail_pct: Decimal) -> Self {
        Self {
            enabled: true,
            trigger_pct,
            trail_pct,
        }
    }
}

/// Trade proposal handed over by the strategy layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProposal {
    pub symbol: String,
    pub side: OrderSide,
    /// Quote size. When absent the capital manager sizes the trade.
    pub size: Option<Decimal>,
    /// Limit price. When absent the order executes at market.
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing: Option<TrailingConfig>,
}

impl OrderProposal {
    /// Creates a market proposal with only the required fields.
    pub fn new(symbol: impl Into<String>, side: OrderSide, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size: Some(size),
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            trailing: None,
        }
    }

    pub fn with_entry_price(mut self, price: Decimal) -> Self {
        self.entry_price = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, stop: Decimal) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    pub fn with_take_profit(mut self, target: Decimal) -> Self {
        self.take_profit = Some(target);
        self
    }

    pub fn with_trailing(mut self, trailing: TrailingConfig) -> Self {
        self.trailing = Some(trailing);
        self
    }
}

/// Parameters sent to the exchange client's create-order call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Exchange acknowledgement of a created order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Identifier assigned by the exchange.
    pub id: String,
    /// Price the venue filled or rested the order at.
    pub price: Decimal,
}

/// Order represents an open order tracked by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub trailing: TrailingConfig,
    pub opened_at: DateTime<Utc>,
}

impl Order {
    /// Computes the stop the trailing rule would move to at `market_price`.
    ///
    /// Returns `None` when trailing is disabled, the trigger has not been
    /// reached, or the candidate would loosen the current stop.
    pub fn trailing_candidate(&self, market_price: Decimal) -> Option<Decimal> {
        if !self.trailing.enabled {
            return None;
        }

        let trigger = self.trailing.trigger_pct;
        let trail = self.trailing.trail_pct;

        match self.side {
            OrderSide::Buy => {
                if market_price < self.entry_price * (Decimal::ONE + trigger) {
                    return None;
                }
                let candidate = market_price * (Decimal::ONE - trail);
                self.tightens(candidate).then_some(candidate)
            }
            OrderSide::Sell => {
                if market_price > self.entry_price * (Decimal::ONE - trigger) {
                    return None;
                }
                let candidate = market_price * (Decimal::ONE + trail);
                self.tightens(candidate).then_some(candidate)
            }
        }
    }

    /// Whether `stop` sits strictly closer to the market than the current
    /// stop: higher for a buy, lower for a sell.
    pub fn tightens(&self, stop: Decimal) -> bool {
        match (self.side, self.stop_loss) {
            (_, None) => true,
            (OrderSide::Buy, Some(current)) => stop > current,
            (OrderSide::Sell, Some(current)) => stop < current,
        }
    }
}
