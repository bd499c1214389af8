//! Exchange client capability and implementations.

mod paper;

use crate::domain::{OrderRequest, PlacedOrder};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub use paper::PaperExchange;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Symbol is not tradable on this exchange.
    #[error("symbol {0} is not supported")]
    SymbolNotSupported(String),

    /// Order not found.
    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Transport-level failure (network, timeout, connection reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// ExchangeClient is the venue capability the execution engine drives.
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submits a new order. A `None` price means a market order; the returned
    /// acknowledgement carries the price the venue filled or rested it at.
    async fn create_order(&self, request: &OrderRequest) -> Result<PlacedOrder>;

    /// Moves the protective stop of an open order.
    /// Returns `OrderNotFound` if the order is unknown to the venue.
    async fn update_stop_loss(&self, order_id: &str, stop_loss: Decimal) -> Result<()>;

    /// Unique identifier of this exchange (e.g. "paper", "binance").
    fn name(&self) -> &str;
}
