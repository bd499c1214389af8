//! Domain models for positions, orders, candles and strategy inputs.

mod candle;
mod order;
mod position;
mod signal;

pub use candle::Candle;
pub use order::{Order, OrderProposal, OrderRequest, OrderSide, PlacedOrder, TrailingConfig};
pub use position::Position;
pub use signal::{ScoredSignal, StrategyStats};
