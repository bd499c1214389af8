//! Runtime statistics for the bot.

use rust_decimal::Decimal;

/// Runtime statistics for the bot.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub monitor_cycles: u64,
    pub signals_received: u64,
    pub scoring_failures: u64,
    pub orders_placed: u64,
    pub orders_rejected: u64,
    pub orders_closed: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub stops_adjusted: u64,
    pub total_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
}

impl Stats {
    /// Records the PnL of a closed order.
    pub fn record_close(&mut self, pnl: Decimal) {
        self.orders_closed += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
        self.total_pnl += pnl;
        self.best_trade = self.best_trade.max(pnl);
        self.worst_trade = self.worst_trade.min(pnl);
    }
}
