//! In-process exchange used for paper trading and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ExchangeClient, ExchangeError, Result};
use crate::domain::{OrderRequest, PlacedOrder};

const EXCHANGE_NAME: &str = "paper";

/// PaperExchange fills every order immediately at the requested price or at
/// the last mark set through [`PaperExchange::set_price`].
///
/// Transport failures can be injected to exercise retry paths.
pub struct PaperExchange {
    next_id: AtomicU64,
    create_calls: AtomicU32,
    failing_creates: AtomicU32,
    failing_stop_updates: AtomicU32,
    marks: Mutex<HashMap<String, Decimal>>,
    stops: Mutex<HashMap<String, Decimal>>,
}

impl PaperExchange {
    /// Creates a new PaperExchange with no injected failures.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            create_calls: AtomicU32::new(0),
            failing_creates: AtomicU32::new(0),
            failing_stop_updates: AtomicU32::new(0),
            marks: Mutex::new(HashMap::new()),
            stops: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `count` create-order calls fail with a connection error.
    pub fn fail_next_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` stop updates fail with a connection error.
    pub fn fail_next_stop_updates(&self, count: u32) {
        self.failing_stop_updates.store(count, Ordering::SeqCst);
    }

    /// Sets the mark used to fill market orders on `symbol`.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.marks.lock().await.insert(symbol.to_string(), price);
    }

    /// Number of create-order calls received, failed ones included.
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Last stop recorded for `order_id`.
    pub async fn stop_loss(&self, order_id: &str) -> Option<Decimal> {
        self.stops.lock().await.get(order_id).copied()
    }

    /// Consumes one injected failure if any are pending.
    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn create_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        if Self::take_failure(&self.failing_creates) {
            return Err(ExchangeError::Connection("simulated network failure".into()));
        }

        let price = match request.price {
            Some(price) => price,
            None => self
                .marks
                .lock()
                .await
                .get(&request.symbol)
                .copied()
                .ok_or_else(|| ExchangeError::SymbolNotSupported(request.symbol.clone()))?,
        };

        let id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst));

        if let Some(stop) = request.stop_loss {
            self.stops.lock().await.insert(id.clone(), stop);
        }

        debug!(
            order_id = %id,
            symbol = %request.symbol,
            side = %request.side,
            size = %request.size,
            price = %price,
            "Paper order filled"
        );

        Ok(PlacedOrder { id, price })
    }

    async fn update_stop_loss(&self, order_id: &str, stop_loss: Decimal) -> Result<()> {
        if Self::take_failure(&self.failing_stop_updates) {
            return Err(ExchangeError::Connection("simulated network failure".into()));
        }

        let known = order_id
            .strip_prefix("paper-")
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| n < self.next_id.load(Ordering::SeqCst));
        if !known {
            return Err(ExchangeError::OrderNotFound(order_id.to_string()));
        }

        self.stops.lock().await.insert(order_id.to_string(), stop_loss);
        Ok(())
    }

    fn name(&self) -> &str {
        EXCHANGE_NAME
    }
}
