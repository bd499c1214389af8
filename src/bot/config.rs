//! Bot configuration.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::exchanges::ExchangeClient;
use crate::notification::Notifier;

/// Bot configuration options.
///
/// Collaborators left unset are built from `app_config`: the system clock,
/// the paper exchange and the configured notification channels.
pub struct BotConfig {
    /// Application configuration.
    pub app_config: Config,
    /// Application version.
    pub version: String,
    /// Exchange client orders are sent to.
    pub exchange: Option<Arc<dyn ExchangeClient>>,
    /// Time source for deadlines and day boundaries.
    pub clock: Option<Arc<dyn Clock>>,
    /// Notification sink.
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl BotConfig {
    pub fn new(app_config: Config) -> Self {
        Self {
            app_config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            exchange: None,
            clock: None,
            notifier: None,
        }
    }

    pub fn with_exchange(mut self, exchange: Arc<dyn ExchangeClient>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}
