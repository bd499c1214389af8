//! Operator notifications.

mod notifier;
mod telegram;

pub use notifier::{
    Event, EventData, EventType, MultiNotifier, NoopNotifier, NotificationError, Notifier,
    OverviewData, SafeModeData, ShutdownData, StartupData, TradeData, format_event,
};
pub use telegram::TelegramNotifier;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::NotificationConfig;

/// Builds the notifier described by the config. Falls back to
/// [`NoopNotifier`] when no channel is enabled or a channel fails to start.
pub fn from_config(config: Option<&NotificationConfig>) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(telegram) = config.and_then(|c| c.telegram.as_ref()) {
        if telegram.enabled {
            match TelegramNotifier::new(telegram) {
                Ok(notifier) => {
                    info!("Telegram notifications enabled");
                    notifiers.push(Arc::new(notifier));
                }
                Err(e) => warn!(error = %e, "Telegram notifier disabled"),
            }
        }
    }

    match notifiers.len() {
        0 => Arc::new(NoopNotifier::new()),
        1 => notifiers.remove(0),
        _ => Arc::new(MultiNotifier::new(notifiers)),
    }
}
