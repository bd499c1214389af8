use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::OrderSide;

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Bot started
    Startup,
    /// Bot stopped
    Shutdown,
    /// Safe mode switched on or off
    SafeMode,
    /// Order closed
    Trade,
    /// Periodic stats overview
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::SafeMode => write!(f, "safe_mode"),
            EventType::Trade => write!(f, "trade"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub exchange: String,
    pub initial_balance: Decimal,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

#[derive(Debug, Clone)]
pub struct SafeModeData {
    /// True when safe mode switched on.
    pub enabled: bool,
    pub reason: String,
    /// Deadline when switched on.
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TradeData {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub monitor_cycles: u64,
    pub orders_placed: u64,
    pub orders_rejected: u64,
    pub orders_closed: u64,
    pub open_orders: usize,
    pub balance: Decimal,
    pub equity: Decimal,
    pub total_pnl: Decimal,
    pub safe_mode: bool,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Startup(StartupData),
    Shutdown(ShutdownData),
    SafeMode(SafeModeData),
    Trade(TradeData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn safe_mode(data: SafeModeData) -> Self {
        Self::new(EventType::SafeMode, EventData::SafeMode(data))
    }

    pub fn trade(data: TradeData) -> Self {
        Self::new(EventType::Trade, EventData::Trade(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Sink for operator notifications.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification and wait for the result.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queue a notification without waiting. Best effort.
    fn send_async(&self, event: Event);

    /// Whether events of this type are delivered.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flush and release resources.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Delivery failure. Never rolls back the state change being reported.
#[derive(Debug, Clone, Error)]
#[error("notification error: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// MultiNotifier fans events out to several notifiers.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// NoopNotifier drops every event.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 *Bot started*\n\n\
         Version: {}\n\
         Exchange: {}\n\
         Balance: ${}\n\
         Safe mode triggers: {}\n\n\
         ⏰ {}",
        data.version,
        data.exchange,
        money(data.initial_balance),
        data.triggers.join(", "),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Bot stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_safe_mode(data: &SafeModeData) -> String {
    if data.enabled {
        let until = data
            .until
            .map(|t| format!("\nUntil: {}", t.format("%H:%M:%S UTC")))
            .unwrap_or_default();
        format!(
            "🚨 *Safe mode enabled*\n\n\
             Reason: {}{}\n\
             Trading is halted.\n\n\
             ⏰ {}",
            escape_markdown(&data.reason),
            until,
            Utc::now().format("%H:%M:%S UTC")
        )
    } else {
        format!(
            "🟢 *Safe mode disabled*\n\n\
             Cause: {}\n\
             Trading resumed.\n\n\
             ⏰ {}",
            escape_markdown(&data.reason),
            Utc::now().format("%H:%M:%S UTC")
        )
    }
}

pub fn format_trade(data: &TradeData) -> String {
    let icon = if data.pnl >= Decimal::ZERO { "✅" } else { "🔻" };

    format!(
        "{} *Order closed*\n\n\
         {} {} #{}\n\
         Size: {}\n\
         Entry: {} → Exit: {}\n\
         PnL: *{}*\n\
         Balance: ${}\n\n\
         ⏰ {}",
        icon,
        data.side.to_string().to_uppercase(),
        data.symbol,
        escape_markdown(&data.order_id),
        data.size,
        data.entry_price,
        data.exit_price,
        signed_money(data.pnl),
        money(data.balance),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_overview(data: &OverviewData) -> String {
    let mode = if data.safe_mode {
        "🚨 SAFE MODE"
    } else {
        "🟢 TRADING"
    };

    format!(
        "📊 *Overview* {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Monitor cycles: {}\n\n\
         📈 Orders placed: {}\n\
         🚫 Rejected: {}\n\
         ✅ Closed: {}\n\
         📂 Open: {}\n\n\
         💰 Balance: ${}\n\
         📐 Equity: ${}\n\
         Total PnL: *{}*\n\n\
         ⏰ {}",
        mode,
        format_duration(data.uptime),
        add_thousand_separators(data.monitor_cycles),
        data.orders_placed,
        data.orders_rejected,
        data.orders_closed,
        data.open_orders,
        money(data.balance),
        money(data.equity),
        signed_money(data.total_pnl),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::SafeMode(data) => format_safe_mode(data),
        EventData::Trade(data) => format_trade(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helpers ===

/// Escapes underscores for Telegram Markdown (`continuous_loss`).
fn escape_markdown(text: &str) -> String {
    text.replace('_', "\\_")
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn signed_money(value: Decimal) -> String {
    if value >= Decimal::ZERO {
        format!("+${}", money(value))
    } else {
        format!("-${}", money(-value))
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
