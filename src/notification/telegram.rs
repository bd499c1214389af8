use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::TelegramConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;
const CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Which event types reach the chat.
#[derive(Debug, Clone, Copy)]
struct Filters {
    trades: bool,
    safe_mode: bool,
    overview: bool,
}

impl Filters {
    fn allows(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::SafeMode => self.safe_mode,
            EventType::Trade => self.trades,
            EventType::Overview => self.overview,
        }
    }
}

/// TelegramNotifier posts events through the Telegram Bot API.
///
/// `send_async` hands events to a background worker over a bounded queue;
/// a full queue drops the event.
pub struct TelegramNotifier {
    chat_id: String,
    filters: Filters,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its delivery worker. Must be called
    /// inside a tokio runtime.
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);
        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        Self::spawn_worker(
            receiver,
            http_client.clone(),
            api_url.clone(),
            config.chat_id.clone(),
        );

        Ok(Self {
            chat_id: config.chat_id.clone(),
            filters: Filters {
                trades: config.notify_trades,
                safe_mode: config.notify_safe_mode,
                overview: config.notify_overview,
            },
            http_client,
            api_url,
            sender,
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        http_client: reqwest::Client,
        api_url: String,
        chat_id: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let text = format_event(&event);
                if let Err(e) = post_message(&http_client, &api_url, &chat_id, &text).await {
                    error!(error = %e, event = %event.event_type, "Failed to send Telegram message");
                }
            }
            debug!("Telegram worker stopped");
        });
    }
}

/// Posts `text` to `chat_id`, truncated to the Telegram message limit.
async fn post_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let text = truncate(text, MAX_MESSAGE_LENGTH);
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NotificationError::new(format!(
            "Telegram API error: {} - {}",
            status, body
        )));
    }

    Ok(())
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }
        let text = format_event(event);
        post_message(&self.http_client, &self.api_url, &self.chat_id, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.filters.allows(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker a moment to drain queued messages.
        tokio::time::sleep(CLOSE_GRACE).await;
        Ok(())
    }
}
