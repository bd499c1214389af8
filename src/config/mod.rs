//! Configuration loading and validation.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for notification credentials.

mod app;
mod capital;
mod duration;
mod error;
mod execution;
mod market_data;
mod notification;
mod risk;
mod safe_mode;

pub use app::AppConfig;
pub use capital::{CapitalConfig, SizingMethod};
pub use duration::{DurationError, non_zero_or};
pub use error::ConfigError;
pub use execution::ExecutionConfig;
pub use market_data::MarketDataConfig;
pub use notification::{NotificationConfig, TelegramConfig};
pub use risk::{MAX_SAFE_MODE_COOLDOWN_MINUTES, RiskConfig};
pub use safe_mode::SafeModeConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app.
/// Optional sections: capital, risk, execution, safe_mode, market_data, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Ledger seed and position sizing.
    #[serde(default)]
    pub capital: CapitalConfig,
    /// Risk limits and safe mode triggers.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Order placement retry and monitoring (optional).
    pub execution: Option<ExecutionConfig>,
    /// Safe mode supervisor (optional).
    pub safe_mode: Option<SafeModeConfig>,
    /// Candle buffer bounds (optional).
    pub market_data: Option<MarketDataConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let mut config = Self::parse(&content)?;

        config.load_credentials_from_env();

        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.capital.initial_balance <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "capital.initial_balance must be positive".into(),
            ));
        }

        check_fraction("capital.kelly_fraction", self.capital.kelly_fraction)?;
        if let Some(winrate) = self.capital.default_winrate {
            if winrate < Decimal::ZERO || winrate > Decimal::ONE {
                return Err(ConfigError::Validation(
                    "capital.default_winrate must be within [0, 1]".into(),
                ));
            }
        }
        if let Some(rr) = self.capital.default_rr {
            if rr <= Decimal::ZERO {
                return Err(ConfigError::Validation(
                    "capital.default_rr must be positive".into(),
                ));
            }
        }

        check_fraction("risk.max_position_size_pct", self.risk.max_position_size_pct)?;
        check_fraction("risk.max_daily_loss_pct", self.risk.max_daily_loss_pct)?;

        if self.risk.safe_mode_cooldown_minutes <= 0 {
            return Err(ConfigError::Validation(
                "risk.safe_mode_cooldown_minutes must be positive".into(),
            ));
        }
        if self.risk.safe_mode_cooldown_minutes > MAX_SAFE_MODE_COOLDOWN_MINUTES {
            return Err(ConfigError::Validation(format!(
                "risk.safe_mode_cooldown_minutes must be at most {}",
                MAX_SAFE_MODE_COOLDOWN_MINUTES
            )));
        }

        if self.risk.atr_period == 0 {
            return Err(ConfigError::Validation(
                "risk.atr_period must be positive".into(),
            ));
        }

        if let Some(threshold) = self.risk.atr_spike_threshold {
            if threshold <= Decimal::ZERO {
                return Err(ConfigError::Validation(
                    "risk.atr_spike_threshold must be positive".into(),
                ));
            }
        }

        if let Some(ref md) = self.market_data {
            let max_candles = md.max_candles.unwrap_or(crate::market_data::DEFAULT_MAX_CANDLES);
            let batch = md.eviction_batch.unwrap_or(crate::market_data::DEFAULT_EVICTION_BATCH);
            if max_candles == 0 || batch == 0 {
                return Err(ConfigError::Validation(
                    "market_data.max_candles and eviction_batch must be positive".into(),
                ));
            }
        }

        if let Some(ref exec) = self.execution {
            if let Some(conf) = exec.min_confidence {
                if conf < Decimal::ZERO || conf > Decimal::ONE {
                    return Err(ConfigError::Validation(
                        "execution.min_confidence must be within [0, 1]".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Ratios must lie in (0, 1].
fn check_fraction(name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::Validation(format!(
            "{} must be within (0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}
