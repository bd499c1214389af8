//! Bot error types.

use crate::config::ConfigError;
use crate::execution::ExecutionError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}
