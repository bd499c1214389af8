use std::env;
use std::sync::Arc;

use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use tradeguard::bot::{Bot, BotConfig};
use tradeguard::config::Config;

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    let config_path = parse_config_path();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let bot = match Bot::new(BotConfig::new(config)) {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            std::process::exit(1);
        }
    };

    info!(config = %config_path, "Bot initialized");

    let runner = {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move { bot.start().await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    if let Err(e) = bot.stop().await {
        error!(error = %e, "Failed to stop bot");
    }

    match runner.await {
        Ok(Err(e)) => error!(error = %e, "Bot error"),
        Err(e) => error!(error = %e, "Bot task failed"),
        Ok(Ok(())) => {}
    }
}
