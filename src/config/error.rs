//! Errors raised while loading the configuration. All of them abort startup.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

impl ConfigError {
    pub(crate) fn read_file(path: &str, source: io::Error) -> Self {
        Self::ReadFile {
            path: path.to_string(),
            source,
        }
    }
}
