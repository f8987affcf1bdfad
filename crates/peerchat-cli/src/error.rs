//! Error handling for the PeerChat CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("PeerChat error: {0}")]
    PeerChat(#[from] peerchat_core::PeerChatError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] peerchat_core::ConfigError),

    #[error("UI error: {0}")]
    UI(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::UI(format!("{:#}", err))
    }
}
