//! Centralized Configuration
//!
//! Configuration structures for the connection-management layer. Every struct
//! carries serde defaults so a partial TOML file is enough to override a single
//! value.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Negotiation limits for the peer session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for the signaling server to assign an identifier
    pub open_timeout_ms: u64,
    /// How long a data connection may take to open
    pub connect_timeout_ms: u64,
    /// How long to wait for the remote stream of a call
    pub call_timeout_ms: u64,
    /// Request reliable, ordered data channels
    pub reliable: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
            connect_timeout_ms: 15_000,
            call_timeout_ms: 30_000,
            reliable: true,
        }
    }
}

impl SessionConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Short timeouts for tests
    pub fn testing() -> Self {
        Self {
            open_timeout_ms: 500,
            connect_timeout_ms: 200,
            call_timeout_ms: 200,
            reliable: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Download Configuration
// ----------------------------------------------------------------------------

/// Where received files end up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Target directory; `None` means the platform download directory
    pub dir: Option<PathBuf>,
    /// Replace an existing file instead of picking a free name
    pub overwrite: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            overwrite: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerChatConfig {
    pub session: SessionConfig,
    pub downloads: DownloadConfig,
}

impl PeerChatConfig {
    pub fn testing() -> Self {
        Self {
            session: SessionConfig::testing(),
            downloads: DownloadConfig::default(),
        }
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.open_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Session open timeout must be greater than 0".to_string(),
            ));
        }
        if session.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }
        if session.call_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Call timeout must be greater than 0".to_string(),
            ));
        }
        if !session.reliable {
            return Err(ConfigError::Validation(
                "Chat and file transfer require reliable data channels".to_string(),
            ));
        }
        if let Some(dir) = &self.downloads.dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "Download directory must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),
    #[error("Configuration validation error: {0}")]
    Validation(String),
    #[error("Environment error: {0}")]
    Environment(String),
    #[error("File system error: {0}")]
    FileSystem(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
