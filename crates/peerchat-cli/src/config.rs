//! PeerChat CLI Configuration Management
//!
//! Layered configuration for the `peerchat` binary, loaded with figment in
//! priority order: env vars (`PEERCHAT_*`) > `~/.peerchat/config.toml` >
//! `./peerchat.toml` > defaults. Nested keys in env vars are separated by a
//! double underscore, e.g. `PEERCHAT_PEERCHAT__SESSION__CONNECT_TIMEOUT_MS`.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use peerchat_core::{ConfigError, PeerChatConfig};
use peerchat_harness::MockTransportConfig;

/// Local configuration file picked up from the working directory
pub const LOCAL_CONFIG_FILE: &str = "peerchat.toml";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the PeerChat CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session limits and download settings
    pub peerchat: PeerChatConfig,
    /// Terminal front end settings
    pub cli: CliConfig,
    /// Behavior of the in-memory signaling hub
    pub hub: MockTransportConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,
    /// Prompt for the interactive interface
    pub prompt: String,
    /// Chat log lines shown by `status`
    pub max_recent_messages: usize,
    /// Print the state after every interactive command
    pub show_state_after_command: bool,
    /// How long the demo waits for each step, in milliseconds
    pub step_timeout_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            prompt: "peerchat> ".to_string(),
            max_recent_messages: 10,
            show_state_after_command: false,
            step_timeout_ms: 5_000,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from all layers
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE));
        if let Ok(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }
        let figment = figment.merge(Env::prefixed("PEERCHAT_").split("__"));

        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// `~/.peerchat/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::Environment("Could not determine the home directory".to_string())
        })?;
        Ok(home.join(".peerchat").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::FileSystem(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), toml_string)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.peerchat.validate()?;

        if self.cli.prompt.trim().is_empty() {
            return Err(ConfigError::Validation("Prompt must not be empty".to_string()));
        }
        if self.cli.max_recent_messages == 0 {
            return Err(ConfigError::Validation(
                "At least one recent message must be shown".to_string(),
            ));
        }
        if self.cli.step_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Demo step timeout must be greater than 0".to_string(),
            ));
        }

        let (min, max) = self.hub.latency_range;
        if min > max {
            return Err(ConfigError::Validation(format!(
                "Hub latency range is inverted: {}..{}",
                min, max
            )));
        }
        Ok(())
    }

    /// PeerChat configuration with the download directory resolved to the
    /// platform download folder when none is set
    pub fn effective_peerchat(&self) -> PeerChatConfig {
        let mut peerchat = self.peerchat.clone();
        if peerchat.downloads.dir.is_none() {
            peerchat.downloads.dir = dirs::download_dir().map(|dir| dir.join("peerchat"));
        }
        peerchat
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let mut example = AppConfig::default();
        example.peerchat.downloads.dir = Some(PathBuf::from("/tmp/peerchat-downloads"));
        example.cli.show_state_after_command = true;
        example.hub = MockTransportConfig::lan();

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
