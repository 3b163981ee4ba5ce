//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use expense_relay::{DrainClearPolicy, RelayConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_LOG_LEVEL: &str = "LEDGERLITE_LOG_LEVEL";
pub const ENV_APP_SOCKET: &str = "LEDGERLITE_APP_SOCKET";
pub const ENV_CLEAR_POLICY: &str = "LEDGERLITE_CLEAR_POLICY";

/// Main relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Socket of the consuming application. When set, the relay attaches a
    /// socket channel to it at startup.
    #[serde(default)]
    pub app_socket_path: Option<String>,
    #[serde(default)]
    pub relay: RelayConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            app_socket_path: None,
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `<base>/config.json` if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.relay.max_attempts == 0 {
            return Err(CoreError::Config(
                "relay.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.relay.max_retry_delay_ms < self.relay.retry_delay_ms {
            return Err(CoreError::Config(
                "relay.max_retry_delay_ms must not be below relay.retry_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// The application socket as a path, if configured.
    pub fn app_socket(&self) -> Option<PathBuf> {
        self.app_socket_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Some(socket) = lookup(ENV_APP_SOCKET) {
            self.app_socket_path = Some(socket);
        }
        if let Some(raw) = lookup(ENV_CLEAR_POLICY) {
            match raw.parse::<DrainClearPolicy>() {
                Ok(policy) => self.relay.clear_policy = policy,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring {}", ENV_CLEAR_POLICY),
            }
        }
    }
}
