//! Configuration loading for the docdesk client
//!
//! Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing or unreadable config file is never fatal: the resolver logs a
//! warning and falls back to defaults.

use crate::models::CompanyId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DOCDESK_CONFIG";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "DOCDESK_API_URL";

/// Compiled default for the REST API root
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/";

/// What `remove_analysis` does when the server-side delete fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Local removal stands; the failure is only reported
    #[default]
    LocalFirst,
    /// Restore the removed record (and its polling)
    RollbackOnFailure,
}

/// Poll timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between fetches of an in-flight analysis
    pub interval_secs: u64,
    /// Lifetime ceiling of one polling loop
    pub max_duration_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            max_duration_secs: 300,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (e.g. "info", "docdesk_admin=debug")
    pub level: String,
    /// Optional log file; stderr when absent
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// TOML configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// REST API root; relative endpoint paths are joined onto it
    pub api_base_url: String,
    /// Per-request timeout for gateway calls
    pub request_timeout_secs: u64,
    /// Restrict document listing to one company
    pub company_id: Option<CompanyId>,
    pub removal_policy: RemovalPolicy,
    /// Buffered notifications per subscriber before lagging
    pub event_capacity: usize,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 30,
            company_id: None,
            removal_policy: RemovalPolicy::default(),
            event_capacity: 100,
            polling: PollingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "api_base_url must start with http:// or https://, got {:?}",
                self.api_base_url
            )));
        }
        if self.polling.interval_secs == 0 {
            return Err(Error::Config(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.polling.max_duration_secs < self.polling.interval_secs {
            return Err(Error::Config(format!(
                "polling.max_duration_secs ({}) must be at least polling.interval_secs ({})",
                self.polling.max_duration_secs, self.polling.interval_secs
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Default config file location: `<config_dir>/docdesk/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docdesk").join("config.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
///
/// Parent directories are created as needed.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    debug!(path = %path.display(), "Wrote config file");
    Ok(())
}

/// Resolves the effective configuration from all sources
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
    cli_api_url: Option<String>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self {
            cli_path,
            cli_api_url: None,
        }
    }

    /// API URL given on the command line; beats every other source
    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.cli_api_url = api_url;
        self
    }

    /// Config file to read, by priority
    pub fn config_path(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: platform config directory
        default_config_path()
    }

    /// Produce the effective configuration
    ///
    /// Never fails: unreadable or invalid files degrade to defaults with a
    /// warning, and an invalid API URL override is ignored the same way.
    pub fn resolve(&self) -> TomlConfig {
        let mut config = match self.config_path() {
            Some(path) if path.exists() => match load_toml_config(&path) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        info!(path = %path.display(), "Loaded configuration");
                        config
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Invalid configuration, using defaults");
                        TomlConfig::default()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read configuration, using defaults");
                    TomlConfig::default()
                }
            },
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                TomlConfig::default()
            }
            None => {
                warn!("No config directory available, using defaults");
                TomlConfig::default()
            }
        };

        let url_override = self
            .cli_api_url
            .clone()
            .or_else(|| std::env::var(API_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty());

        if let Some(url) = url_override {
            let previous = std::mem::replace(&mut config.api_base_url, url);
            if let Err(e) = config.validate() {
                warn!(error = %e, "Ignoring API URL override");
                config.api_base_url = previous;
            }
        }

        config
    }
}
