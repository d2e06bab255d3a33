//! TOML Configuration File Support
//!
//! Client configuration for talking to the backtest service, loaded from
//! `~/.config/backtest-stream/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/backtest-stream/client.toml` for the configuration
//! - `$XDG_DATA_HOME/backtest-stream/history.json` for saved runs
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! version = "v1"
//! request_timeout_secs = 30
//!
//! [stream]
//! channel_capacity = 256
//! idle_timeout_secs = 600
//!
//! [history]
//! path = "/home/me/.local/share/backtest-stream/history.json"
//! enabled = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default service base URL
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Default API version path segment
pub const DEFAULT_API_VERSION: &str = "v1";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Service base URL
    pub base_url: Option<String>,

    /// API version path segment
    pub version: Option<String>,

    /// Timeout for submission requests in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Signal channel capacity per stream
    pub channel_capacity: Option<usize>,

    /// Close a silent stream after this many seconds (0 = never)
    pub idle_timeout_secs: Option<u64>,
}

/// History section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// Path of the run history file
    pub path: Option<PathBuf>,

    /// Whether completed runs are saved
    pub enabled: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// API configuration section
    pub api: ApiToml,

    /// Stream configuration section
    pub stream: StreamToml,

    /// History configuration section
    pub history: HistoryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Stream settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    /// Signal channel capacity per stream
    pub channel_capacity: usize,
    /// Idle watchdog; `None` means a stalled stream is never closed
    pub idle_timeout: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            idle_timeout: None,
        }
    }
}

/// History settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistorySettings {
    /// Explicit history file path; `None` uses [`default_history_path`]
    pub path: Option<PathBuf>,
    /// Whether completed runs are saved
    pub enabled: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
        }
    }
}

/// Client configuration
///
/// Consolidates all configuration sources and tracks where values came
/// from. Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Service base URL
    pub api_base: String,

    /// API version path segment
    pub api_version: String,

    /// Timeout for submission requests
    pub request_timeout: Duration,

    /// Stream settings
    pub stream: StreamSettings,

    /// History settings
    pub history: HistorySettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
            stream: StreamSettings::default(),
            history: HistorySettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// History file to use, or `None` when history is disabled
    #[must_use]
    pub fn history_path(&self) -> Option<PathBuf> {
        if !self.history.enabled {
            return None;
        }
        self.history.path.clone().or_else(default_history_path)
    }

    /// Check values that would only fail later at request time
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api base url must start with http:// or https://, got '{}'",
                self.api_base
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "stream channel capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/backtest-stream/client.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("backtest-stream").join("client.toml"))
}

/// Get the default run history path
///
/// Returns `$XDG_DATA_HOME/backtest-stream/history.json`.
#[must_use]
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("backtest-stream").join("history.json"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = load_file_layer(path)?;
    apply_env_config(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Defaults plus the TOML file, without environment overrides
fn load_file_layer(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    Ok(config)
}

/// Zero seconds disables a timeout
fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref base) = toml.api.base_url {
        config.api_base = base.clone();
    }
    if let Some(ref version) = toml.api.version {
        config.api_version = version.clone();
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(capacity) = toml.stream.channel_capacity {
        config.stream.channel_capacity = capacity;
    }
    if let Some(secs) = toml.stream.idle_timeout_secs {
        config.stream.idle_timeout = optional_secs(secs);
    }

    if toml.history.path.is_some() {
        config.history.path = toml.history.path.clone();
    }
    if let Some(enabled) = toml.history.enabled {
        config.history.enabled = enabled;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base) = var("BACKTEST_API_BASE") {
        config.api_base = base;
        config.source = ConfigSource::Env;
    }
    if let Some(version) = var("BACKTEST_API_VERSION") {
        config.api_version = version;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = var("BACKTEST_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = var("BACKTEST_STREAM_IDLE_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.stream.idle_timeout = optional_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(path) = var("BACKTEST_HISTORY_PATH") {
        config.history.path = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub api_base: Option<String>,

    /// API version override
    pub api_version: Option<String>,

    /// Idle timeout override (seconds, 0 disables)
    pub idle_timeout_secs: Option<u64>,

    /// History path override
    pub history_path: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_api_base(mut self, base: String) -> Self {
        self.api_base = Some(base);
        self
    }

    /// Set API version override
    #[must_use]
    pub fn with_api_version(mut self, version: String) -> Self {
        self.api_version = Some(version);
        self
    }

    /// Set idle timeout override
    #[must_use]
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Set history path override
    #[must_use]
    pub fn with_history_path(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.api_base.is_some()
            || self.api_version.is_some()
            || self.idle_timeout_secs.is_some()
            || self.history_path.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref base) = self.api_base {
            config.api_base = base.clone();
        }
        if let Some(ref version) = self.api_version {
            config.api_version = version.clone();
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.stream.idle_timeout = optional_secs(secs);
        }
        if let Some(ref path) = self.history_path {
            config.history.path = Some(path.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.stream.channel_capacity, 256);
        assert_eq!(config.stream.idle_timeout, None);
        assert!(config.history.enabled);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("backtest-stream"));
            assert!(p.to_string_lossy().contains("client.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let toml_content = r#"
[api]
base_url = "https://backtest.example.com"
version = "v2"
request_timeout_secs = 5

[stream]
channel_capacity = 64
idle_timeout_secs = 120

[history]
path = "/tmp/history.json"
enabled = false
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_file_layer(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.api_base, "https://backtest.example.com");
        assert_eq!(config.api_version, "v2");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.stream.channel_capacity, 64);
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.history.path, Some(PathBuf::from("/tmp/history.json")));
        assert!(!config.history.enabled);
        assert_eq!(config.history_path(), None);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[api]\nversion = \"v9\"\n").unwrap();

        let config = load_file_layer(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api_version, "v9");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.stream, StreamSettings::default());
    }

    #[test]
    fn test_zero_idle_timeout_disables_watchdog() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[stream]\nidle_timeout_secs = 0\n").unwrap();

        let config = load_file_layer(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.stream.idle_timeout, None);
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[api\nbase_url = ").unwrap();

        let result = load_file_layer(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_file_layer(Some(PathBuf::from("/nonexistent/backtest/client.toml"))).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ClientConfig::default();
        apply_toml_config(
            &mut config,
            &ClientToml {
                api: ApiToml {
                    base_url: Some("http://file:1".to_string()),
                    ..ApiToml::default()
                },
                ..ClientToml::default()
            },
        );

        apply_env_config(
            &mut config,
            env_from(&[
                ("BACKTEST_API_BASE", "http://env:2"),
                ("BACKTEST_REQUEST_TIMEOUT", "7"),
                ("BACKTEST_STREAM_IDLE_TIMEOUT", "90"),
                ("BACKTEST_HISTORY_PATH", "/var/tmp/h.json"),
            ]),
        );

        assert_eq!(config.api_base, "http://env:2");
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.history_path(), Some(PathBuf::from("/var/tmp/h.json")));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_ignores_unparsable_numbers() {
        let mut config = ClientConfig::default();
        apply_env_config(&mut config, env_from(&[("BACKTEST_REQUEST_TIMEOUT", "soon")]));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new()
            .with_api_base("http://cli:3".to_string())
            .with_api_version("v4".to_string())
            .with_idle_timeout_secs(15)
            .apply(&mut config);

        assert_eq!(config.api_base, "http://cli:3");
        assert_eq!(config.api_version, "v4");
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig::default();
        config.api_base = "localhost:8000".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = ClientConfig::default();
        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
