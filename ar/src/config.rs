//! agentrun configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `api.base-url`
pub const API_URL_ENV: &str = "AGENTRUN_API_URL";

/// Main agentrun configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); `--log-level` wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Backend API configuration
    pub api: ApiConfig,

    /// Synthetic transport configuration (used without a backend)
    pub synthetic: SyntheticConfig,

    /// Run history configuration
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentrun.yml
        let local_config = PathBuf::from(".agentrun.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentrun/agentrun.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentrun").join("agentrun.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL; unset selects the synthetic transport
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Environment variable holding an optional bearer token
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Timeout for submission and upload requests in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Connect timeout for every request, including the event stream
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Buffered deliveries between a transport and the consumer
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "AGENTRUN_API_KEY".to_string(),
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            channel_capacity: 256,
        }
    }
}

impl ApiConfig {
    /// Effective base URL: environment override first, then config
    ///
    /// Empty values count as unset. Trailing slashes are trimmed.
    pub fn resolved_base_url(&self) -> Option<String> {
        std::env::var(API_URL_ENV)
            .ok()
            .or_else(|| self.base_url.clone())
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
    }

    /// Bearer token from the configured environment variable, if any
    pub fn get_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.trim().is_empty())
    }
}

/// Synthetic transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Lower bound of the delay before each event
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the delay before each event
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 300,
            max_delay_ms: 800,
        }
    }
}

/// Run history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Record received events to disk
    pub enabled: bool,

    /// Directory holding one subdirectory per run
    #[serde(rename = "runs-dir")]
    pub runs_dir: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/agentrun/runs on Linux)
        let runs_dir = dirs::data_dir()
            .map(|d| d.join("agentrun").join("runs"))
            .unwrap_or_else(|| PathBuf::from(".agentrun/runs"))
            .to_string_lossy()
            .into_owned();

        Self {
            enabled: true,
            runs_dir,
        }
    }
}
