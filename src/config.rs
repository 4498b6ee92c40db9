//! Configuration module for azrm
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - User configuration (~/.config/azrm/azrm.toml)
//! - Project configuration (./azrm.toml)
//! - An explicit `--config` file
//! - Environment variables
//!
//! Files are merged member by member, so a project file only needs the keys
//! it changes.

use crate::arm::{CloudEnvironment, RestClient};
use crate::compare;
use crate::error::{Error, ErrorContext, Result};
use crate::redact::SensitiveString;
use crate::retry::{BackoffStrategy, PollPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// File name looked up in the user and project locations.
pub const CONFIG_FILE_NAME: &str = "azrm.toml";

/// Environment variable carrying the bearer token.
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target cloud and subscription
    pub cloud: CloudConfig,

    /// Long-running operation and delete confirmation ceilings
    pub polling: PollingConfig,

    /// HTTP transport settings
    pub http: HttpConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Target cloud settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Named cloud or `custom`
    pub environment: CloudEnvironment,

    /// Resource Manager endpoint; required for `custom`
    pub resource_manager_endpoint: Option<String>,

    /// Subscription every request is scoped to
    pub subscription_id: Option<String>,
}

/// Polling ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Wall-clock ceiling for one long-running operation
    #[serde(with = "humantime_serde")]
    pub lro_timeout: Duration,

    /// Delay between operation status probes
    #[serde(with = "humantime_serde")]
    pub lro_interval: Duration,

    /// Maximum operation status probes
    pub lro_max_attempts: u32,

    /// How the delay between status probes grows
    pub lro_backoff: BackoffStrategy,

    /// Reads issued after a delete before giving up
    pub delete_confirm_attempts: u32,

    /// Delay between delete confirmation reads
    #[serde(with = "humantime_serde")]
    pub delete_confirm_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            lro_timeout: Duration::from_secs(30 * 60),
            lro_interval: Duration::from_secs(5),
            lro_max_attempts: 360,
            lro_backoff: BackoffStrategy::Constant,
            delete_confirm_attempts: 10,
            delete_confirm_interval: Duration::from_secs(5),
        }
    }
}

/// HTTP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// User-Agent header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: format!("azrm/{}", crate::VERSION),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `-v` nor `RUST_LOG` is given
    pub level: String,

    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in Self::get_config_paths(config_path)? {
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                merged = compare::merge(&merged, &Self::read_file(&path)?);
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration file paths, lowest precedence first
    fn get_config_paths(explicit_path: Option<&Path>) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("azrm").join(CONFIG_FILE_NAME));
        }
        paths.push(PathBuf::from(CONFIG_FILE_NAME));

        if let Some(path) = explicit_path {
            if !path.exists() {
                return Err(Error::FileNotFound(path.to_path_buf()));
            }
            paths.push(path.to_path_buf());
        }

        Ok(paths)
    }

    /// Read one configuration file as an untyped tree
    fn read_file(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        Ok(value)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // AZURE_SUBSCRIPTION_ID
        if let Some(subscription) = env("AZURE_SUBSCRIPTION_ID") {
            self.cloud.subscription_id = Some(subscription);
        }

        // AZURE_CLOUD_ENVIRONMENT
        if let Some(name) = env("AZURE_CLOUD_ENVIRONMENT") {
            match name.parse() {
                Ok(environment) => self.cloud.environment = environment,
                Err(e) => warn!("Ignoring AZURE_CLOUD_ENVIRONMENT: {}", e),
            }
        }

        // AZRM_RESOURCE_MANAGER_ENDPOINT
        if let Some(endpoint) = env("AZRM_RESOURCE_MANAGER_ENDPOINT") {
            self.cloud.resource_manager_endpoint = Some(endpoint);
        }

        // AZRM_LRO_TIMEOUT_SECS
        if let Some(secs) = env("AZRM_LRO_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(n) => self.polling.lro_timeout = Duration::from_secs(n),
                Err(_) => warn!("Ignoring AZRM_LRO_TIMEOUT_SECS: not a number"),
            }
        }

        // AZRM_DELETE_CONFIRM_ATTEMPTS
        if let Some(attempts) = env("AZRM_DELETE_CONFIRM_ATTEMPTS") {
            match attempts.parse() {
                Ok(n) => self.polling.delete_confirm_attempts = n,
                Err(_) => warn!("Ignoring AZRM_DELETE_CONFIRM_ATTEMPTS: not a number"),
            }
        }
    }

    /// Ceiling for long-running operations
    pub fn polling_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.polling.lro_interval,
            max_attempts: self.polling.lro_max_attempts,
            timeout: Some(self.polling.lro_timeout),
            ..PollPolicy::default()
        }
        .with_backoff(self.polling.lro_backoff)
    }

    /// Ceiling for the post-delete absence check
    pub fn delete_confirmation(&self) -> PollPolicy {
        PollPolicy::constant(
            self.polling.delete_confirm_attempts,
            self.polling.delete_confirm_interval,
        )
    }

    /// Build the REST client for the configured cloud
    pub fn rest_client(&self, token: SensitiveString) -> Result<RestClient> {
        let endpoint = self
            .cloud
            .environment
            .resource_manager_endpoint(self.cloud.resource_manager_endpoint.as_deref())
            .map_err(|e| Error::invalid_config("cloud.resource_manager_endpoint", e))?;
        let subscription = self.cloud.subscription_id.clone().ok_or_else(|| {
            Error::invalid_config(
                "cloud.subscription_id",
                "not set (use AZURE_SUBSCRIPTION_ID or the config file)",
            )
        })?;

        RestClient::new(
            endpoint,
            subscription,
            token,
            self.http.timeout,
            &self.http.user_agent,
        )
        .map_err(|e| Error::Config(e.to_string()))
    }

    /// Bearer token supplied by the host
    pub fn access_token() -> Result<SensitiveString> {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Ok(SensitiveString::new(token)),
            _ => Err(Error::invalid_config(
                ACCESS_TOKEN_ENV,
                "no access token in the environment",
            )),
        }
    }

    /// Load from a specific file only
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let merged = compare::merge(
            &serde_json::to_value(Config::default())?,
            &Self::read_file(path.as_ref())?,
        );
        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }
}
