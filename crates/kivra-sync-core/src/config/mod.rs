//! Configuration management for kivra-sync.
//!
//! This module handles loading, saving, and validating the configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/kivra-sync/config.toml` |
//! | macOS | `~/Library/Application Support/se.kivra-sync.kivra-sync/config.toml` |
//! | Windows | `%APPDATA%\kivra-sync\kivra-sync\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use kivra_sync_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Polling every {:?}", config.auth.poll_interval);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// BankID authentication settings
    pub auth: AuthConfig,
    /// Which documents to fetch
    pub sync: SyncConfig,
    /// Per-request retry settings
    pub retry: RetryConfig,
    /// Storage backend settings
    pub storage: StorageConfig,
    /// Notification channel settings
    pub notify: NotifyConfig,
    /// Web bridge settings
    pub web: WebConfig,
    /// Terminal consumer settings
    pub client: ClientConfig,
}

/// BankID authentication options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Delay between resolution polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long a challenge stays valid
    #[serde(with = "humantime_serde")]
    pub challenge_timeout: Duration,
    /// Consecutive poll failures tolerated before giving up
    pub max_poll_retries: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            challenge_timeout: Duration::from_secs(180),
            max_poll_retries: 3,
        }
    }
}

/// Document selection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fetch receipts
    pub fetch_receipts: bool,
    /// Fetch letters
    pub fetch_letters: bool,
    /// Maximum receipts per run (0 = unlimited)
    pub max_receipts: usize,
    /// Maximum letters per run (0 = unlimited)
    pub max_letters: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_receipts: true,
            fetch_letters: true,
            max_receipts: 0,
            max_letters: 0,
        }
    }
}

/// Retry options for individual remote requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Storage backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Plain directory tree
    #[default]
    Filesystem,
}

/// Storage options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use
    pub provider: StorageProvider,
    /// Root directory (defaults to the platform data directory)
    pub base_dir: Option<PathBuf>,
    /// Log what would be stored without writing anything
    pub dry_run: bool,
}

impl StorageConfig {
    /// Root directory to store documents under.
    #[must_use]
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("se", "kivra-sync", "kivra-sync").map_or_else(
                || PathBuf::from("kivra-documents"),
                |dirs| dirs.data_dir().join("documents"),
            )
        })
    }
}

/// Notification channel kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyProvider {
    /// Terminal output only
    #[default]
    Local,
    /// Push notifications through an ntfy server
    Ntfy,
}

/// Notification options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Channel to use
    pub provider: NotifyProvider,
    /// ntfy server base URL
    pub ntfy_server: String,
    /// ntfy topic (required for the ntfy provider)
    pub ntfy_topic: Option<String>,
    /// ntfy basic-auth user
    pub ntfy_user: Option<String>,
    /// ntfy basic-auth password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ntfy_password: Option<String>,
    /// Message that starts a run in listening mode
    pub trigger_message: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: NotifyProvider::Local,
            ntfy_server: "https://ntfy.sh".to_string(),
            ntfy_topic: None,
            ntfy_user: None,
            ntfy_password: None,
            trigger_message: "run now".to_string(),
        }
    }
}

/// Web bridge options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Interval between heartbeat events
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            localhost_only: false,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Reconnecting consumer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// First reconnect delay
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Cap for the reconnect delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Consecutive failures before giving up
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_retries: 10,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(&path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.notify.provider == NotifyProvider::Ntfy
            && self.notify.ntfy_topic.as_deref().is_none_or(str::is_empty)
        {
            return Err(invalid("notify.ntfy_topic", "required for the ntfy provider"));
        }
        if self.auth.poll_interval.is_zero() {
            return Err(invalid("auth.poll_interval", "must be greater than zero"));
        }
        if self.auth.challenge_timeout < self.auth.poll_interval {
            return Err(invalid(
                "auth.challenge_timeout",
                "must be at least one poll interval",
            ));
        }
        if self.web.heartbeat_interval.is_zero() {
            return Err(invalid("web.heartbeat_interval", "must be greater than zero"));
        }
        if self.client.base_delay.is_zero() || self.client.max_delay < self.client.base_delay {
            return Err(invalid(
                "client.max_delay",
                "must be at least client.base_delay, which must be non-zero",
            ));
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("se", "kivra-sync", "kivra-sync")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a duration string like "5m", "30s", "1h" or "250ms".
///
/// Returns `None` for unknown units and for values too large to represent.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs);
    }
    if let Some(hours) = s.strip_suffix('h') {
        return hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs);
    }
    None
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration format: {s}")))
    }
}
