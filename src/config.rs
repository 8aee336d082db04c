//! Configuration types for the reminder host.

use crate::error::{DosekeeperError, Result};
use crate::model::timezone::DEFAULT_TIMEZONE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DosekeeperConfig {
    /// Poller cadence and concurrency.
    pub poller: PollerConfig,
    /// Commit behaviour.
    pub commit: CommitConfig,
    /// Per-user defaults.
    pub users: UsersConfig,
    /// Profile store location.
    pub store: StoreConfig,
    /// Outbound message channel.
    pub channel: ChannelConfig,
    /// Conversational session state.
    pub session: SessionConfig,
    /// Log filtering and optional file output.
    pub logging: LoggingConfig,
}

/// Poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between scans.
    pub tick_interval_secs: u64,
    /// Users processed in parallel within one tick.
    pub max_concurrent_users: usize,
    /// Deadline for each channel call made while polling a user.
    ///
    /// A send that misses it leaves the reminder undelivered for the next
    /// tick; the ledger write that follows is never cut short.
    pub user_timeout_secs: u64,
    /// Doses scheduled up to this many minutes ago still match.
    ///
    /// `0` keeps exact same-minute matching.
    pub catch_up_minutes: u32,
    /// Tick reports kept in memory.
    pub history_limit: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_concurrent_users: 8,
            user_timeout_secs: 30,
            catch_up_minutes: 0,
            history_limit: 100,
        }
    }
}

/// Commit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// How far a "delayed" dose is pushed back, in minutes.
    pub delay_minutes: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self { delay_minutes: 180 }
    }
}

impl CommitConfig {
    pub fn delay(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.delay_minutes))
    }
}

/// Per-user defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    /// Zone used for users without a valid stored zone.
    pub default_timezone: String,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            default_timezone: DEFAULT_TIMEZONE.to_owned(),
        }
    }
}

/// Profile store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document holding every user.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("users.json"),
        }
    }
}

/// Outbound channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Base URL of the delivery webhook. `None` runs without delivery.
    pub webhook_url: Option<String>,
    /// Bearer token sent with every webhook call.
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for daily-rolling log files. Stderr only when `None`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            directory: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("dosekeeper"))
        .unwrap_or_else(|| PathBuf::from("/tmp/dosekeeper"))
}

impl DosekeeperConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DosekeeperError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DosekeeperError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/dosekeeper/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("dosekeeper").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("dosekeeper")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/dosekeeper-config/config.toml")
        }
    }

    /// Check values that would make the host misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`DosekeeperError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.poller.tick_interval_secs == 0 {
            return Err(DosekeeperError::Config(
                "poller.tick_interval_secs must be positive".to_owned(),
            ));
        }
        if self.poller.max_concurrent_users == 0 {
            return Err(DosekeeperError::Config(
                "poller.max_concurrent_users must be positive".to_owned(),
            ));
        }
        if self.poller.user_timeout_secs == 0 {
            return Err(DosekeeperError::Config(
                "poller.user_timeout_secs must be positive".to_owned(),
            ));
        }
        crate::model::UserTimezone::parse(&self.users.default_timezone)
            .map_err(|e| DosekeeperError::Config(format!("users.default_timezone: {e}")))?;
        Ok(())
    }
}
