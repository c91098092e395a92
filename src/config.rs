//! Configuration for scoring-worker.

use crate::dispatcher::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum verifications running at once.
    #[serde(default = "default_concurrency")]
    pub worker_concurrency: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,

    /// Provider access.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Database connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Message bus connection.
    #[serde(default)]
    pub bus: BusConfig,

    /// Startup recovery.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Credit-information provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root, e.g. `https://restapi.credinform.ru`.
    #[serde(default)]
    pub base_url: String,

    /// Account name.
    #[serde(default)]
    pub username: String,

    /// Base64-encoded password.
    #[serde(default)]
    pub password: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// `apiVersion` query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// `language` request member.
    #[serde(default = "default_language")]
    pub language: String,
}

// Keeps the password out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password_set", &!self.password.is_empty())
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("api_version", &self.api_version)
            .field("language", &self.language)
            .finish()
    }
}

/// Postgres settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed credentials.
        f.debug_struct("DatabaseConfig")
            .field("url_set", &!self.url.is_empty())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// NATS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Server URL.
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Subject carrying triggers.
    #[serde(default = "default_request_subject")]
    pub request_subject: String,

    /// Subject completions are published on.
    #[serde(default = "default_completion_subject")]
    pub completion_subject: String,
}

/// Recovery sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Run the sweep at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum age in seconds of a record before it is claimed.
    #[serde(default)]
    pub stale_after_secs: u64,

    /// Wait in seconds after a failed claim.
    #[serde(default = "default_claim_retry_delay_secs")]
    pub claim_retry_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_concurrency(),
            log_level: default_log_level(),
            log_json: false,
            provider: ProviderConfig::default(),
            database: DatabaseConfig::default(),
            bus: BusConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            api_version: default_api_version(),
            language: default_language(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            request_subject: default_request_subject(),
            completion_subject: default_completion_subject(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_secs: 0,
            claim_retry_delay_secs: default_claim_retry_delay_secs(),
        }
    }
}

impl RecoveryConfig {
    /// Minimum record age as a [`Duration`].
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Claim retry delay as a [`Duration`].
    #[must_use]
    pub const fn claim_retry_delay(&self) -> Duration {
        Duration::from_secs(self.claim_retry_delay_secs)
    }
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_retry_attempts() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_api_version() -> String {
    "1.7".to_string()
}

fn default_language() -> String {
    "Russian".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/scoring".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

fn default_bus_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_request_subject() -> String {
    "verification.create".to_string()
}

fn default_completion_subject() -> String {
    "verification.completed".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_claim_retry_delay_secs() -> u64 {
    5
}

impl WorkerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// First existing file among `config.toml`, `config/config.toml` and
    /// `config.toml` in the platform config directory.
    #[must_use]
    pub fn discover() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from("config.toml"), PathBuf::from("config/config.toml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "scoring-worker") {
            candidates.push(dirs.config_dir().join("config.toml"));
        }
        candidates.into_iter().find(|path| path.is_file())
    }

    /// Check values the worker cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        let missing = |what: &str| crate::Error::Config(format!("{what} is not set"));
        if self.worker_concurrency == 0 {
            return Err(crate::Error::Config(
                "worker_concurrency must be at least 1".into(),
            ));
        }
        if self.provider.base_url.is_empty() {
            return Err(missing("provider.base_url"));
        }
        if self.provider.username.is_empty() {
            return Err(missing("provider.username"));
        }
        if self.provider.password.is_empty() {
            return Err(missing("provider.password"));
        }
        if self.database.url.is_empty() {
            return Err(missing("database.url"));
        }
        if self.bus.url.is_empty() {
            return Err(missing("bus.url"));
        }
        Ok(())
    }
}
