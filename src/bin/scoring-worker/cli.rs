//! Command-line interface definition.

use clap::Parser;
use scoring_worker::config::WorkerConfig;
use std::path::PathBuf;

/// Company verification worker for the Credinform provider.
#[derive(Parser, Debug)]
#[command(name = "scoring-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Provider API root.
    #[arg(long, env = "SCORING_PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Provider account name.
    #[arg(long, env = "SCORING_PROVIDER_USERNAME")]
    pub provider_username: Option<String>,

    /// Provider password, base64-encoded.
    #[arg(long, env = "SCORING_PROVIDER_PASSWORD", hide_env_values = true)]
    pub provider_password: Option<String>,

    /// Postgres connection URL.
    #[arg(long, env = "SCORING_DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// NATS server URL.
    #[arg(long, env = "SCORING_NATS_URL")]
    pub nats_url: Option<String>,

    /// Maximum verifications running at once.
    #[arg(long, short = 'j', env = "SCORING_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Skip the startup recovery sweep.
    #[arg(long)]
    pub no_recovery: bool,

    /// Log level.
    #[arg(long, env = "SCORING_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "SCORING_LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// Convert CLI arguments into a `WorkerConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified or discovered but cannot
    /// be loaded.
    pub fn into_config(self) -> color_eyre::Result<WorkerConfig> {
        // Start with the file config, if any
        let mut config = match self.config.or_else(WorkerConfig::discover) {
            Some(path) => WorkerConfig::from_file(&path)?,
            None => WorkerConfig::default(),
        };

        // Override with CLI arguments
        if let Some(url) = self.provider_url {
            config.provider.base_url = url;
        }
        if let Some(username) = self.provider_username {
            config.provider.username = username;
        }
        if let Some(password) = self.provider_password {
            config.provider.password = password;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(url) = self.nats_url {
            config.bus.url = url;
        }
        if let Some(concurrency) = self.concurrency {
            config.worker_concurrency = concurrency;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.no_recovery {
            config.recovery.enabled = false;
        }
        config.log_json |= self.log_json;

        Ok(config)
    }
}
