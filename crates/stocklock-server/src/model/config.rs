//! Configuration management for the stocklock server
//!
//! Sources, later ones winning: `conf/application.yml` (or the file given with
//! `--config`), `STOCKLOCK_*` environment variables such as
//! `STOCKLOCK_LOCK__TTL_MS`, then command line flags.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use stocklock_inventory::DEFAULT_INVENTORY_KEY;
use stocklock_lock::LockConfig;
use stocklock_lock::config::{DEFAULT_LOCK_KEY, DEFAULT_RETRY_DELAY, DEFAULT_TTL};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 7777;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_LOCK_BACKEND: &str = "redis-like-store";

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "stocklock-server", about = "Inventory service guarded by a distributed lock")]
pub struct Cli {
    /// HTTP port; run several instances on different ports against one Redis
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    #[arg(long = "redis-url")]
    pub redis_url: Option<String>,
    /// Configuration file; required to exist when given
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process arguments.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let file = cli.config_file.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
        let mut config_builder = Config::builder()
            .add_source(File::with_name(file).required(cli.config_file.is_some()))
            .add_source(
                Environment::with_prefix("stocklock")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(port) = cli.port {
            config_builder = config_builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.redis_url {
            config_builder = config_builder.set_override("redis.url", url)?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get::<u16>("server.port")
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn redis_url(&self) -> String {
        self.config
            .get_string("redis.url")
            .unwrap_or(DEFAULT_REDIS_URL.to_string())
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_backend(&self) -> String {
        self.config
            .get_string("lock.backend")
            .unwrap_or(DEFAULT_LOCK_BACKEND.to_string())
    }

    pub fn lock_config(&self) -> LockConfig {
        let millis = |key: &str| self.config.get::<u64>(key).ok().map(Duration::from_millis);

        let mut lock_config = LockConfig::new(
            self.config
                .get_string("lock.key")
                .unwrap_or(DEFAULT_LOCK_KEY.to_string()),
        )
        .with_ttl(millis("lock.ttl_ms").unwrap_or(DEFAULT_TTL))
        .with_retry_delay(millis("lock.retry_delay_ms").unwrap_or(DEFAULT_RETRY_DELAY))
        .with_retry_jitter(millis("lock.retry_jitter_ms").unwrap_or(Duration::ZERO));

        if let Some(interval) = millis("lock.renewal_ms").filter(|d| !d.is_zero()) {
            lock_config = lock_config.with_renewal(interval);
        }
        lock_config
    }

    // ========================================================================
    // Inventory Configuration
    // ========================================================================

    pub fn inventory_key(&self) -> String {
        self.config
            .get_string("inventory.key")
            .unwrap_or(DEFAULT_INVENTORY_KEY.to_string())
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// `STOCKLOCK_LOG_*` environment settings, overridden by any `logging.*`
    /// keys present in the configuration.
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::from_env();

        if let Ok(path) = self.config.get_string("logging.path") {
            logging.log_dir = path.into();
        }
        if let Ok(console) = self.config.get_bool("logging.console") {
            logging.console_output = console;
        }
        if let Ok(file) = self.config.get_bool("logging.file") {
            logging.file_logging = file;
        }
        if let Some(level) = self
            .config
            .get_string("logging.level")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            logging.console_level = level;
            logging.file_level = level;
        }
        if let Some(rotation) = self
            .config
            .get_string("logging.rotation")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            logging.rotation = rotation;
        }
        logging
    }
}
