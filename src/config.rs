use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    LoadError(#[from] ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment: "development", "test" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter passed to the tracing subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of pooled database connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 1024))]
    pub db_max_connections: u32,

    /// Minimum number of pooled database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Idle connection reap timeout in seconds
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Timeout for acquiring a connection from the pool, in seconds
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Capacity of the domain-event channel
    #[serde(default = "default_event_buffer_size")]
    #[validate(range(min = 1))]
    pub event_buffer_size: usize,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_buffer_size() -> usize {
    256
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from layered sources.
///
/// Order of precedence, lowest first: `config/default`, then
/// `config/{environment}` when present, then environment variables with
/// the `APP__` prefix (e.g. `APP__DATABASE_URL`).
pub fn load_config() -> Result<AppConfig, ConfigurationError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let builder = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let config: AppConfig = builder.build()?.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigurationError::ValidationError(e.to_string()))?;

    info!(
        environment = %config.environment,
        db_max_connections = config.db_max_connections,
        "Configuration loaded"
    );

    Ok(config)
}
