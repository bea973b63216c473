//! Main application configuration
//!
//! This module defines the primary configuration structures for the courtside
//! service, including TOML and environment variable loading and validation.

use crate::config::rating::RatingConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matches: MatchSettings,
    pub rating: RatingConfig,
    pub amqp: AmqpSettings,
    pub store: StoreSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Match lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Largest participant count accepted at creation
    pub max_participant_count: u32,
    /// Send result notifications when a match finishes
    pub notify_on_finish: bool,
}

/// AMQP settings for result notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpSettings {
    /// Publish notifications to a broker instead of the log
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Topic exchange receiving match result notifications
    pub exchange: String,
    /// Maximum retry attempts for failed operations
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
}

/// Which persistence backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Connection string, required for the postgres backend
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "courtside".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            max_participant_count: 30,
            notify_on_finish: true,
        }
    }
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange: "courtside.notifications".to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("COURTSIDE_SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("COURTSIDE_LOG_LEVEL") {
            self.service.log_level = log_level;
        }

        // Match settings
        if let Some(max) = parse_env("COURTSIDE_MAX_PARTICIPANT_COUNT")? {
            self.matches.max_participant_count = max;
        }
        if let Some(notify) = parse_env("COURTSIDE_NOTIFY_ON_FINISH")? {
            self.matches.notify_on_finish = notify;
        }

        // Rating settings
        if let Some(k) = parse_env("COURTSIDE_K_FACTOR")? {
            self.rating.k_factor = k;
        }
        if let Some(initial) = parse_env("COURTSIDE_INITIAL_RATING")? {
            self.rating.initial_rating = initial;
        }

        // AMQP settings
        if let Some(enabled) = parse_env("COURTSIDE_AMQP_ENABLED")? {
            self.amqp.enabled = enabled;
        }
        if let Ok(host) = env::var("COURTSIDE_AMQP_HOST") {
            self.amqp.host = host;
        }
        if let Some(port) = parse_env("COURTSIDE_AMQP_PORT")? {
            self.amqp.port = port;
        }
        if let Ok(username) = env::var("COURTSIDE_AMQP_USERNAME") {
            self.amqp.username = username;
        }
        if let Ok(password) = env::var("COURTSIDE_AMQP_PASSWORD") {
            self.amqp.password = password;
        }
        if let Ok(vhost) = env::var("COURTSIDE_AMQP_VHOST") {
            self.amqp.vhost = vhost;
        }
        if let Ok(exchange) = env::var("COURTSIDE_AMQP_EXCHANGE") {
            self.amqp.exchange = exchange;
        }
        if let Some(retries) = parse_env("COURTSIDE_AMQP_MAX_RETRIES")? {
            self.amqp.max_retries = retries;
        }
        if let Some(delay) = parse_env("COURTSIDE_AMQP_RETRY_DELAY_MS")? {
            self.amqp.retry_delay_ms = delay;
        }

        // Store settings
        if let Ok(backend) = env::var("COURTSIDE_STORE_BACKEND") {
            self.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "postgres" => StoreBackend::Postgres,
                _ => return Err(anyhow!("Invalid COURTSIDE_STORE_BACKEND value: {}", backend)),
            };
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.store.database_url = Some(url);
        }
        if let Some(max) = parse_env("COURTSIDE_DB_MAX_CONNECTIONS")? {
            self.store.max_connections = max;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", key, value)),
        Err(_) => Ok(None),
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate match settings
    let max = config.matches.max_participant_count;
    if max < 2 || max % 2 != 0 {
        return Err(anyhow!(
            "Max participant count must be even and at least 2, got {}",
            max
        ));
    }

    // Validate rating settings
    if !(config.rating.k_factor > 0.0) {
        return Err(anyhow!("K factor must be positive"));
    }

    // Validate AMQP settings
    if config.amqp.enabled {
        if config.amqp.host.is_empty() {
            return Err(anyhow!("AMQP host cannot be empty"));
        }
        if config.amqp.exchange.is_empty() {
            return Err(anyhow!("AMQP exchange name cannot be empty"));
        }
    }

    // Validate store settings
    if config.store.backend == StoreBackend::Postgres {
        if config.store.database_url.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("Postgres backend requires a database url"));
        }
        if config.store.max_connections == 0 {
            return Err(anyhow!("Max connections must be greater than 0"));
        }
    }

    Ok(())
}
