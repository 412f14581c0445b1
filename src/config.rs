use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::collaborators::StaticCatalog;
use crate::utils::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// Configuration
// ============================================================================
//
// TOML file (path from SERVICE_ORDERS_CONFIG, default
// config/service-orders.toml). A missing file means all defaults.
// DATABASE_URL and METRICS_PORT override the file.
//
// ============================================================================

pub const CONFIG_PATH_ENV: &str = "SERVICE_ORDERS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/service-orders.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.message().to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub metrics: MetricsSettings,
    pub catalog: CatalogSettings,
    pub notifications: NotificationSettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// PostgreSQL URL. Without one the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub tax_rate: Decimal,
    /// Service key to base price (tax excluded)
    pub services: HashMap<String, Decimal>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(16, 2),
            services: HashMap::new(),
        }
    }
}

impl CatalogSettings {
    pub fn build_catalog(&self) -> StaticCatalog {
        StaticCatalog::new(self.tax_rate, self.services.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub failure_threshold: u32,
    pub open_timeout_secs: u64,
    pub success_threshold: u32,
    pub redpanda: Option<RedpandaSettings>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 30,
            success_threshold: 2,
            redpanda: None,
        }
    }
}

impl NotificationSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            success_threshold: self.success_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedpandaSettings {
    pub brokers: String,
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

impl AppConfig {
    /// Load from the configured path, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_path(Path::new(&path))?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "Loaded config file");
        Ok(toml::from_str(&raw)?)
    }

    /// `DATABASE_URL` and `METRICS_PORT` win over file values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(port) = lookup("METRICS_PORT") {
            self.metrics.port = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("METRICS_PORT is not a port: {port}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.catalog.tax_rate.is_sign_negative() {
            return Err(ConfigError::Validation("catalog.tax_rate cannot be negative".to_string()));
        }
        if let Some((key, _)) = self.catalog.services.iter().find(|(_, p)| p.is_sign_negative()) {
            return Err(ConfigError::Validation(format!(
                "catalog.services.{key} cannot be negative"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
