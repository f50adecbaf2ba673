//! Gateway settings loaded from TOML.
//!
//! Every section and field is optional; missing values fall back to the
//! builder defaults. Providers are wired in code and are not part of the
//! file.
//!
//! ```toml
//! [limiter]
//! window_secs = 60
//! max_requests = 60
//! idle_timeout_secs = 300
//!
//! [cache]
//! capacity = 1000
//! default_ttl_secs = 300
//!
//! [providers]
//! timeout_ms = 3000
//!
//! [providers.circuit_breaker]
//! failure_threshold = 5
//! recovery_timeout_secs = 30
//!
//! [maintenance]
//! interval_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use crate::application::circuit_breaker::CircuitBreakerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while loading settings or installing logging.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

const fn default_window_secs() -> u64 {
    60
}

const fn default_max_requests() -> usize {
    60
}

const fn default_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}

const fn default_cache_capacity() -> usize {
    1000
}

const fn default_ttl_secs() -> u64 {
    300
}

const fn default_timeout_ms() -> u64 {
    3000
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_secs() -> u64 {
    30
}

const fn default_maintenance_interval_secs() -> u64 {
    30
}

/// Sliding-window limiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimiterSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Quiet period after which a caller's window is reclaimed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl LimiterSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

/// Per-provider circuit breaker settings. Absent means disabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Provider invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderSettings {
    /// Default timeout for providers without their own override.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            circuit_breaker: None,
        }
    }
}

/// Background sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaintenanceSettings {
    #[serde(default = "default_maintenance_interval_secs")]
    pub interval_secs: u64,
}

impl MaintenanceSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_maintenance_interval_secs(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl LoggingSettings {
    /// Install a global `tracing` subscriber for this configuration.
    ///
    /// `RUST_LOG` takes precedence over the configured level.
    ///
    /// # Errors
    /// Fails if the level is not a valid filter directive or a global
    /// subscriber is already installed.
    pub fn init(&self) -> Result<(), ConfigError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.level).map_err(|e| ConfigError::InvalidValue {
                field: "logging.level",
                reason: e.to_string(),
            })?,
        };

        let installed = match self.format {
            LogFormat::Pretty => fmt().pretty().with_env_filter(filter).try_init(),
            LogFormat::Compact => fmt().compact().with_env_filter(filter).try_init(),
            LogFormat::Json => fmt().json().with_env_filter(filter).try_init(),
        };
        installed.map_err(|e| ConfigError::Logging(e.to_string()))
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub limiter: LimiterSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl GatewaySettings {
    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Check that every value is within range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                })
            } else {
                Ok(())
            }
        };

        positive("limiter.window_secs", self.limiter.window_secs)?;
        positive("limiter.max_requests", self.limiter.max_requests as u64)?;
        positive("cache.capacity", self.cache.capacity as u64)?;
        positive("providers.timeout_ms", self.providers.timeout_ms)?;
        positive("maintenance.interval_secs", self.maintenance.interval_secs)?;
        if let Some(breaker) = &self.providers.circuit_breaker {
            positive(
                "providers.circuit_breaker.failure_threshold",
                u64::from(breaker.failure_threshold),
            )?;
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
