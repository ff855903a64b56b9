//! Configuration module
//!
//! Layered configuration for a supply run.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`CLINSUPPLY_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! The configuration is fixed once a run starts.
//!
//! # Example
//!
//! ```rust
//! use clinsupply::config::SupplyConfig;
//!
//! let config = SupplyConfig::default();
//! assert_eq!(config.dispatch.batch_size, 5);
//!
//! let toml = r#"
//! [dispatch]
//! batch_size = 8
//! "#;
//! let config: SupplyConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.dispatch.batch_size, 8);
//! assert_eq!(config.dispatch.max_concurrent, 3);
//! ```

pub mod allocation;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod reasoning;
pub mod routing;
pub mod rules;

pub use allocation::AllocationConfig;
pub use dispatch::DispatchConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use reasoning::{CooldownConfig, ReasoningConfig, RetryConfig};
pub use routing::RoutingConfig;
pub use rules::RulesConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SupplyConfig {
    pub rules: RulesConfig,
    pub routing: RoutingConfig,
    pub dispatch: DispatchConfig,
    pub reasoning: ReasoningConfig,
    pub allocation: AllocationConfig,
    pub logging: LoggingConfig,
}

impl SupplyConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `CLINSUPPLY_*` environment overrides.
    ///
    /// Unparseable values are ignored and the current value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        fn parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
        }
        fn flag(var: &str) -> Option<bool> {
            std::env::var(var)
                .ok()
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
        }

        if let Some(size) = parsed("CLINSUPPLY_BATCH_SIZE") {
            self.dispatch.batch_size = size;
        }
        if let Some(enabled) = flag("CLINSUPPLY_USE_BATCH") {
            self.dispatch.batch_enabled = enabled;
        }
        if let Some(limit) = parsed("CLINSUPPLY_MAX_CONCURRENT") {
            self.dispatch.max_concurrent = limit;
        }
        if let Some(parallel) = flag("CLINSUPPLY_USE_PARALLEL") {
            self.dispatch.parallel = parallel;
        }
        if let Some(selective) = flag("CLINSUPPLY_SELECTIVE") {
            self.routing.selective = selective;
        }
        if let Some(threshold) = parsed("CLINSUPPLY_URGENCY_PRIORITY") {
            self.routing.urgency_priority = threshold;
        }
        if let Some(days) = parsed("CLINSUPPLY_EXPIRY_DAYS") {
            self.routing.expiry_days = days;
        }
        if let Ok(model) = std::env::var("CLINSUPPLY_MODEL") {
            self.reasoning.model = model;
        }
        if let Ok(url) = std::env::var("CLINSUPPLY_BASE_URL") {
            self.reasoning.base_url = url;
        }
        if let Some(level) = parsed("CLINSUPPLY_SERVICE_LEVEL") {
            self.allocation.service_level = level;
        }
        if let Ok(level) = std::env::var("CLINSUPPLY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = parsed("CLINSUPPLY_LOG_FORMAT") {
            self.logging.format = format;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let multiplier = self.rules.safety_stock_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "rules.safety_stock_multiplier",
                format!("multiplier must be a finite value of at least 1.0, got {}", multiplier),
            ));
        }
        if self.dispatch.batch_size == 0 {
            return Err(ConfigError::invalid(
                "dispatch.batch_size",
                "batch size must be non-zero",
            ));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "dispatch.max_concurrent",
                "concurrency limit must be non-zero",
            ));
        }
        if self.reasoning.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "reasoning.retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        if self.reasoning.base_url.trim().is_empty() {
            return Err(ConfigError::invalid(
                "reasoning.base_url",
                "URL cannot be empty",
            ));
        }
        let level = self.allocation.service_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(ConfigError::invalid(
                "allocation.service_level",
                format!("service level must be in (0, 1), got {}", level),
            ));
        }

        Ok(())
    }
}
