//! Reasoning endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model used when the configured name is empty.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Remote reasoning endpoint settings.
///
/// Credentials are never stored in the file. `credential_env` names the
/// environment variables that hold them; unset or empty variables are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub base_url: String,
    pub model: String,
    /// Tried in order after a model-not-found response.
    pub fallback_models: Vec<String>,
    pub credential_env: Vec<String>,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub retry: RetryConfig,
    pub cooldown: CooldownConfig,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: DEFAULT_MODEL.to_string(),
            fallback_models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash-latest".to_string(),
                "gemini-1.5-pro-latest".to_string(),
                "gemini-pro".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            credential_env: vec![
                "GEMINI_API_KEY".to_string(),
                "GEMINI_API_KEY_1".to_string(),
                "GEMINI_API_KEY_2".to_string(),
                "GEMINI_API_KEY_3".to_string(),
            ],
            timeout_seconds: 30,
            temperature: 0.0,
            retry: RetryConfig::default(),
            cooldown: CooldownConfig::default(),
        }
    }
}

impl ReasoningConfig {
    /// Model name with any `models/` prefix removed; empty names fall back to
    /// [`DEFAULT_MODEL`].
    pub fn normalized_model(&self) -> String {
        let trimmed = self.model.trim();
        let name = trimmed.strip_prefix("models/").unwrap_or(trimmed);
        if name.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            name.to_string()
        }
    }

    /// Resolve credentials from the configured environment variables, in order,
    /// skipping unset and duplicate values.
    pub fn resolve_credentials(&self) -> Vec<String> {
        let mut credentials: Vec<String> = Vec::new();
        for var in &self.credential_env {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim().to_string();
                if !value.is_empty() && !credentials.contains(&value) {
                    credentials.push(value);
                }
            }
        }
        credentials
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Outer retry policy for one logical reasoning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per logical call, including the first. Defaults to 2.
    /// Larger values are accepted and multiply the worst-case call time,
    /// since each attempt walks every credential and fallback model.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff amplification applied to rate-limit failures.
    pub rate_limit_factor: f64,
    /// Upper bound of the random jitter added to each delay (doubled for rate limits).
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            rate_limit_factor: 1.5,
            jitter_ms: 1000,
        }
    }
}

/// How long a credential sits out after each failure class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub rate_limited_seconds: u64,
    pub unavailable_seconds: u64,
    pub other_seconds: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            rate_limited_seconds: 60,
            unavailable_seconds: 30,
            other_seconds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_model_strips_prefix() {
        let config = ReasoningConfig {
            model: "models/gemini-1.5-pro-latest".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_model(), "gemini-1.5-pro-latest");
    }

    #[test]
    fn test_normalized_model_empty_defaults() {
        let config = ReasoningConfig {
            model: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.normalized_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_resolve_credentials_skips_missing_and_duplicates() {
        std::env::set_var("CLINSUPPLY_TEST_CRED_A", "alpha");
        std::env::set_var("CLINSUPPLY_TEST_CRED_B", "alpha");
        std::env::set_var("CLINSUPPLY_TEST_CRED_C", "  ");
        let config = ReasoningConfig {
            credential_env: vec![
                "CLINSUPPLY_TEST_CRED_A".to_string(),
                "CLINSUPPLY_TEST_CRED_B".to_string(),
                "CLINSUPPLY_TEST_CRED_C".to_string(),
                "CLINSUPPLY_TEST_CRED_UNSET".to_string(),
            ],
            ..Default::default()
        };
        let credentials = config.resolve_credentials();
        std::env::remove_var("CLINSUPPLY_TEST_CRED_A");
        std::env::remove_var("CLINSUPPLY_TEST_CRED_B");
        std::env::remove_var("CLINSUPPLY_TEST_CRED_C");

        assert_eq!(credentials, vec!["alpha".to_string()]);
    }

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.rate_limit_factor, 1.5);
    }
}
