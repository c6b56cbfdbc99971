//! Oracle and retry configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transient oracle failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls including the first; at least 1
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Settings for the OpenAI-compatible chat endpoint acting as reasoning oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL; `/chat/completions` is appended
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature; 0.0 for near-deterministic answers
    pub temperature: f32,
    pub seed: Option<u64>,
    /// Per-call timeout applied by the orchestrator
    pub timeout_secs: u64,
    /// Persona the oracle is asked to adopt
    pub analyst_role: String,
    /// Characters of each evidence chunk included in the request
    pub excerpt_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            temperature: 0.0,
            seed: None,
            timeout_secs: 60,
            analyst_role: "Academic Validation".to_string(),
            excerpt_chars: 800,
            retry: RetryPolicy::default(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Apply environment overrides
    ///
    /// - RAGA_ORACLE_ENDPOINT: base URL of the chat service
    /// - RAGA_ORACLE_MODEL: model name
    /// - OPENAI_API_KEY: bearer token
    pub fn apply_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("RAGA_ORACLE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("RAGA_ORACLE_MODEL") {
            self.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(10), Duration::from_millis(8000));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn test_attempts_never_zero() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }

    #[test]
    fn test_oracle_defaults() {
        let config = OracleConfig::default();
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.analyst_role, "Academic Validation");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_nested_retry_section() {
        let config: OracleConfig =
            serde_json::from_str(r#"{"model": "gpt-4o-mini", "retry": {"max_attempts": 5}}"#)
                .unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
    }
}
