/// Configuration loading for the pipeline.
///
/// JSON on disk, decoded with `serde`. `rateLimit.retry` is optional: an
/// absent block falls back to documented defaults rather than erroring.
use serde::Deserialize;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::time::interval_ms;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "dbPath")]
    pub db_path: String,
    pub symbols: Vec<String>,
    pub intervals: Vec<String>,
    pub bootstrap: BootstrapConfig,
    #[serde(rename = "rateLimit")]
    pub rate_limit: RateLimitConfig,
    pub http: HttpConfig,
    #[serde(rename = "logLevel", default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(rename = "startDate")]
    pub start_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "requestsPerMinute")]
    pub requests_per_minute: u32,
    #[serde(rename = "maxConcurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "baseMs", default = "default_retry_base_ms")]
    pub base_ms: u64,
    #[serde(rename = "maxMs", default = "default_retry_max_ms")]
    pub max_ms: u64,
    #[serde(rename = "maxRetries", default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            max_ms: default_retry_max_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_retry_base_ms() -> u64 {
    500
}
fn default_retry_max_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

impl Config {
    /// Load and validate a config file. Unknown interval codes and
    /// malformed/missing log levels are rejected here, at the boundary,
    /// rather than surfacing as confusing failures deep in the pipeline.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: Config = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(PipelineError::Config("symbols must not be empty".into()));
        }
        if self.intervals.is_empty() {
            return Err(PipelineError::Config("intervals must not be empty".into()));
        }
        for code in &self.intervals {
            interval_ms(code)?;
        }
        match self.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(PipelineError::Config(format!(
                    "unknown logLevel: {other}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "dbPath": "./candles.db",
            "symbols": ["BTCUSDT"],
            "intervals": ["1h", "4h"],
            "bootstrap": {"startDate": "2023-01-01T00:00:00Z"},
            "rateLimit": {"requestsPerMinute": 1200, "maxConcurrent": 4},
            "http": {"timeoutMs": 10000},
            "logLevel": "info"
        }"#
    }

    #[test]
    fn parses_minimal_config_and_defaults_retry() {
        let cfg: Config = serde_json::from_str(sample()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.rate_limit.retry.base_ms, 500);
        assert_eq!(cfg.rate_limit.retry.max_retries, 5);
    }

    #[test]
    fn rejects_unknown_interval() {
        let bad = sample().replace("\"1h\", \"4h\"", "\"1h\", \"9x\"");
        let cfg: Config = serde_json::from_str(&bad).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let bad = sample().replace("\"info\"", "\"verbose\"");
        let cfg: Config = serde_json::from_str(&bad).unwrap();
        assert!(cfg.validate().is_err());
    }
}
