// Judge connection and orchestration settings
// Built once and passed into the dispatcher, poller and validator

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_JUDGE_URL: &str = "http://localhost:2358";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeConfig {
    /// Judge0 base URL, without a trailing path
    pub base_url: String,
    /// Sent as `X-Auth-Token` when set
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Attempts per dispatch call before a transport failure is surfaced
    pub max_dispatch_attempts: u32,
    /// Backoff unit between dispatch attempts, multiplied by the attempt number
    pub retry_backoff: Duration,
    /// Pause between consecutive single-mode submissions
    pub submission_delay: Duration,
    pub max_batch_size: usize,
    pub base64_encoded: bool,
    /// Validation runs allowed to talk to the judge at the same time
    pub max_concurrent_runs: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_JUDGE_URL.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
            max_dispatch_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            submission_delay: Duration::from_millis(200),
            max_batch_size: 20,
            base64_encoded: false,
            max_concurrent_runs: 4,
        }
    }
}

impl JudgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from `JUDGE0_*` / `GAVEL_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(Duration::from_millis(parse(
                &lookup,
                key,
                default.as_millis() as u64,
            )?))
        };

        let config = Self {
            base_url: lookup("JUDGE0_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            auth_token: lookup("JUDGE0_AUTH_TOKEN").filter(|t| !t.is_empty()),
            request_timeout: millis("JUDGE0_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            poll_interval: millis("JUDGE0_POLL_INTERVAL_MS", defaults.poll_interval)?,
            max_poll_attempts: parse(&lookup, "JUDGE0_MAX_POLL_ATTEMPTS", defaults.max_poll_attempts)?,
            max_dispatch_attempts: parse(
                &lookup,
                "JUDGE0_MAX_DISPATCH_ATTEMPTS",
                defaults.max_dispatch_attempts,
            )?,
            retry_backoff: millis("JUDGE0_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            submission_delay: millis("JUDGE0_SUBMISSION_DELAY_MS", defaults.submission_delay)?,
            max_batch_size: parse(&lookup, "JUDGE0_MAX_BATCH_SIZE", defaults.max_batch_size)?,
            base64_encoded: parse(&lookup, "JUDGE0_BASE64", defaults.base64_encoded)?,
            max_concurrent_runs: parse(
                &lookup,
                "GAVEL_MAX_CONCURRENT_RUNS",
                defaults.max_concurrent_runs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a bounded loop never run, or a base
    /// URL no request can be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "JUDGE0_API_URL",
                value: self.base_url.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "JUDGE0_API_URL",
                value: self.base_url.clone(),
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::Zero("max_poll_attempts"));
        }
        if self.max_dispatch_attempts == 0 {
            return Err(ConfigError::Zero("max_dispatch_attempts"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Zero("max_batch_size"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::Zero("max_concurrent_runs"));
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
