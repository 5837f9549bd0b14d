//! Pipeline execution options.
//!
//! Options can be built in code, deserialized from JSON (`camelCase` keys, as
//! in `{ "parallel": true, "maxRetries": 3, "timeoutMs": 5000 }`), or
//! overridden from the environment.

use crate::errors::StepflowError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`PipelineOptions::parallel`].
pub const ENV_PARALLEL: &str = "STEPFLOW_PARALLEL";
/// Environment variable overriding [`PipelineOptions::max_retries`].
pub const ENV_MAX_RETRIES: &str = "STEPFLOW_MAX_RETRIES";
/// Environment variable overriding [`PipelineOptions::timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "STEPFLOW_TIMEOUT_MS";
/// Environment variable overriding [`PipelineOptions::max_concurrency`].
pub const ENV_MAX_CONCURRENCY: &str = "STEPFLOW_MAX_CONCURRENCY";

/// Delay policy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Retry at once.
    #[default]
    Immediate,
    /// delay = base
    Constant,
    /// delay = base * attempt
    Linear,
    /// delay = base * 2^(attempt - 1)
    Exponential,
}

/// Options controlling how a pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineOptions {
    /// Dispatch all ready steps concurrently instead of one at a time.
    pub parallel: bool,
    /// Total attempts per step. `0` and `1` both mean a single attempt.
    pub max_retries: u32,
    /// Whole-pipeline timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Cap on concurrently running steps in parallel mode. `None` is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Delay policy between attempts.
    pub retry_backoff: BackoffStrategy,
    /// Base delay for non-immediate backoff, in milliseconds.
    pub retry_delay_ms: u64,
    /// Randomize each retry delay between zero and its computed value.
    pub retry_jitter: bool,
}

impl PipelineOptions {
    /// Creates sequential options with no retries and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency mode.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the total attempts per step.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the pipeline timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Caps concurrently running steps in parallel mode.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Sets the retry backoff and its base delay.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy, base_delay_ms: u64) -> Self {
        self.retry_backoff = strategy;
        self.retry_delay_ms = base_delay_ms;
        self
    }

    /// Enables retry jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Returns the pipeline timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Returns how many steps may run at once, never less than one.
    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        if self.parallel {
            self.max_concurrency.map_or(usize::MAX, |max| max.max(1))
        } else {
            1
        }
    }

    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the options are invalid.
    pub fn from_json(json: &str) -> Result<Self, StepflowError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StepflowError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Builds default options overridden by the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, StepflowError> {
        Self::default().apply_env()
    }

    /// Overrides fields from `STEPFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn apply_env(self) -> Result<Self, StepflowError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StepflowError> {
        if let Some(value) = lookup(ENV_PARALLEL) {
            self.parallel = parse_bool(ENV_PARALLEL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = Some(parse_number(ENV_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = Some(parse_number(ENV_MAX_CONCURRENCY, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Validates option values.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_concurrency` is zero.
    pub fn validate(&self) -> Result<(), StepflowError> {
        if self.max_concurrency == Some(0) {
            return Err(StepflowError::Config(
                "maxConcurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, StepflowError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(StepflowError::Config(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, StepflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| StepflowError::Config(format!("{key}: expected a number, got '{value}'")))
}
