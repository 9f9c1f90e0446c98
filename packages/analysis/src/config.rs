//! Executor tunables.
//!
//! Defaults follow the documented quota behaviour of the compute backend.
//! Each value can be overridden from the environment:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `INDIAGEO_MAX_DOWNSCALE_STEPS` | `max_downscale_steps` | 4 |
//! | `INDIAGEO_DOWNSCALE_FACTOR` | `downscale_factor` | 2 |
//! | `INDIAGEO_MAX_PIXELS` | `max_pixels` | 1e8 |
//! | `INDIAGEO_MAX_TRANSIENT_RETRIES` | `max_transient_retries` | 3 |
//! | `INDIAGEO_BACKOFF_BASE_MS` | `backoff_base` | 500 |
//! | `INDIAGEO_BACKOFF_MAX_MS` | `backoff_max` | 8000 |
//! | `INDIAGEO_ATTEMPT_TIMEOUT_SECS` | `attempt_timeout` | 30 |
//! | `INDIAGEO_MAX_CONCURRENT_BACKEND_CALLS` | `max_concurrent_backend_calls` | 8 |

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors from reading executor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("Invalid value {value:?} for {key}: {message}")]
    Invalid {
        /// Variable name.
        key: String,
        /// The raw value.
        value: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Budgets and limits for [`crate::executor::AdaptiveQueryExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Number of rungs on the downscale ladder, native scale included.
    pub max_downscale_steps: u32,
    /// Scale multiplier between rungs.
    pub downscale_factor: f64,
    /// Default pixel ceiling, unless a dataset declares its own.
    pub max_pixels: u64,
    /// Transient failures tolerated per request before giving up.
    pub max_transient_retries: u32,
    /// Delay before the first transient retry.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay.
    pub backoff_max: Duration,
    /// Time allowed for one backend call.
    pub attempt_timeout: Duration,
    /// Backend calls allowed in flight across all requests.
    pub max_concurrent_backend_calls: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_downscale_steps: 4,
            downscale_factor: 2.0,
            max_pixels: 100_000_000,
            max_transient_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
            max_concurrent_backend_calls: 8,
        }
    }
}

impl ExecutorConfig {
    /// Defaults overridden by any `INDIAGEO_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable cannot be parsed or
    /// the resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            max_downscale_steps: read(&lookup, "INDIAGEO_MAX_DOWNSCALE_STEPS")?
                .unwrap_or(defaults.max_downscale_steps),
            downscale_factor: read(&lookup, "INDIAGEO_DOWNSCALE_FACTOR")?
                .unwrap_or(defaults.downscale_factor),
            max_pixels: read_pixels(&lookup, "INDIAGEO_MAX_PIXELS")?
                .unwrap_or(defaults.max_pixels),
            max_transient_retries: read(&lookup, "INDIAGEO_MAX_TRANSIENT_RETRIES")?
                .unwrap_or(defaults.max_transient_retries),
            backoff_base: read(&lookup, "INDIAGEO_BACKOFF_BASE_MS")?
                .map_or(defaults.backoff_base, Duration::from_millis),
            backoff_max: read(&lookup, "INDIAGEO_BACKOFF_MAX_MS")?
                .map_or(defaults.backoff_max, Duration::from_millis),
            attempt_timeout: read(&lookup, "INDIAGEO_ATTEMPT_TIMEOUT_SECS")?
                .map_or(defaults.attempt_timeout, Duration::from_secs),
            max_concurrent_backend_calls: read(&lookup, "INDIAGEO_MAX_CONCURRENT_BACKEND_CALLS")?
                .unwrap_or(defaults.max_concurrent_backend_calls),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive the executor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String, message: &str| {
            Err(ConfigError::Invalid {
                key: key.to_string(),
                value,
                message: message.to_string(),
            })
        };

        if self.max_downscale_steps == 0 {
            return invalid(
                "INDIAGEO_MAX_DOWNSCALE_STEPS",
                self.max_downscale_steps.to_string(),
                "at least one step (the native scale) is required",
            );
        }
        if !self.downscale_factor.is_finite() || self.downscale_factor <= 1.0 {
            return invalid(
                "INDIAGEO_DOWNSCALE_FACTOR",
                self.downscale_factor.to_string(),
                "must be a finite number greater than 1",
            );
        }
        if self.max_pixels == 0 {
            return invalid("INDIAGEO_MAX_PIXELS", "0".to_string(), "must be positive");
        }
        if self.backoff_base > self.backoff_max {
            return invalid(
                "INDIAGEO_BACKOFF_BASE_MS",
                self.backoff_base.as_millis().to_string(),
                "must not exceed INDIAGEO_BACKOFF_MAX_MS",
            );
        }
        if self.attempt_timeout.is_zero() {
            return invalid("INDIAGEO_ATTEMPT_TIMEOUT_SECS", "0".to_string(), "must be positive");
        }
        if self.max_concurrent_backend_calls == 0 {
            return invalid(
                "INDIAGEO_MAX_CONCURRENT_BACKEND_CALLS",
                "0".to_string(),
                "must be positive",
            );
        }

        Ok(())
    }

    /// Delay before transient retry number `attempt` (1-based): the base
    /// delay doubled per previous attempt, capped at `backoff_max`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .saturating_mul(multiplier)
            .min(self.backoff_max)
    }
}

fn read<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Pixel counts are conventionally written in scientific notation
/// (`1e8`), so accept any finite, positive, whole float as well as a
/// plain integer.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn read_pixels(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();

    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(Some(n));
    }

    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 1.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(Some(f as u64))
        }
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            message: "expected a positive whole number of pixels".to_string(),
        }),
    }
}
