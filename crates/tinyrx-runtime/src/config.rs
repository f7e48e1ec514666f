#![forbid(unsafe_code)]

//! Runtime tuning knobs.
//!
//! [`ReactiveConfig`] holds the defaults that [`ReactiveRuntime`] hands to
//! everything it constructs. Values come from code (`with_*` builders) or
//! from the environment:
//!
//! | Variable                 | Field          | Default |
//! |--------------------------|----------------|---------|
//! | `TINYRX_CAPACITY`        | `capacity`     | 4       |
//! | `TINYRX_BATCH_BUDGET_MS` | `batch_budget` | 64 ms   |
//!
//! Unset variables keep the default; malformed ones are an error.
//!
//! [`ReactiveRuntime`]: crate::runtime::ReactiveRuntime

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::reactive::DEFAULT_BATCH_BUDGET;
use crate::reactive::observed::DEFAULT_CAPACITY;

/// Environment variable for [`ReactiveConfig::capacity`].
pub const ENV_CAPACITY: &str = "TINYRX_CAPACITY";
/// Environment variable for [`ReactiveConfig::batch_budget`], in milliseconds.
pub const ENV_BATCH_BUDGET_MS: &str = "TINYRX_BATCH_BUDGET_MS";

/// A configuration value could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got {value:?}")]
    NotANumber { var: &'static str, value: String },

    #[error("{var} must be at least 1")]
    Zero { var: &'static str },
}

/// Defaults for listener storage and batch pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Initial capacity of each listener channel and collection.
    pub capacity: usize,
    /// Time a batched mutation may spend notifying before it yields.
    pub batch_budget: Duration,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            batch_budget: DEFAULT_BATCH_BUDGET,
        }
    }
}

impl ReactiveConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_batch_budget(mut self, budget: Duration) -> Self {
        self.batch_budget = budget;
        self
    }

    /// Defaults overridden by `TINYRX_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_CAPACITY) {
            config.capacity = parse_number(ENV_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BATCH_BUDGET_MS) {
            let ms: u64 = parse_number(ENV_BATCH_BUDGET_MS, &raw)?;
            if ms == 0 {
                return Err(ConfigError::Zero {
                    var: ENV_BATCH_BUDGET_MS,
                });
            }
            config.batch_budget = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_number<N: FromStr>(var: &'static str, raw: &str) -> Result<N, ConfigError> {
    raw.trim()
        .parse::<N>()
        .map_err(|_| ConfigError::NotANumber {
            var,
            value: raw.to_string(),
        })
}
