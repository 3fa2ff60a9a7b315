use std::env;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::SieveError;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Grouping engine configuration. Immutable per engine instance; validated
/// at construction so that a bad value can never surface mid-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum temporal span of one bucket, in seconds.
    #[serde(default = "default_time_window")]
    pub time_window_seconds: i64,
    /// Minimum similarity for an item to join a cluster (inclusive).
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    /// Upper bound on concurrent comparator calls. 0 = available parallelism.
    #[serde(default = "default_parallelism")]
    pub max_parallel_comparisons: usize,
}

fn default_time_window() -> i64 {
    86_400
}
fn default_threshold() -> f64 {
    0.85
}
fn default_parallelism() -> usize {
    0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_window_seconds: default_time_window(),
            similarity_threshold: default_threshold(),
            max_parallel_comparisons: default_parallelism(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables, falling back to defaults:
    /// `SIEVE_TIME_WINDOW_SECONDS`, `SIEVE_SIMILARITY_THRESHOLD`,
    /// `SIEVE_MAX_PARALLEL_COMPARISONS`.
    pub fn from_env() -> Self {
        Self {
            time_window_seconds: env_or("SIEVE_TIME_WINDOW_SECONDS", "86400")
                .parse()
                .unwrap_or_else(|_| default_time_window()),
            similarity_threshold: env_or("SIEVE_SIMILARITY_THRESHOLD", "0.85")
                .parse()
                .unwrap_or_else(|_| default_threshold()),
            max_parallel_comparisons: env_or("SIEVE_MAX_PARALLEL_COMPARISONS", "0")
                .parse()
                .unwrap_or_else(|_| default_parallelism()),
        }
    }

    /// Check every field, reporting the first violation.
    pub fn validate(&self) -> Result<(), SieveError> {
        if self.time_window_seconds <= 0 {
            return Err(SieveError::InvalidConfig(format!(
                "time_window_seconds must be positive, got {}",
                self.time_window_seconds
            )));
        }
        if !self.similarity_threshold.is_finite()
            || self.similarity_threshold <= 0.0
            || self.similarity_threshold > 1.0
        {
            return Err(SieveError::InvalidConfig(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }

    /// The bucket time window as a chrono duration.
    pub fn time_window(&self) -> Duration {
        Duration::seconds(self.time_window_seconds)
    }

    /// Resolve comparison width (0 means use available parallelism).
    pub fn resolved_parallelism(&self) -> usize {
        if self.max_parallel_comparisons == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.max_parallel_comparisons
        }
    }
}
