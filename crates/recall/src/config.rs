use std::{env, str::FromStr, time::Duration};

use recall_core::progress::SchedulerParams;

use crate::service::ReviewSettings;
use crate::unit_of_work::RetryPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Cache TTL in seconds (default: 300)
    pub cache_ttl_seconds: u64,
    /// Maximum number of cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// Path to SQLite database file (default: "recall.db")
    pub sqlite_path: String,
    /// Attempts per grading before a conflict is reported (default: 3)
    pub max_conflict_attempts: u32,
    /// Base backoff between conflict retries in milliseconds (default: 10)
    pub retry_backoff_ms: u64,
    /// Deadline for store calls in milliseconds (default: 5,000)
    pub store_timeout_ms: u64,
    /// Deadline for cache calls in milliseconds (default: 250)
    pub cache_timeout_ms: u64,
    /// Create state for never-seen items on first grade (default: true)
    pub implicit_create: bool,
    pub ease_floor: f64,
    pub initial_ease: f64,
    pub failure_penalty: f64,
    pub first_interval_days: u32,
    pub second_interval_days: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_TTL_SECONDS` - Cache TTL in seconds (default: 300)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries, must be non-zero (default: 10,000)
    /// - `SQLITE_PATH` - SQLite database path (default: "recall.db")
    /// - `MAX_CONFLICT_ATTEMPTS` - Conflict retry budget (default: 3)
    /// - `RETRY_BACKOFF_MS` - Retry backoff base (default: 10)
    /// - `STORE_TIMEOUT_MS` - Store deadline (default: 5,000)
    /// - `CACHE_TIMEOUT_MS` - Cache deadline (default: 250)
    /// - `IMPLICIT_CREATE` - Create unseen items when graded (default: true)
    /// - `EASE_FLOOR`, `INITIAL_EASE`, `FAILURE_PENALTY` - SM2 ease tuning
    /// - `FIRST_INTERVAL_DAYS`, `SECOND_INTERVAL_DAYS` - SM2 opening intervals
    ///
    /// Unparseable values fall back to their defaults, as do non-finite or
    /// negative ease settings and a zero ease floor.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let scheduler = SchedulerParams::default();

        Self {
            cache_ttl_seconds: parse_or(var("CACHE_TTL_SECONDS"), 300),
            cache_max_entries: var("CACHE_MAX_ENTRIES")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(10_000),
            sqlite_path: var("SQLITE_PATH").unwrap_or_else(|| "recall.db".to_string()),
            max_conflict_attempts: var("MAX_CONFLICT_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &u32| n > 0)
                .unwrap_or(3),
            retry_backoff_ms: parse_or(var("RETRY_BACKOFF_MS"), 10),
            store_timeout_ms: parse_or(var("STORE_TIMEOUT_MS"), 5_000),
            cache_timeout_ms: parse_or(var("CACHE_TIMEOUT_MS"), 250),
            implicit_create: parse_or(var("IMPLICIT_CREATE"), true),
            ease_floor: var("EASE_FLOOR")
                .and_then(parse_finite)
                .filter(|&v| v > 0.0)
                .unwrap_or(scheduler.ease_floor),
            initial_ease: var("INITIAL_EASE")
                .and_then(parse_finite)
                .filter(|&v| v > 0.0)
                .unwrap_or(scheduler.initial_ease),
            failure_penalty: var("FAILURE_PENALTY")
                .and_then(parse_finite)
                .filter(|&v| v >= 0.0)
                .unwrap_or(scheduler.failure_penalty),
            first_interval_days: parse_or(var("FIRST_INTERVAL_DAYS"), scheduler.first_interval_days),
            second_interval_days: parse_or(
                var("SECOND_INTERVAL_DAYS"),
                scheduler.second_interval_days,
            ),
        }
    }

    /// Get cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn scheduler_params(&self) -> SchedulerParams {
        SchedulerParams {
            ease_floor: self.ease_floor,
            // The starting ease never sits below the floor
            initial_ease: self.initial_ease.max(self.ease_floor),
            failure_penalty: self.failure_penalty,
            first_interval_days: self.first_interval_days,
            second_interval_days: self.second_interval_days,
            ..SchedulerParams::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_conflict_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            attempt_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    /// Collects everything the review service needs.
    pub fn review_settings(&self) -> ReviewSettings {
        ReviewSettings {
            scheduler: self.scheduler_params(),
            cache_ttl: self.cache_ttl(),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            implicit_create: self.implicit_create,
            retry: self.retry_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_finite(value: String) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
