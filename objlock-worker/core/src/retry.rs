//! Retry configuration for lock acquisition.
//!
//! Provides the bounded Fibonacci backoff used when concurrent acquirers
//! collide on a conditional write. Each retry restarts the whole
//! read-check-write round.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::FibonacciBackoff;

/// Default number of attempts (the first try plus five retries).
pub const DEFAULT_MAX_ATTEMPTS: usize = 6;

/// Default initial backoff delay (50 milliseconds).
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Retry configuration with Fibonacci backoff.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct RetryConfig {
    /// Maximum number of acquisition rounds, the first one included (default: 6).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff delay (default: "50ms").
    /// Accepts human-readable durations like "50ms", "1s".
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryConfig {
    /// Creates a tokio-retry strategy with Fibonacci backoff.
    ///
    /// Example sequence with the default 50ms initial backoff:
    /// - Retry 1: 50ms
    /// - Retry 2: 50ms
    /// - Retry 3: 100ms
    /// - Retry 4: 150ms
    /// - Retry 5: 250ms
    pub fn strategy(&self) -> impl Iterator<Item = Duration> + Send {
        // Clamped to 1ms so a zero backoff still yields a growing sequence.
        let initial_ms = (self.initial_backoff.as_millis() as u64).max(1);
        FibonacciBackoff::from_millis(initial_ms).take(self.max_attempts.saturating_sub(1))
    }

    /// Merges lock-level retry config with app-level config.
    ///
    /// Lock-level config takes precedence over app-level.
    pub fn merge(app_level: &Option<RetryConfig>, lock_level: &Option<RetryConfig>) -> RetryConfig {
        match (app_level, lock_level) {
            (_, Some(lock_config)) => lock_config.clone(),
            (Some(app_config), None) => app_config.clone(),
            (None, None) => RetryConfig::default(),
        }
    }
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}
