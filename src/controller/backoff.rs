//! # Exponential Backoff
//!
//! Retry delays for failed reconciles. Each managed resource gets its own
//! sequence so one failing resource does not slow down the others.
//!
//! ```rust
//! use aws_resource_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Doubling backoff capped at `max`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start: Duration,
    current: Duration,
    max: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            current: start,
            max,
            attempts: 0,
        }
    }

    /// The next delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Failures since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.start;
        self.attempts = 0;
    }
}

/// Per-resource backoff state, keyed by `<kind>/<name>`
#[derive(Debug)]
pub struct BackoffRegistry {
    start: Duration,
    max: Duration,
    states: Mutex<HashMap<String, ExponentialBackoff>>,
}

impl BackoffRegistry {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next delay for `key` and the number of failures so far
    pub fn next_backoff(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.to_string())
                    .or_insert_with(|| ExponentialBackoff::new(self.start, self.max));
                let delay = state.next_backoff();
                (delay, state.attempts())
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using maximum backoff", e);
                (self.max, 0)
            }
        }
    }

    /// Forget the failures of `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.attempts(), 1);
    }

    #[test]
    fn test_registry_tracks_resources_independently() {
        let registry = BackoffRegistry::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(registry.next_backoff("Table/a").0, Duration::from_secs(1));
        assert_eq!(registry.next_backoff("Table/a").0, Duration::from_secs(2));
        assert_eq!(registry.next_backoff("Table/b"), (Duration::from_secs(1), 1));

        registry.reset("Table/a");
        assert_eq!(registry.next_backoff("Table/a"), (Duration::from_secs(1), 1));
        assert_eq!(registry.next_backoff("Table/b").0, Duration::from_secs(2));
    }
}
