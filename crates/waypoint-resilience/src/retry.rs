//! Exponential-backoff retry.
//!
//! Attempt `n` (zero-based) that fails waits `base_delay * factor^n`, capped
//! at `max_delay`, before the next attempt. After `max_retries` retries the
//! last error is returned unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Retry policy with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
}

impl RetryStrategy {
    /// Create a strategy.
    pub const fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// A strategy with the default cap and factor.
    pub const fn with_base(max_retries: u32, base_delay: Duration) -> Self {
        Self::new(max_retries, base_delay, Duration::from_secs(60), 2.0)
    }

    /// Delay after failed attempt `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 0.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let secs = self.base_delay.as_secs_f64() * factor.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Run `op` until it succeeds or retries run out, sleeping the thread
    /// between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    pub fn execute<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: core::fmt::Display,
    {
        self.execute_with(op, std::thread::sleep)
    }

    /// Like [`RetryStrategy::execute`], with the sleep supplied by the
    /// caller. `op` receives the zero-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    pub fn execute_with<T, E, F, S>(&self, op: F, sleep: S) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        S: FnMut(Duration),
        E: core::fmt::Display,
    {
        self.execute_if(op, |_| true, sleep)
    }

    /// Like [`RetryStrategy::execute_with`], but an error for which
    /// `retryable` returns `false` is returned at once, without sleeping.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once every
    /// attempt has failed.
    pub fn execute_if<T, E, F, R, S>(&self, mut op: F, retryable: R, mut sleep: S) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        S: FnMut(Duration),
        E: core::fmt::Display,
    {
        let mut attempt = 0_u32;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => {
                    debug!(attempt = attempt.saturating_add(1), %err, "Error is not retryable");
                    return Err(err);
                }
                Err(err) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt = attempt.saturating_add(1), ?delay, %err, "Attempt failed, retrying");
                    sleep(delay);
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => {
                    error!(attempts = attempt.saturating_add(1), %err, "All attempts failed");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::with_base(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let strategy = RetryStrategy::new(5, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(strategy.delay_for(0), Duration::from_secs(1));
        assert_eq!(strategy.delay_for(1), Duration::from_secs(2));
        assert_eq!(strategy.delay_for(2), Duration::from_secs(4));
        assert_eq!(strategy.delay_for(3), Duration::from_secs(5));
        assert_eq!(strategy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let strategy = RetryStrategy::default();
        let mut slept = Vec::new();
        let result: Result<u32, String> = strategy.execute_with(
            |attempt| if attempt < 2 { Err(format!("fail {attempt}")) } else { Ok(attempt) },
            |d| slept.push(d),
        );
        assert_eq!(result, Ok(2));
        assert_eq!(slept, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn returns_last_error_when_exhausted() {
        let strategy = RetryStrategy::with_base(2, Duration::from_millis(1));
        let mut calls = 0_u32;
        let result: Result<(), String> = strategy.execute_with(
            |attempt| {
                calls = calls.saturating_add(1);
                Err(format!("fail {attempt}"))
            },
            |_| {},
        );
        assert_eq!(result, Err(String::from("fail 2")));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_error_returns_without_sleeping() {
        let strategy = RetryStrategy::default();
        let mut slept = Vec::new();
        let mut calls = 0_u32;
        let result: Result<(), &str> = strategy.execute_if(
            |attempt| {
                calls = calls.saturating_add(1);
                if attempt == 0 { Err("flaky") } else { Err("fatal") }
            },
            |err| *err != "fatal",
            |d| slept.push(d),
        );
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 2);
        assert_eq!(slept, vec![Duration::from_secs(1)]);
    }

    #[test]
    fn zero_retries_runs_once() {
        let strategy = RetryStrategy::with_base(0, Duration::from_secs(1));
        let result: Result<(), &str> = strategy.execute_with(|_| Err("nope"), |_| {});
        assert_eq!(result, Err("nope"));
    }
}
