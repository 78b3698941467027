//! Circuit breaker: Closed -> Open -> `HalfOpen` -> Closed.
//!
//! While Closed, calls run and failures are counted; reaching the threshold
//! opens the circuit. While Open, calls fail fast until the recovery timeout
//! elapses, after which exactly one trial call is let through (`HalfOpen`).
//! A successful trial closes the circuit and resets the count; a failed one
//! reopens it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default consecutive failures before opening.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the circuit stays open.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast.
    Open,
    /// One trial call is allowed.
    HalfOpen,
}

/// Why a guarded call failed.
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The circuit was open; the call was not attempted.
    #[error("circuit open")]
    Open,

    /// The call ran and failed.
    #[error("call failed: {0}")]
    Failed(E),
}

/// Mutable breaker state behind the mutex.
#[derive(Debug)]
struct BreakerInner {
    /// Current state.
    state: BreakerState,
    /// Failures since the last success.
    failure_count: u32,
    /// When the circuit last opened.
    opened_at: Option<Instant>,
    /// Whether the half-open trial call is running.
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker. Share via `Arc<CircuitBreaker>`.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Failures that open the circuit.
    failure_threshold: u32,
    /// How long the circuit stays open.
    recovery_timeout: Duration,
    /// Mutable state protected by a mutex.
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub const fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Lock the inner state, recovering from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open circuit whose timeout has elapsed reports
    /// `HalfOpen`.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        if inner.state == BreakerState::Open && self.timeout_elapsed(&inner) {
            BreakerState::HalfOpen
        } else {
            inner.state
        }
    }

    /// Failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Whether the recovery timeout has elapsed since opening.
    fn timeout_elapsed(&self, inner: &BreakerInner) -> bool {
        inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.recovery_timeout)
    }

    /// Decide whether a call may proceed, moving Open to `HalfOpen` when
    /// the timeout has elapsed.
    fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if self.timeout_elapsed(&inner) {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("Circuit half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            info!("Circuit closed after successful trial");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// Record a failed call.
    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.trial_in_flight = false;
        let reopen = inner.state == BreakerState::HalfOpen;
        if reopen || inner.failure_count >= self.failure_threshold {
            if inner.state != BreakerState::Open {
                warn!(failures = inner.failure_count, "Circuit opened");
            }
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Run `op` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without calling `op` while the
    /// circuit is open, or [`BreakerError::Failed`] with `op`'s error.
    pub fn call<T, E, F>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }
        match op() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Failed(err))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}
