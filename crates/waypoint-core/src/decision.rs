//! The decision oracle seam.
//!
//! Each actor turn asks a [`DecisionOracle`] for a one-line textual action
//! (`MOVE north`, `BUILD 3,2`, `OBSERVE`). The oracle is an external
//! collaborator: an LLM endpoint, a scripted bot, or a test stub. Actors
//! never see an oracle failure directly; [`decide_or_wait`] substitutes
//! [`WAIT_ACTION`] and hands the error back for recording.
//!
//! [`ResilientOracle`] wraps any oracle with a [`CircuitBreaker`], a
//! [`RetryStrategy`], and a per-call deadline.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use waypoint_resilience::{BreakerError, CircuitBreaker, RetryStrategy};
use waypoint_types::{AgentId, Role};

use crate::config::OracleConfig;
use crate::observation::Observation;

/// The safe default action.
pub const WAIT_ACTION: &str = "WAIT";

/// Errors returned by a decision oracle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The oracle did not answer within the deadline.
    #[error("agent {agent_id} timed out (deadline: {deadline_ms}ms)")]
    Timeout {
        /// The agent whose decision was late.
        agent_id: AgentId,
        /// The deadline in milliseconds.
        deadline_ms: u64,
    },

    /// The backend could not be reached or refused the call.
    #[error("oracle unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The circuit breaker is open; the backend was not called.
    #[error("oracle circuit open")]
    CircuitOpen,

    /// Anything else.
    #[error("oracle error: {message}")]
    Internal {
        /// Description of the error.
        message: String,
    },
}

/// A source of textual actions.
pub trait DecisionOracle: Send + Sync {
    /// Decide on one action line for the observed actor.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] when no action could be obtained. Callers
    /// fall back to [`WAIT_ACTION`].
    fn decide(&self, observation: &Observation, briefing: &str) -> Result<String, OracleError>;
}

impl<O: DecisionOracle + ?Sized> DecisionOracle for Arc<O> {
    fn decide(&self, observation: &Observation, briefing: &str) -> Result<String, OracleError> {
        (**self).decide(observation, briefing)
    }
}

/// Ask `oracle` for an action, substituting [`WAIT_ACTION`] on failure.
///
/// The error, if any, is returned alongside so the caller can record it.
pub fn decide_or_wait(
    oracle: &dyn DecisionOracle,
    observation: &Observation,
    briefing: &str,
) -> (String, Option<OracleError>) {
    match oracle.decide(observation, briefing) {
        Ok(action) => (action, None),
        Err(err) => {
            warn!(agent_id = %observation.agent, error = %err, "Oracle failed, falling back to WAIT");
            (WAIT_ACTION.to_owned(), Some(err))
        }
    }
}

// ---------------------------------------------------------------------------
// StubOracle
// ---------------------------------------------------------------------------

/// An oracle that always answers [`WAIT_ACTION`].
///
/// Actors still make progress on their built-in behaviour (exploration
/// moves, scanning, standing build orders), so the whole mission can run
/// without a backend.
#[derive(Debug, Clone, Default)]
pub struct StubOracle;

impl StubOracle {
    /// Create a new stub oracle.
    pub const fn new() -> Self {
        Self
    }
}

impl DecisionOracle for StubOracle {
    fn decide(&self, _observation: &Observation, _briefing: &str) -> Result<String, OracleError> {
        Ok(WAIT_ACTION.to_owned())
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

/// Replays a fixed list of actions per role, then answers
/// [`WAIT_ACTION`].
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    /// Remaining actions per role.
    scripts: Mutex<BTreeMap<Role, VecDeque<String>>>,
}

impl ScriptedOracle {
    /// An oracle with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `actions` to the script for `role`.
    #[must_use]
    pub fn with_script<I, S>(self, role: Role, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(role)
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Actions still queued for `role`.
    pub fn remaining(&self, role: Role) -> usize {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .map_or(0, VecDeque::len)
    }
}

impl DecisionOracle for ScriptedOracle {
    fn decide(&self, observation: &Observation, _briefing: &str) -> Result<String, OracleError> {
        let next = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&observation.role)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| WAIT_ACTION.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// ResilientOracle
// ---------------------------------------------------------------------------

/// Wraps an oracle with a circuit breaker, retries, and a deadline.
///
/// The backend call is synchronous; a reply that arrives after the
/// deadline is discarded and reported as [`OracleError::Timeout`].
pub struct ResilientOracle<O> {
    /// The wrapped oracle.
    inner: O,
    /// Shared breaker guarding the backend.
    breaker: Arc<CircuitBreaker>,
    /// Retry policy between failed calls.
    retry: RetryStrategy,
    /// Per-call deadline.
    timeout: Duration,
    /// Sleep used between retries.
    sleep: fn(Duration),
}

impl<O: DecisionOracle> ResilientOracle<O> {
    /// Wrap `inner` using the breaker and retry settings from `config`.
    pub fn new(inner: O, config: &OracleConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_threshold,
            Duration::from_millis(config.breaker_recovery_ms),
        ));
        Self::with_breaker(inner, config, breaker)
    }

    /// Wrap `inner` around an existing breaker, e.g. one registered with
    /// the error recovery manager.
    pub fn with_breaker(inner: O, config: &OracleConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            breaker,
            retry: RetryStrategy::new(
                config.max_retries,
                Duration::from_millis(config.base_delay_ms),
                Duration::from_millis(config.max_delay_ms),
                2.0,
            ),
            timeout: Duration::from_millis(config.timeout_ms),
            sleep: std::thread::sleep,
        }
    }

    /// Replace the sleep used between retries.
    #[must_use]
    pub const fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// The breaker guarding the backend.
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// One guarded call with the deadline applied.
    fn attempt(&self, observation: &Observation, briefing: &str) -> Result<String, OracleError> {
        let started = Instant::now();
        let result = self.breaker.call(|| {
            let reply = self.inner.decide(observation, briefing)?;
            if started.elapsed() > self.timeout {
                return Err(OracleError::Timeout {
                    agent_id: observation.agent,
                    deadline_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(reply)
        });
        match result {
            Ok(reply) => Ok(reply),
            Err(BreakerError::Open) => Err(OracleError::CircuitOpen),
            Err(BreakerError::Failed(err)) => Err(err),
        }
    }
}

impl<O: DecisionOracle> DecisionOracle for ResilientOracle<O> {
    fn decide(&self, observation: &Observation, briefing: &str) -> Result<String, OracleError> {
        self.retry.execute_if(
            |attempt| {
                debug!(agent_id = %observation.agent, attempt, "Calling decision oracle");
                self.attempt(observation, briefing)
            },
            |err| !matches!(err, OracleError::CircuitOpen),
            self.sleep,
        )
    }
}

impl<O> std::fmt::Debug for ResilientOracle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientOracle")
            .field("breaker", &self.breaker.state())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use waypoint_resilience::BreakerState;
    use waypoint_world::Grid;

    use super::*;

    fn observation(role: Role) -> Observation {
        let grid = Grid::new(3, 3).unwrap();
        Observation::capture(&grid, AgentId::new(), role, 0, &[], &[])
    }

    const fn no_sleep(_: Duration) {}

    /// Fails the first `failures` calls, then answers `OBSERVE`.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl DecisionOracle for Flaky {
        fn decide(&self, _: &Observation, _: &str) -> Result<String, OracleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(OracleError::Unavailable {
                    message: String::from("connection refused"),
                })
            } else {
                Ok(String::from("OBSERVE"))
            }
        }
    }

    #[test]
    fn stub_waits() {
        let stub = StubOracle::new();
        assert_eq!(stub.decide(&observation(Role::Scout), "").ok().as_deref(), Some("WAIT"));
    }

    #[test]
    fn scripted_replays_per_role_then_waits() {
        let oracle = ScriptedOracle::new()
            .with_script(Role::Scout, ["MOVE east", "OBSERVE"])
            .with_script(Role::Builder, ["BUILD 1,1"]);
        let scout = observation(Role::Scout);
        assert_eq!(oracle.decide(&scout, "").ok().as_deref(), Some("MOVE east"));
        assert_eq!(oracle.decide(&observation(Role::Builder), "").ok().as_deref(), Some("BUILD 1,1"));
        assert_eq!(oracle.decide(&scout, "").ok().as_deref(), Some("OBSERVE"));
        assert_eq!(oracle.decide(&scout, "").ok().as_deref(), Some("WAIT"));
        assert_eq!(oracle.remaining(Role::Scout), 0);
    }

    #[test]
    fn resilient_retries_through_transient_failures() {
        let config = OracleConfig::default();
        let oracle = ResilientOracle::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            &config,
        )
        .with_sleep(no_sleep);
        assert_eq!(oracle.decide(&observation(Role::Scout), "").ok().as_deref(), Some("OBSERVE"));
        assert_eq!(oracle.breaker().state(), BreakerState::Closed);
    }

    #[test]
    fn resilient_gives_up_and_caller_waits() {
        let config = OracleConfig {
            max_retries: 1,
            breaker_threshold: 10,
            ..OracleConfig::default()
        };
        let oracle = ResilientOracle::new(
            Flaky {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            },
            &config,
        )
        .with_sleep(no_sleep);
        let (action, err) = decide_or_wait(&oracle, &observation(Role::Scout), "");
        assert_eq!(action, WAIT_ACTION);
        assert!(matches!(err, Some(OracleError::Unavailable { .. })));
        assert_eq!(oracle.breaker().failure_count(), 2);
    }

    #[test]
    fn open_breaker_reports_circuit_open() {
        let config = OracleConfig {
            max_retries: 0,
            breaker_threshold: 1,
            ..OracleConfig::default()
        };
        let oracle = ResilientOracle::new(
            Flaky {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            },
            &config,
        )
        .with_sleep(no_sleep);
        let obs = observation(Role::Scout);
        assert!(matches!(oracle.decide(&obs, ""), Err(OracleError::Unavailable { .. })));
        assert_eq!(oracle.decide(&obs, ""), Err(OracleError::CircuitOpen));
    }

    static OPEN_CIRCUIT_SLEEPS: AtomicU32 = AtomicU32::new(0);

    fn count_sleep(_: Duration) {
        OPEN_CIRCUIT_SLEEPS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn open_breaker_fails_fast_without_backoff() {
        let config = OracleConfig {
            breaker_threshold: 1,
            ..OracleConfig::default()
        };
        let oracle = ResilientOracle::new(
            Flaky {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            },
            &config,
        )
        .with_sleep(count_sleep);
        let obs = observation(Role::Scout);

        // The first failure opens the circuit; the retry after one backoff
        // finds it open and stops there.
        assert_eq!(oracle.decide(&obs, ""), Err(OracleError::CircuitOpen));
        assert_eq!(OPEN_CIRCUIT_SLEEPS.load(Ordering::SeqCst), 1);

        assert_eq!(oracle.decide(&obs, ""), Err(OracleError::CircuitOpen));
        assert_eq!(OPEN_CIRCUIT_SLEEPS.load(Ordering::SeqCst), 1);
        assert_eq!(oracle.inner.calls.load(Ordering::SeqCst), 1);
    }
}
