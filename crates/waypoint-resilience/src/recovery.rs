//! The error recovery manager.
//!
//! Every error handed to [`ErrorRecoveryManager::handle_error`] is recorded
//! as an [`ErrorEvent`], counted towards its `category_kind` pattern, and
//! passed to the recovery handler for its category. The handler's verdict
//! decides whether the caller may carry on.
//!
//! Default policy by category:
//!
//! | Category | Action | Recovers |
//! |---|---|---|
//! | Network, `DecisionOracle`, Timeout | retry with backoff | yes (oracle auth errors: no) |
//! | `ActorLogic`, `GridOperation`, Coordination, `ResourceManagement` | continue | yes |
//! | `StateCorruption` | refuse and flag | never |

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::retry::RetryStrategy;
use crate::taxonomy::{ErrorCategory, ErrorEvent, Severity};

/// Default number of events kept in the history.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Number of patterns surfaced in [`ErrorStatistics::top_patterns`].
const TOP_PATTERNS: usize = 5;

/// Decides whether an error of one category was recovered from.
pub type RecoveryHandler = Box<dyn Fn(&ErrorEvent) -> bool + Send + Sync>;

/// What the caller should do after an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Retry the failed operation with this strategy.
    Retry(RetryStrategy),
    /// Skip the failed operation and carry on.
    Continue,
    /// Stop and flag for external intervention.
    Refuse,
}

/// The result of handling one error.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    /// The recorded event.
    pub event: ErrorEvent,
    /// What the caller should do.
    pub action: RecoveryAction,
    /// Whether the handler reported success.
    pub recovered: bool,
}

impl RecoveryOutcome {
    /// Whether this failure must propagate to the caller: recovery failed
    /// and the severity is High or Critical.
    pub const fn must_propagate(&self) -> bool {
        !self.recovered && self.event.severity.is_severe()
    }
}

/// Aggregate error statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Events in the history.
    pub total_errors: usize,
    /// Events recorded in the last hour.
    pub errors_last_hour: usize,
    /// Event count per severity.
    pub severity_distribution: BTreeMap<Severity, usize>,
    /// Event count per category.
    pub category_distribution: BTreeMap<ErrorCategory, usize>,
    /// Recovery handlers run.
    pub recovery_attempts: u64,
    /// Recovery handlers that reported success.
    pub recovery_successes: u64,
    /// `recovery_successes / recovery_attempts`, or 0 with no attempts.
    pub recovery_rate: f64,
    /// Most frequent patterns, most frequent first.
    pub top_patterns: Vec<(String, u64)>,
    /// State of every named breaker.
    pub breaker_states: BTreeMap<String, BreakerState>,
}

/// Records errors and runs category-specific recovery.
pub struct ErrorRecoveryManager {
    /// Recent events, oldest first.
    history: VecDeque<ErrorEvent>,
    /// Maximum events kept.
    history_limit: usize,
    /// Retry policy per category.
    retry_strategies: BTreeMap<ErrorCategory, RetryStrategy>,
    /// Recovery handler per category.
    handlers: BTreeMap<ErrorCategory, RecoveryHandler>,
    /// Occurrences per `category_kind` pattern.
    patterns: BTreeMap<String, u64>,
    /// Named circuit breakers.
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
    /// Recovery handlers run.
    recovery_attempts: u64,
    /// Recovery handlers that reported success.
    recovery_successes: u64,
}

impl ErrorRecoveryManager {
    /// A manager with the default strategies and handlers.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// A manager keeping at most `history_limit` events.
    pub fn with_history_limit(history_limit: usize) -> Self {
        let retry_strategies = ErrorCategory::ALL
            .into_iter()
            .map(|category| (category, default_strategy(category)))
            .collect();

        let mut handlers: BTreeMap<ErrorCategory, RecoveryHandler> = BTreeMap::new();
        for category in ErrorCategory::ALL {
            let handler: RecoveryHandler = match category {
                ErrorCategory::StateCorruption => Box::new(|_: &ErrorEvent| false),
                ErrorCategory::DecisionOracle => Box::new(|event: &ErrorEvent| {
                    !event.message.to_lowercase().contains("auth")
                }),
                _ => Box::new(|_: &ErrorEvent| true),
            };
            handlers.insert(category, handler);
        }

        Self {
            history: VecDeque::new(),
            history_limit,
            retry_strategies,
            handlers,
            patterns: BTreeMap::new(),
            breakers: BTreeMap::new(),
            recovery_attempts: 0,
            recovery_successes: 0,
        }
    }

    /// Replace the recovery handler for `category`.
    pub fn set_handler(&mut self, category: ErrorCategory, handler: RecoveryHandler) {
        self.handlers.insert(category, handler);
    }

    /// Replace the retry strategy for `category`.
    pub fn set_retry_strategy(&mut self, category: ErrorCategory, strategy: RetryStrategy) {
        self.retry_strategies.insert(category, strategy);
    }

    /// The retry strategy for `category`.
    pub fn retry_strategy(&self, category: ErrorCategory) -> RetryStrategy {
        self.retry_strategies
            .get(&category)
            .copied()
            .unwrap_or_else(|| default_strategy(category))
    }

    /// The named breaker, created with defaults on first use.
    pub fn breaker(&mut self, name: &str) -> Arc<CircuitBreaker> {
        Arc::clone(
            self.breakers
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(CircuitBreaker::default())),
        )
    }

    /// Register an existing breaker under `name`.
    pub fn register_breaker(&mut self, name: impl Into<String>, breaker: Arc<CircuitBreaker>) {
        self.breakers.insert(name.into(), breaker);
    }

    /// Record `event`, run its category's recovery handler, and report what
    /// the caller should do.
    pub fn handle_error(&mut self, mut event: ErrorEvent) -> RecoveryOutcome {
        let pattern = event.pattern();
        let count = self.patterns.entry(pattern).or_insert(0);
        *count = count.saturating_add(1);

        let recovered = match self.handlers.get(&event.category) {
            Some(handler) => {
                self.recovery_attempts = self.recovery_attempts.saturating_add(1);
                event.recovery_attempted = true;
                handler(&event)
            }
            None => {
                warn!(category = %event.category, "No recovery handler for category");
                false
            }
        };
        if recovered {
            self.recovery_successes = self.recovery_successes.saturating_add(1);
        }
        event.recovery_successful = recovered;

        let action = if !recovered || event.category == ErrorCategory::StateCorruption {
            RecoveryAction::Refuse
        } else {
            match event.category {
                ErrorCategory::Network | ErrorCategory::DecisionOracle | ErrorCategory::Timeout => {
                    RecoveryAction::Retry(self.retry_strategy(event.category))
                }
                _ => RecoveryAction::Continue,
            }
        };

        match event.severity {
            Severity::Critical | Severity::High => error!(
                category = %event.category,
                severity = %event.severity,
                recovered,
                message = %event.message,
                "Error handled"
            ),
            Severity::Medium => warn!(
                category = %event.category,
                recovered,
                message = %event.message,
                "Error handled"
            ),
            Severity::Low => info!(
                category = %event.category,
                recovered,
                message = %event.message,
                "Error handled"
            ),
        }

        if self.history_limit > 0 {
            while self.history.len() >= self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());
        }

        RecoveryOutcome {
            event,
            action,
            recovered,
        }
    }

    /// Run `op` with the retry strategy for `category`, sleeping between
    /// attempts. The final error, if any, is recorded at `severity`.
    ///
    /// # Errors
    ///
    /// Returns the last error when every attempt fails.
    pub fn retry<T, E, F>(
        &mut self,
        category: ErrorCategory,
        severity: Severity,
        op: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: core::fmt::Display,
    {
        self.retry_with(category, severity, op, std::thread::sleep)
    }

    /// Like [`ErrorRecoveryManager::retry`], with the sleep supplied by the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns the last error when every attempt fails.
    pub fn retry_with<T, E, F, S>(
        &mut self,
        category: ErrorCategory,
        severity: Severity,
        op: F,
        sleep: S,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        S: FnMut(Duration),
        E: core::fmt::Display,
    {
        let strategy = self.retry_strategy(category);
        let result = strategy.execute_with(op, sleep);
        if let Err(err) = &result {
            self.handle_error(ErrorEvent::new(
                category,
                severity,
                "retries_exhausted",
                err.to_string(),
            ));
        }
        result
    }

    /// Recorded events, oldest first.
    pub const fn history(&self) -> &VecDeque<ErrorEvent> {
        &self.history
    }

    /// Occurrences per pattern.
    pub const fn patterns(&self) -> &BTreeMap<String, u64> {
        &self.patterns
    }

    /// Aggregate statistics for observability.
    pub fn statistics(&self) -> ErrorStatistics {
        let cutoff = Utc::now()
            .checked_sub_signed(TimeDelta::hours(1))
            .unwrap_or_else(Utc::now);

        let mut severity_distribution = BTreeMap::new();
        let mut category_distribution = BTreeMap::new();
        let mut errors_last_hour = 0_usize;
        for event in &self.history {
            let sev = severity_distribution.entry(event.severity).or_insert(0_usize);
            *sev = sev.saturating_add(1);
            let cat = category_distribution.entry(event.category).or_insert(0_usize);
            *cat = cat.saturating_add(1);
            if event.timestamp >= cutoff {
                errors_last_hour = errors_last_hour.saturating_add(1);
            }
        }

        let mut top_patterns: Vec<(String, u64)> = self
            .patterns
            .iter()
            .map(|(pattern, count)| (pattern.clone(), *count))
            .collect();
        top_patterns.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_patterns.truncate(TOP_PATTERNS);

        ErrorStatistics {
            total_errors: self.history.len(),
            errors_last_hour,
            severity_distribution,
            category_distribution,
            recovery_attempts: self.recovery_attempts,
            recovery_successes: self.recovery_successes,
            recovery_rate: ratio(self.recovery_successes, self.recovery_attempts),
            top_patterns,
            breaker_states: self
                .breakers
                .iter()
                .map(|(name, breaker)| (name.clone(), breaker.state()))
                .collect(),
        }
    }
}

impl Default for ErrorRecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorRecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecoveryManager")
            .field("history_len", &self.history.len())
            .field("history_limit", &self.history_limit)
            .field("patterns", &self.patterns)
            .field("breakers", &self.breakers.keys().collect::<Vec<_>>())
            .field("recovery_attempts", &self.recovery_attempts)
            .field("recovery_successes", &self.recovery_successes)
            .finish_non_exhaustive()
    }
}

/// Default retry policy per category.
pub const fn default_strategy(category: ErrorCategory) -> RetryStrategy {
    let (retries, base_ms) = match category {
        ErrorCategory::Network | ErrorCategory::Coordination => (3, 1000),
        ErrorCategory::DecisionOracle => (2, 2000),
        ErrorCategory::ActorLogic => (1, 500),
        ErrorCategory::GridOperation => (2, 100),
        ErrorCategory::ResourceManagement => (2, 500),
        ErrorCategory::StateCorruption => (1, 5000),
        ErrorCategory::Timeout => (2, 1000),
    };
    RetryStrategy::with_base(retries, Duration::from_millis(base_ms))
}

/// `num / den` as a float, 0 when `den` is 0.
// Counters stay far below 2^52 in practice.
#[allow(clippy::cast_precision_loss)]
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        return 0.0;
    }
    num as f64 / den as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_corruption_is_never_recovered() {
        let mut manager = ErrorRecoveryManager::new();
        let outcome = manager.handle_error(ErrorEvent::new(
            ErrorCategory::StateCorruption,
            Severity::Critical,
            "audit",
            "ledger drift",
        ));
        assert!(!outcome.recovered);
        assert_eq!(outcome.action, RecoveryAction::Refuse);
        assert!(outcome.must_propagate());
    }

    #[test]
    fn grid_errors_continue() {
        let mut manager = ErrorRecoveryManager::new();
        let outcome = manager.handle_error(ErrorEvent::new(
            ErrorCategory::GridOperation,
            Severity::Medium,
            "overflow",
            "arithmetic overflow",
        ));
        assert!(outcome.recovered);
        assert_eq!(outcome.action, RecoveryAction::Continue);
        assert!(!outcome.must_propagate());
    }

    #[test]
    fn oracle_errors_retry_unless_auth() {
        let mut manager = ErrorRecoveryManager::new();
        let outcome = manager.handle_error(ErrorEvent::new(
            ErrorCategory::DecisionOracle,
            Severity::High,
            "timeout",
            "oracle timed out",
        ));
        assert!(matches!(outcome.action, RecoveryAction::Retry(s) if s.max_retries == 2));

        let outcome = manager.handle_error(ErrorEvent::new(
            ErrorCategory::DecisionOracle,
            Severity::High,
            "unavailable",
            "Authentication failed",
        ));
        assert!(!outcome.recovered);
        assert!(outcome.must_propagate());
    }

    #[test]
    fn statistics_aggregate_events() {
        let mut manager = ErrorRecoveryManager::new();
        for _ in 0..3 {
            manager.handle_error(ErrorEvent::new(
                ErrorCategory::ActorLogic,
                Severity::Low,
                "turn",
                "bad action",
            ));
        }
        manager.handle_error(ErrorEvent::new(
            ErrorCategory::StateCorruption,
            Severity::Critical,
            "audit",
            "drift",
        ));
        let _ = manager.breaker("oracle");

        let stats = manager.statistics();
        assert_eq!(stats.total_errors, 4);
        assert_eq!(stats.errors_last_hour, 4);
        assert_eq!(stats.recovery_attempts, 4);
        assert_eq!(stats.recovery_successes, 3);
        assert!((stats.recovery_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(
            stats.top_patterns.first(),
            Some(&(String::from("actor_logic_turn"), 3))
        );
        assert_eq!(stats.category_distribution.get(&ErrorCategory::ActorLogic), Some(&3));
        assert_eq!(stats.breaker_states.get("oracle"), Some(&BreakerState::Closed));
    }

    #[test]
    fn history_is_bounded() {
        let mut manager = ErrorRecoveryManager::with_history_limit(2);
        for i in 0..5 {
            manager.handle_error(ErrorEvent::new(
                ErrorCategory::Coordination,
                Severity::Low,
                "queue",
                format!("e{i}"),
            ));
        }
        assert_eq!(manager.history().len(), 2);
        assert_eq!(manager.history().back().map(|e| e.message.as_str()), Some("e4"));
        assert_eq!(manager.patterns().get("coordination_queue"), Some(&5));
    }

    #[test]
    fn retry_records_exhaustion() {
        let mut manager = ErrorRecoveryManager::new();
        let result: Result<(), String> = manager.retry_with(
            ErrorCategory::GridOperation,
            Severity::Low,
            |_| Err(String::from("still broken")),
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(manager.history().len(), 1);
        assert!(manager.patterns().contains_key("grid_operation_retries_exhausted"));
    }

    #[test]
    fn breakers_are_shared_by_name() {
        let mut manager = ErrorRecoveryManager::new();
        let a = manager.breaker("oracle");
        let b = manager.breaker("oracle");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
