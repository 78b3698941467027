//! Resilience utilities for the Waypoint coordination core.
//!
//! Failures at the tick boundary are classified into an [`ErrorCategory`]
//! and [`Severity`] and handed to the [`ErrorRecoveryManager`], which records
//! them and picks a recovery action. Calls to flaky collaborators (the
//! decision oracle) go through a [`CircuitBreaker`] and a [`RetryStrategy`].
//!
//! # Modules
//!
//! - [`breaker`] -- [`CircuitBreaker`] and [`BreakerState`]
//! - [`recovery`] -- [`ErrorRecoveryManager`] and error statistics
//! - [`retry`] -- [`RetryStrategy`] with capped exponential backoff
//! - [`taxonomy`] -- Error categories, severities, and events

pub mod breaker;
pub mod recovery;
pub mod retry;
pub mod taxonomy;

pub use breaker::{BreakerError, BreakerState, CircuitBreaker};
pub use recovery::{
    ErrorRecoveryManager, ErrorStatistics, RecoveryAction, RecoveryHandler, RecoveryOutcome,
    default_strategy,
};
pub use retry::RetryStrategy;
pub use taxonomy::{ErrorCategory, ErrorEvent, Severity};
