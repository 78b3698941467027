//! Error types for the `waypoint-coordination` crate.
//!
//! A full queue or an under-stocked pool is an expected outcome and is
//! reported as `false`, not as an error.

use waypoint_types::ResourceKind;

/// Errors that can occur in the coordination layer.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of the operation that overflowed.
        context: String,
    },

    /// No resolver is registered for a conflict type.
    #[error("no resolver registered for conflict type '{0}'")]
    UnknownResolver(String),

    /// A resource request carried missing or malformed metadata.
    #[error("malformed resource request: {0}")]
    MalformedRequest(String),

    /// The allocation ledger no longer balances against the pool baseline.
    #[error("conservation violated for {resource}: expected {expected}, found {actual}")]
    ConservationViolated {
        /// The affected resource.
        resource: ResourceKind,
        /// Baseline: initial stock plus replenishments.
        expected: u64,
        /// Pool plus all ledger balances.
        actual: u64,
    },
}
