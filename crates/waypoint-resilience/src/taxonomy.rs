//! Error taxonomy: categories, severities, and recorded error events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transport failures.
    Network,
    /// The external decision oracle failed or misbehaved.
    DecisionOracle,
    /// An actor's turn logic failed.
    ActorLogic,
    /// An unexpected grid failure (not an occupied cell).
    GridOperation,
    /// Message routing or conflict resolution failed.
    Coordination,
    /// Pool or ledger bookkeeping failed.
    ResourceManagement,
    /// Shared state no longer satisfies its invariants.
    StateCorruption,
    /// A bounded wait elapsed.
    Timeout,
}

impl ErrorCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Network,
        Self::DecisionOracle,
        Self::ActorLogic,
        Self::GridOperation,
        Self::Coordination,
        Self::ResourceManagement,
        Self::StateCorruption,
        Self::Timeout,
    ];

    /// Snake-case name used in pattern keys and statistics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::DecisionOracle => "decision_oracle",
            Self::ActorLogic => "actor_logic",
            Self::GridOperation => "grid_operation",
            Self::Coordination => "coordination",
            Self::ResourceManagement => "resource_management",
            Self::StateCorruption => "state_corruption",
            Self::Timeout => "timeout",
        }
    }
}

impl core::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic; nothing lost.
    Low,
    /// A turn or operation was skipped.
    Medium,
    /// The tick result is unreliable.
    High,
    /// Shared state may be inconsistent.
    Critical,
}

impl Severity {
    /// High and Critical failures propagate when recovery fails.
    pub const fn is_severe(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// A recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Error category.
    pub category: ErrorCategory,
    /// Error severity.
    pub severity: Severity,
    /// Short machine-readable error kind, e.g. `timeout`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Extra key/value context (actor id, tick, phase).
    pub context: BTreeMap<String, String>,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
    /// Whether a recovery handler ran.
    pub recovery_attempted: bool,
    /// Whether recovery succeeded.
    pub recovery_successful: bool,
}

impl ErrorEvent {
    /// A new, not yet handled event stamped now.
    pub fn new(
        category: ErrorCategory,
        severity: Severity,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            kind: kind.into(),
            message: message.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
            recovery_attempted: false,
            recovery_successful: false,
        }
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Pattern key, `category_kind`.
    pub fn pattern(&self) -> String {
        format!("{}_{}", self.category, self.kind)
    }
}
