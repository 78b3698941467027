//! Coordination layer for the Waypoint core.
//!
//! Actors never talk to each other directly. They exchange [`Message`]s
//! through a bounded priority [`MessageQueue`] and draw scarce resources
//! from a [`SharedState`] pool whose allocation ledger obeys a conservation
//! invariant. The [`CoordinationManager`] ties the two together and detects
//! over-subscribed resources from outstanding requests.
//!
//! Each structure has its own lock. No operation holds two of them at once.
//!
//! # Modules
//!
//! - [`conflict`] -- Conflict detection and the pluggable resolver registry
//! - [`error`] -- Error types ([`CoordinationError`])
//! - [`manager`] -- [`CoordinationManager`]
//! - [`queue`] -- [`MessageQueue`] with ack tracking and history
//! - [`shared_state`] -- Resource pool, ledger, capabilities, tasks, metrics
//!
//! [`Message`]: waypoint_types::Message

pub mod conflict;
pub mod error;
pub mod manager;
pub mod queue;
pub mod shared_state;

pub use conflict::{
    Conflict, RESOURCE_CONFLICT, Resolver, ResolverRegistry, ResourceClaim, SPATIAL_CONFLICT,
    TASK_CONFLICT,
};
pub use error::CoordinationError;
pub use manager::CoordinationManager;
pub use queue::{DEFAULT_HISTORY_CAPACITY, DEFAULT_HISTORY_LIMIT, DEFAULT_QUEUE_CAPACITY, MessageQueue};
pub use shared_state::{AuditResult, SharedState, role_capabilities};
