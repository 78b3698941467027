//! Conflict descriptors and the pluggable resolver registry.
//!
//! Detection aggregates outstanding resource requests per resource kind and
//! flags every kind whose summed demand exceeds what the pool holds.
//! Resolution is looked up by conflict type in a [`ResolverRegistry`]; each
//! resolver may allocate through [`SharedState`] and returns follow-up
//! messages for the coordination queue.
//!
//! Default resolvers:
//!
//! - `resource_conflict` -- serve claims by priority (highest first), then
//!   arrival, granting each in full while the pool lasts.
//! - `spatial_conflict`, `task_conflict` -- no follow-ups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_types::{AgentId, Message, MessageId, MessageKind, Priority, ResourceKind};

use crate::error::CoordinationError;
use crate::shared_state::SharedState;

/// Conflict type for over-subscribed resources.
pub const RESOURCE_CONFLICT: &str = "resource_conflict";

/// Conflict type for contested cells.
pub const SPATIAL_CONFLICT: &str = "spatial_conflict";

/// Conflict type for contested task assignments.
pub const TASK_CONFLICT: &str = "task_conflict";

/// One outstanding request for resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClaim {
    /// The request message.
    pub message_id: MessageId,
    /// The requesting actor.
    pub agent: AgentId,
    /// The requested resource.
    pub kind: ResourceKind,
    /// Units requested.
    pub amount: u32,
    /// Request priority.
    pub priority: Priority,
    /// When the request was created.
    pub requested_at: DateTime<Utc>,
}

impl ResourceClaim {
    /// Read a claim from a resource-request message's `resource_type` and
    /// `amount` metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::MalformedRequest`] when either entry is
    /// missing or unparsable.
    pub fn from_message(message: &Message) -> Result<Self, CoordinationError> {
        let kind = message
            .metadata
            .get("resource_type")
            .and_then(|raw| ResourceKind::parse(raw))
            .ok_or_else(|| {
                CoordinationError::MalformedRequest(String::from("missing or unknown resource_type"))
            })?;
        let amount = message
            .metadata
            .get("amount")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                CoordinationError::MalformedRequest(String::from("missing or invalid amount"))
            })?;
        Ok(Self {
            message_id: message.id,
            agent: message.sender,
            kind,
            amount,
            priority: message.priority,
            requested_at: message.created_at,
        })
    }
}

/// A detected conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict type used to pick a resolver.
    pub conflict_type: String,
    /// The contested resource, for resource conflicts.
    pub resource: Option<ResourceKind>,
    /// Summed demand across all claims.
    pub demand: u64,
    /// Pool availability at detection time.
    pub available: u32,
    /// The claims involved, in arrival order.
    pub claims: Vec<ResourceClaim>,
}

/// Aggregate claims per resource kind and flag every kind whose demand
/// exceeds `pool` availability.
pub fn detect_resource_conflicts(
    claims: &[ResourceClaim],
    pool: &BTreeMap<ResourceKind, u32>,
) -> Vec<Conflict> {
    let mut by_kind: BTreeMap<ResourceKind, Vec<ResourceClaim>> = BTreeMap::new();
    for claim in claims {
        by_kind.entry(claim.kind).or_default().push(claim.clone());
    }

    by_kind
        .into_iter()
        .filter_map(|(kind, claims)| {
            let demand = claims
                .iter()
                .fold(0_u64, |acc, claim| acc.saturating_add(u64::from(claim.amount)));
            let available = pool.get(&kind).copied().unwrap_or(0);
            (demand > u64::from(available)).then(|| Conflict {
                conflict_type: String::from(RESOURCE_CONFLICT),
                resource: Some(kind),
                demand,
                available,
                claims,
            })
        })
        .collect()
}

/// A conflict resolver: may act on shared state and returns follow-up
/// messages.
pub type Resolver = Box<dyn Fn(&Conflict, &SharedState) -> Vec<Message> + Send + Sync>;

/// Maps conflict types to resolvers.
pub struct ResolverRegistry {
    /// Registered resolvers by conflict type.
    resolvers: BTreeMap<String, Resolver>,
}

impl ResolverRegistry {
    /// An empty registry.
    pub const fn empty() -> Self {
        Self {
            resolvers: BTreeMap::new(),
        }
    }

    /// A registry holding the three default resolvers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(RESOURCE_CONFLICT, Box::new(resolve_resource_conflict));
        registry.register(SPATIAL_CONFLICT, Box::new(|_: &Conflict, _: &SharedState| Vec::new()));
        registry.register(TASK_CONFLICT, Box::new(|_: &Conflict, _: &SharedState| Vec::new()));
        registry
    }

    /// Register or replace the resolver for `conflict_type`.
    pub fn register(&mut self, conflict_type: impl Into<String>, resolver: Resolver) {
        self.resolvers.insert(conflict_type.into(), resolver);
    }

    /// Resolve one conflict.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::UnknownResolver`] if nothing is
    /// registered for the conflict's type.
    pub fn resolve(
        &self,
        conflict: &Conflict,
        shared: &SharedState,
    ) -> Result<Vec<Message>, CoordinationError> {
        let resolver = self
            .resolvers
            .get(&conflict.conflict_type)
            .ok_or_else(|| CoordinationError::UnknownResolver(conflict.conflict_type.clone()))?;
        Ok(resolver(conflict, shared))
    }

    /// Registered conflict types.
    pub fn conflict_types(&self) -> Vec<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("conflict_types", &self.conflict_types())
            .finish()
    }
}

/// Priority-based reallocation: highest priority first, then earliest
/// request. Each claim is granted in full if the pool still covers it,
/// otherwise deferred. Every requester receives a follow-up message.
pub fn resolve_resource_conflict(conflict: &Conflict, shared: &SharedState) -> Vec<Message> {
    let mut claims: Vec<&ResourceClaim> = conflict.claims.iter().collect();
    claims.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.requested_at.cmp(&b.requested_at))
    });

    claims
        .into_iter()
        .map(|claim| {
            let granted = shared.allocate_resource(claim.agent, claim.kind, claim.amount);
            debug!(agent = %claim.agent, kind = %claim.kind, amount = claim.amount, granted, "Resolved resource claim");
            let content = if granted {
                format!("RESOURCE_GRANTED: {} {}", claim.amount, claim.kind)
            } else {
                format!(
                    "RESOURCE_DEFERRED: {} {} unavailable, retry later",
                    claim.amount, claim.kind
                )
            };
            Message::new(AgentId::COORDINATOR, content)
                .to(claim.agent)
                .with_kind(MessageKind::Coordination)
                .with_priority(claim.priority)
                .in_reply_to(claim.message_id)
                .with_metadata("resource_type", claim.kind.as_str())
                .with_metadata("amount", claim.amount.to_string())
                .with_metadata("granted", granted.to_string())
        })
        .collect()
}
