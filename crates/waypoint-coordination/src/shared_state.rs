//! Shared state beyond the grid: the resource pool and allocation ledger,
//! actor capabilities, task dependencies, and free-form metrics.
//!
//! # Conservation
//!
//! For every resource kind, pool availability plus the sum of all actor
//! ledger balances equals the recorded baseline (initial stock plus every
//! [`SharedState::replenish`]). Allocation and release move units between
//! the pool and a ledger entry under one critical section, so the invariant
//! holds for any interleaving of concurrent callers. [`SharedState::audit`]
//! re-checks it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use waypoint_types::{AgentId, ResourceKind, Role};

use crate::error::CoordinationError;

/// Default capability tags for each role.
pub const fn role_capabilities(role: Role) -> &'static [&'static str] {
    match role {
        Role::Scout => &["exploration", "reconnaissance", "pathfinding"],
        Role::Builder => &["construction", "resource_management", "engineering"],
        Role::Strategist => &["planning", "coordination", "analysis"],
    }
}

/// Outcome of a conservation audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditResult {
    /// Every resource balances against its baseline.
    Balanced,
    /// One or more resources have drifted.
    Imbalanced {
        /// Resource to `(expected, actual)` totals.
        imbalances: BTreeMap<ResourceKind, (u64, u64)>,
    },
}

impl AuditResult {
    /// Whether the audit found no drift.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }

    /// Convert into a `Result`, reporting the first imbalance as an error.
    pub fn into_result(self) -> Result<(), CoordinationError> {
        match self {
            Self::Balanced => Ok(()),
            Self::Imbalanced { imbalances } => {
                match imbalances.into_iter().next() {
                    Some((resource, (expected, actual))) => {
                        Err(CoordinationError::ConservationViolated {
                            resource,
                            expected,
                            actual,
                        })
                    }
                    None => Ok(()),
                }
            }
        }
    }
}

/// A task with prerequisite tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskEntry {
    /// Tasks that must complete first.
    depends_on: BTreeSet<String>,
    /// Whether this task has completed.
    completed: bool,
}

/// State held inside the mutex.
#[derive(Debug, Default)]
struct StateInner {
    /// Available units per resource kind.
    pool: BTreeMap<ResourceKind, u32>,
    /// Initial stock plus replenishments, per resource kind.
    baseline: BTreeMap<ResourceKind, u64>,
    /// Units held per actor and resource kind.
    ledger: BTreeMap<AgentId, BTreeMap<ResourceKind, u32>>,
    /// Capability tags per actor.
    capabilities: BTreeMap<AgentId, BTreeSet<String>>,
    /// Task dependency graph.
    tasks: BTreeMap<String, TaskEntry>,
    /// Free-form numeric metrics.
    metrics: BTreeMap<String, f64>,
}

impl StateInner {
    /// Tasks not yet completed whose prerequisites have all completed.
    fn available_tasks(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.completed)
            .filter(|(_, task)| {
                task.depends_on
                    .iter()
                    .all(|dep| self.tasks.get(dep).is_some_and(|d| d.completed))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Thread-safe shared state. Share via `Arc<SharedState>`.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Mutable state protected by a mutex.
    inner: Mutex<StateInner>,
}

impl SharedState {
    /// Create shared state with an initial resource pool.
    pub fn new(initial_pool: &BTreeMap<ResourceKind, u32>) -> Self {
        let inner = StateInner {
            pool: initial_pool.clone(),
            baseline: initial_pool
                .iter()
                .map(|(kind, amount)| (*kind, u64::from(*amount)))
                .collect(),
            ..StateInner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Lock the inner state, recovering from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------
    // Resource pool and ledger
    // -------------------------------------------------------------------

    /// Move `amount` of `kind` from the pool to `agent`'s ledger.
    ///
    /// Returns `false` and changes nothing if the pool holds less than
    /// `amount`.
    pub fn allocate_resource(&self, agent: AgentId, kind: ResourceKind, amount: u32) -> bool {
        let mut inner = self.lock();
        let available = inner.pool.get(&kind).copied().unwrap_or(0);
        let Some(remaining) = available.checked_sub(amount) else {
            debug!(%agent, %kind, amount, available, "Allocation refused: insufficient pool");
            return false;
        };
        let held = inner
            .ledger
            .get(&agent)
            .and_then(|resources| resources.get(&kind))
            .copied()
            .unwrap_or(0);
        let Some(new_held) = held.checked_add(amount) else {
            return false;
        };

        inner.pool.insert(kind, remaining);
        inner.ledger.entry(agent).or_default().insert(kind, new_held);
        info!(%agent, %kind, amount, remaining, "Allocated resource");
        true
    }

    /// Return up to `amount` of `kind` from `agent`'s ledger to the pool.
    ///
    /// Returns the number of units actually released.
    pub fn release_resource(&self, agent: AgentId, kind: ResourceKind, amount: u32) -> u32 {
        let mut inner = self.lock();
        let held = inner
            .ledger
            .get(&agent)
            .and_then(|resources| resources.get(&kind))
            .copied()
            .unwrap_or(0);
        let released = held.min(amount);
        if released == 0 {
            return 0;
        }
        let pool = inner.pool.get(&kind).copied().unwrap_or(0);
        let Some(new_pool) = pool.checked_add(released) else {
            return 0;
        };

        inner.pool.insert(kind, new_pool);
        if let Some(resources) = inner.ledger.get_mut(&agent) {
            resources.insert(kind, held.saturating_sub(released));
        }
        info!(%agent, %kind, released, "Released resource");
        released
    }

    /// Add externally produced units to the pool, raising the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::ArithmeticOverflow`] if the pool would
    /// overflow.
    pub fn replenish(&self, kind: ResourceKind, amount: u32) -> Result<(), CoordinationError> {
        let mut inner = self.lock();
        let pool = inner.pool.get(&kind).copied().unwrap_or(0);
        let new_pool = pool
            .checked_add(amount)
            .ok_or_else(|| CoordinationError::ArithmeticOverflow {
                context: format!("replenishing {kind}"),
            })?;
        let baseline = inner.baseline.get(&kind).copied().unwrap_or(0);
        let new_baseline = baseline.checked_add(u64::from(amount)).ok_or_else(|| {
            CoordinationError::ArithmeticOverflow {
                context: format!("baseline for {kind}"),
            }
        })?;
        inner.pool.insert(kind, new_pool);
        inner.baseline.insert(kind, new_baseline);
        Ok(())
    }

    /// Units of `kind` currently available in the pool.
    pub fn available(&self, kind: ResourceKind) -> u32 {
        self.lock().pool.get(&kind).copied().unwrap_or(0)
    }

    /// A copy of the pool.
    pub fn pool(&self) -> BTreeMap<ResourceKind, u32> {
        self.lock().pool.clone()
    }

    /// Units held by `agent`, per resource kind.
    pub fn get_agent_resources(&self, agent: AgentId) -> BTreeMap<ResourceKind, u32> {
        self.lock().ledger.get(&agent).cloned().unwrap_or_default()
    }

    /// Check pool plus ledger against the baseline for every resource.
    pub fn audit(&self) -> AuditResult {
        let inner = self.lock();
        let kinds: BTreeSet<ResourceKind> = inner
            .baseline
            .keys()
            .chain(inner.pool.keys())
            .copied()
            .collect();

        let mut imbalances = BTreeMap::new();
        for kind in kinds {
            let expected = inner.baseline.get(&kind).copied().unwrap_or(0);
            let pooled = u64::from(inner.pool.get(&kind).copied().unwrap_or(0));
            let held = inner
                .ledger
                .values()
                .filter_map(|resources| resources.get(&kind))
                .fold(0_u64, |acc, amount| acc.saturating_add(u64::from(*amount)));
            let actual = pooled.saturating_add(held);
            if actual != expected {
                imbalances.insert(kind, (expected, actual));
            }
        }

        if imbalances.is_empty() {
            AuditResult::Balanced
        } else {
            AuditResult::Imbalanced { imbalances }
        }
    }

    // -------------------------------------------------------------------
    // Capabilities
    // -------------------------------------------------------------------

    /// Add capability tags for `agent`.
    pub fn register_capabilities<I, S>(&self, agent: AgentId, capabilities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .capabilities
            .entry(agent)
            .or_default()
            .extend(capabilities.into_iter().map(Into::into));
    }

    /// Capability tags registered for `agent`.
    pub fn capabilities_of(&self, agent: AgentId) -> BTreeSet<String> {
        self.lock()
            .capabilities
            .get(&agent)
            .cloned()
            .unwrap_or_default()
    }

    /// Actors that registered `capability`.
    pub fn agents_with_capability(&self, capability: &str) -> Vec<AgentId> {
        self.lock()
            .capabilities
            .iter()
            .filter(|(_, tags)| tags.contains(capability))
            .map(|(agent, _)| *agent)
            .collect()
    }

    // -------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------

    /// Register a task and its prerequisites. Re-adding a task replaces its
    /// prerequisites and marks it pending.
    pub fn add_task<I, S>(&self, task_id: impl Into<String>, depends_on: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().tasks.insert(
            task_id.into(),
            TaskEntry {
                depends_on: depends_on.into_iter().map(Into::into).collect(),
                completed: false,
            },
        );
    }

    /// Mark a task completed and return the pending tasks that are now
    /// ready. Unknown tasks return an empty list.
    pub fn complete_task(&self, task_id: &str) -> Vec<String> {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return Vec::new();
        };
        task.completed = true;
        inner.available_tasks()
    }

    /// Pending tasks whose prerequisites have all completed.
    pub fn available_tasks(&self) -> Vec<String> {
        self.lock().available_tasks()
    }

    // -------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------

    /// Set a metric value.
    pub fn update_metric(&self, name: impl Into<String>, value: f64) {
        self.lock().metrics.insert(name.into(), value);
    }

    /// A copy of all metrics.
    pub fn get_metrics(&self) -> BTreeMap<String, f64> {
        self.lock().metrics.clone()
    }
}
