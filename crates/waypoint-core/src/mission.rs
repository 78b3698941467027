//! Mission state and the phase transition function.
//!
//! The mission walks `Init -> Exploration -> Analysis -> Construction`, then
//! either straight to `Completion` or through `Optimization` first. The
//! only backward edge is Construction looping back to Analysis every
//! `analysis_revisit_interval` construction ticks to fetch a fresh build
//! order. `Completion` is terminal.
//!
//! [`next_phase`] is a pure function of the current phase, the tick's
//! [`PhaseSignals`], and the [`MissionConfig`]; [`MissionState`] keeps the
//! counters that feed it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use waypoint_types::{AgentId, Phase};

use crate::config::MissionConfig;

/// Metric name for exploration coverage.
pub const METRIC_EXPLORATION: &str = "exploration_progress";

/// Metric name for buildings built.
pub const METRIC_BUILDINGS: &str = "buildings_built";

/// Metric name for the tick counter.
pub const METRIC_STEPS: &str = "step_count";

/// What the transition function looks at after a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseSignals {
    /// Distinct visited cells over total cells.
    pub exploration_progress: f64,
    /// Ticks spent in Exploration so far.
    pub exploration_ticks: u64,
    /// Whether a strategic build order has been issued.
    pub strategic_plan_ready: bool,
    /// Cells carrying a structure.
    pub buildings_built: usize,
    /// Ticks spent in Construction since it was last entered.
    pub construction_ticks: u64,
    /// Ticks spent in Optimization so far.
    pub optimization_ticks: u64,
}

/// The phase after a tick in `current`.
pub fn next_phase(current: Phase, signals: &PhaseSignals, config: &MissionConfig) -> Phase {
    match current {
        Phase::Init => Phase::Exploration,
        Phase::Exploration => {
            if signals.exploration_progress >= config.exploration_threshold
                || signals.exploration_ticks >= config.exploration_step_limit
            {
                Phase::Analysis
            } else {
                Phase::Exploration
            }
        }
        Phase::Analysis => {
            if signals.strategic_plan_ready {
                Phase::Construction
            } else {
                Phase::Analysis
            }
        }
        Phase::Construction => {
            if signals.buildings_built >= config.building_target {
                if config.completion_after_construction {
                    Phase::Completion
                } else {
                    Phase::Optimization
                }
            } else if config.analysis_revisit_interval > 0
                && signals.construction_ticks >= config.analysis_revisit_interval
            {
                Phase::Analysis
            } else {
                Phase::Construction
            }
        }
        Phase::Optimization => {
            if signals.optimization_ticks >= config.optimization_ticks {
                Phase::Completion
            } else {
                Phase::Optimization
            }
        }
        Phase::Completion => Phase::Completion,
    }
}

/// Serializable view of the mission for step reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionMetrics {
    /// Current phase.
    pub phase: Phase,
    /// Ticks run so far.
    pub tick: u64,
    /// Distinct visited cells over total cells.
    pub exploration_progress: f64,
    /// Cells carrying a structure.
    pub buildings_built: usize,
    /// Whether a strategic build order is outstanding.
    pub strategic_plan_ready: bool,
    /// Failures caught at the tick boundary.
    pub error_recovery_attempts: u64,
    /// Named metrics as pushed to shared state.
    pub metrics: BTreeMap<String, f64>,
}

/// Mutable mission state carried across ticks.
#[derive(Debug, Clone)]
pub struct MissionState {
    phase: Phase,
    tick: u64,
    exploration_ticks: u64,
    construction_ticks: u64,
    optimization_ticks: u64,
    exploration_progress: f64,
    buildings_built: usize,
    strategic_plan_ready: bool,
    /// Set when a tick had to resolve resource conflicts.
    pub coordination_needed: bool,
    /// Set when an unrecovered severe failure was seen.
    pub emergency_mode: bool,
    error_recovery_attempts: u64,
    last_activity: BTreeMap<AgentId, DateTime<Utc>>,
    metrics: BTreeMap<String, f64>,
}

impl Default for MissionState {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionState {
    /// A mission at tick 0 in `Init`.
    pub const fn new() -> Self {
        Self {
            phase: Phase::Init,
            tick: 0,
            exploration_ticks: 0,
            construction_ticks: 0,
            optimization_ticks: 0,
            exploration_progress: 0.0,
            buildings_built: 0,
            strategic_plan_ready: false,
            coordination_needed: false,
            emergency_mode: false,
            error_recovery_attempts: 0,
            last_activity: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks run so far.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Latest exploration coverage.
    pub const fn exploration_progress(&self) -> f64 {
        self.exploration_progress
    }

    /// Latest building count.
    pub const fn buildings_built(&self) -> usize {
        self.buildings_built
    }

    /// Whether a strategic build order is outstanding.
    pub const fn strategic_plan_ready(&self) -> bool {
        self.strategic_plan_ready
    }

    /// Failures caught at the tick boundary.
    pub const fn error_recovery_attempts(&self) -> u64 {
        self.error_recovery_attempts
    }

    /// When each actor last took a turn.
    pub const fn last_activity(&self) -> &BTreeMap<AgentId, DateTime<Utc>> {
        &self.last_activity
    }

    /// Named metrics.
    pub const fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Start a tick. Returns the new tick number.
    pub const fn begin_tick(&mut self) -> u64 {
        self.tick = self.tick.saturating_add(1);
        self.tick
    }

    /// Record that `agent` took a turn.
    pub fn touch(&mut self, agent: AgentId, at: DateTime<Utc>) {
        self.last_activity.insert(agent, at);
    }

    /// Record that a build order went out.
    pub const fn mark_plan_ready(&mut self) {
        self.strategic_plan_ready = true;
    }

    /// Count a failure caught at the tick boundary.
    pub const fn record_error(&mut self) {
        self.error_recovery_attempts = self.error_recovery_attempts.saturating_add(1);
    }

    /// Refresh progress metrics from the grid. Coverage never goes down.
    pub fn update_progress(&mut self, visited: usize, total: usize, buildings: usize) {
        let coverage = coverage(visited, total);
        if coverage > self.exploration_progress {
            self.exploration_progress = coverage;
        }
        self.buildings_built = buildings;
        self.metrics
            .insert(METRIC_EXPLORATION.to_owned(), self.exploration_progress);
        self.metrics
            .insert(METRIC_BUILDINGS.to_owned(), count_as_f64(buildings));
        self.metrics
            .insert(METRIC_STEPS.to_owned(), u64_as_f64(self.tick));
    }

    /// Count the tick against the current phase, then apply the transition
    /// function. Returns the new phase when it changed.
    pub fn advance_phase(&mut self, config: &MissionConfig) -> Option<Phase> {
        match self.phase {
            Phase::Exploration => {
                self.exploration_ticks = self.exploration_ticks.saturating_add(1);
            }
            Phase::Construction => {
                self.construction_ticks = self.construction_ticks.saturating_add(1);
            }
            Phase::Optimization => {
                self.optimization_ticks = self.optimization_ticks.saturating_add(1);
            }
            Phase::Init | Phase::Analysis | Phase::Completion => {}
        }

        let signals = PhaseSignals {
            exploration_progress: self.exploration_progress,
            exploration_ticks: self.exploration_ticks,
            strategic_plan_ready: self.strategic_plan_ready,
            buildings_built: self.buildings_built,
            construction_ticks: self.construction_ticks,
            optimization_ticks: self.optimization_ticks,
        };
        let next = next_phase(self.phase, &signals, config);
        if next == self.phase {
            return None;
        }

        info!(tick = self.tick, from = %self.phase, to = %next, "Mission phase changed");
        match next {
            Phase::Construction => self.construction_ticks = 0,
            // A fresh order is needed on every visit to Analysis.
            Phase::Analysis => self.strategic_plan_ready = false,
            _ => {}
        }
        self.phase = next;
        Some(next)
    }

    /// Serializable view for step reports.
    pub fn snapshot(&self) -> MissionMetrics {
        MissionMetrics {
            phase: self.phase,
            tick: self.tick,
            exploration_progress: self.exploration_progress,
            buildings_built: self.buildings_built,
            strategic_plan_ready: self.strategic_plan_ready,
            error_recovery_attempts: self.error_recovery_attempts,
            metrics: self.metrics.clone(),
        }
    }
}

/// `visited / total`, or 0 for an empty grid.
#[allow(clippy::cast_precision_loss)]
fn coverage(visited: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (visited as f64 / total as f64).clamp(0.0, 1.0)
}

#[allow(clippy::cast_precision_loss)]
const fn count_as_f64(value: usize) -> f64 {
    value as f64
}

#[allow(clippy::cast_precision_loss)]
const fn u64_as_f64(value: u64) -> f64 {
    value as f64
}
