//! One orchestrator tick.
//!
//! Each tick runs these steps:
//!
//! 1. **Open** -- bump the tick counter and regenerate resource deposits.
//!    On the first tick every actor initialises and no turn is taken.
//! 2. **Turn** -- the actor for the current phase drains its inbox, takes
//!    its turn, acknowledges what needs acknowledging, and its outgoing
//!    message is enqueued.
//! 3. **Coordinate** -- conflicting resource requests are resolved and
//!    the remaining ones answered; the allocation ledger is audited.
//! 4. **Close** -- progress metrics are refreshed from the grid and pushed
//!    to shared state, the phase transition function runs, and the
//!    `[Step n]` lines are appended to the log.
//!
//! Nothing here returns an error to the caller. Failures are classified
//! into the error taxonomy and handed to the [`ErrorRecoveryManager`];
//! only unrecovered High or Critical failures turn the report's status to
//! [`StepStatus::Error`], and such a report carries the last good grid
//! snapshot.
//!
//! [`ErrorRecoveryManager`]: waypoint_resilience::ErrorRecoveryManager

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use waypoint_coordination::CoordinationError;
use waypoint_resilience::{ErrorCategory, ErrorEvent, Severity};
use waypoint_types::{AgentId, Message, Phase, Role};
use waypoint_world::{GridSnapshot, WorldError};

use crate::actor::{ActorError, ActorStatus, TurnOutcome};
use crate::briefing::BriefingError;
use crate::context::SimulationContext;
use crate::decision::OracleError;
use crate::mission::{METRIC_BUILDINGS, METRIC_EXPLORATION, METRIC_STEPS, MissionMetrics};

/// Errors caught at the tick boundary.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// An actor's turn failed.
    #[error("actor {agent} failed: {source}")]
    Actor {
        /// The failing actor.
        agent: AgentId,
        /// The underlying actor error.
        source: ActorError,
    },

    /// A grid operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// Coordination or the allocation audit failed.
    #[error("coordination error: {source}")]
    Coordination {
        /// The underlying coordination error.
        #[from]
        source: CoordinationError,
    },

    /// The briefing templates failed to compile.
    #[error("briefing error: {source}")]
    Briefing {
        /// The underlying briefing error.
        #[from]
        source: BriefingError,
    },

    /// No actor holds the role the current phase needs.
    #[error("no actor holds role {role}")]
    MissingActor {
        /// The missing role.
        role: Role,
    },

    /// A parallel turn missed the tick deadline.
    #[error("turn of {agent} exceeded {timeout_ms}ms")]
    TurnTimeout {
        /// The late actor.
        agent: AgentId,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A parallel turn's worker panicked.
    #[error("turn of {agent} aborted: {message}")]
    TurnAborted {
        /// The actor whose turn was lost.
        agent: AgentId,
        /// Join failure description.
        message: String,
    },
}

impl TickError {
    /// Taxonomy category and severity for this failure.
    pub const fn classify(&self) -> (ErrorCategory, Severity) {
        match self {
            Self::Actor {
                source: ActorError::NotPlaced { .. },
                ..
            }
            | Self::World {
                source: WorldError::ArithmeticOverflow,
            } => (ErrorCategory::GridOperation, Severity::Medium),
            Self::Actor { .. } | Self::Briefing { .. } | Self::MissingActor { .. } => {
                (ErrorCategory::ActorLogic, Severity::Medium)
            }
            Self::World { .. } => (ErrorCategory::GridOperation, Severity::High),
            Self::Coordination {
                source: CoordinationError::ConservationViolated { .. },
            } => (ErrorCategory::StateCorruption, Severity::Critical),
            Self::Coordination {
                source: CoordinationError::ArithmeticOverflow { .. },
            } => (ErrorCategory::ResourceManagement, Severity::High),
            Self::Coordination { .. } => (ErrorCategory::Coordination, Severity::Medium),
            Self::TurnTimeout { .. } => (ErrorCategory::Timeout, Severity::Medium),
            Self::TurnAborted { .. } => (ErrorCategory::ActorLogic, Severity::High),
        }
    }

    /// Short machine-readable kind used in error patterns.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Actor { .. } => "actor_turn",
            Self::World { .. } => "world",
            Self::Coordination { .. } => "coordination",
            Self::Briefing { .. } => "briefing",
            Self::MissingActor { .. } => "missing_actor",
            Self::TurnTimeout { .. } => "turn_timeout",
            Self::TurnAborted { .. } => "turn_aborted",
        }
    }
}

/// Taxonomy category and severity for an oracle failure. The actor already
/// fell back to waiting, so none of these is severe.
pub const fn classify_oracle(err: &OracleError) -> (ErrorCategory, Severity, &'static str) {
    match err {
        OracleError::Timeout { .. } => (ErrorCategory::Timeout, Severity::Medium, "oracle_timeout"),
        OracleError::Unavailable { .. } => {
            (ErrorCategory::Network, Severity::Medium, "oracle_unavailable")
        }
        OracleError::CircuitOpen => (ErrorCategory::DecisionOracle, Severity::Low, "circuit_open"),
        OracleError::Internal { .. } => {
            (ErrorCategory::DecisionOracle, Severity::Medium, "oracle_internal")
        }
    }
}

/// Whether a tick completed cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The tick ran, possibly with recovered failures.
    Success,
    /// An unrecovered severe failure occurred.
    Error,
}

/// Everything a caller sees after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// The tick that ran.
    pub tick: u64,
    /// The phase after the tick.
    pub phase: Phase,
    /// Success or error.
    pub status: StepStatus,
    /// The failure message when `status` is `Error`.
    pub error: Option<String>,
    /// Log lines added by this tick.
    pub log_lines: Vec<String>,
    /// The grid after the tick, or the last good one on error.
    pub grid: GridSnapshot,
    /// Every actor's status.
    pub actors: Vec<ActorStatus>,
    /// Mission phase and metrics.
    pub mission: MissionMetrics,
}

impl StepReport {
    /// Whether the tick completed without an unrecovered severe failure.
    pub const fn is_success(&self) -> bool {
        matches!(self.status, StepStatus::Success)
    }
}

// ---------------------------------------------------------------------------
// Tick frame
// ---------------------------------------------------------------------------

/// Per-tick bookkeeping shared by the sequential and parallel paths.
#[derive(Debug)]
pub(crate) struct TickFrame {
    pub(crate) tick: u64,
    pub(crate) phase: Phase,
    lines: Vec<String>,
    failure: Option<String>,
}

impl TickFrame {
    pub(crate) fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }
}

/// Step 1: count the tick, regenerate deposits, initialise on the first
/// tick.
pub(crate) fn open_tick(ctx: &mut SimulationContext) -> TickFrame {
    let tick = ctx.mission.begin_tick();
    let mut frame = TickFrame {
        tick,
        phase: ctx.mission.phase(),
        lines: Vec::new(),
        failure: None,
    };
    debug!(tick, phase = %frame.phase, "Tick started");

    let regenerated = ctx.lock_grid().update_resources(Utc::now());
    match regenerated {
        Ok(cells) if !cells.is_empty() => debug!(tick, cells = cells.len(), "Deposits regenerated"),
        Ok(_) => {}
        Err(err) => record_failure(ctx, &mut frame, &TickError::from(err)),
    }

    if frame.phase == Phase::Init {
        let now = Utc::now();
        for slot in &ctx.actors {
            ctx.mission.touch(slot.id, now);
        }
        let (width, height) = {
            let grid = ctx.lock_grid();
            (grid.width(), grid.height())
        };
        frame.line(format!(
            "Mission initialised: {} actors on a {width}x{height} grid",
            ctx.actors.len()
        ));
    }
    frame
}

/// Step 2 bookkeeping after a turn: acknowledge the inbox, enqueue the
/// outgoing message, record the directive and any oracle failure.
pub(crate) fn settle_turn(
    ctx: &mut SimulationContext,
    frame: &mut TickFrame,
    agent: AgentId,
    role: Role,
    inbox: &[Message],
    result: Result<TurnOutcome, TickError>,
) {
    ctx.mission.touch(agent, Utc::now());
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            record_failure(ctx, frame, &err);
            return;
        }
    };

    let queue = ctx.coordination.queue();
    for message in inbox.iter().filter(|message| message.requires_ack) {
        if queue.acknowledge(message.id, agent) && !queue.enqueue(message.ack_for(agent)) {
            debug!(message_id = %message.id, "Queue full, acknowledgement dropped");
        }
    }

    if let Some(err) = &outcome.oracle_error {
        let (category, severity, kind) = classify_oracle(err);
        let event = ErrorEvent::new(category, severity, kind, err.to_string())
            .with_context("agent_id", agent.to_string())
            .with_context("tick", frame.tick.to_string());
        ctx.recovery.handle_error(event);
        ctx.mission.record_error();
    }

    if outcome.directive.is_some() {
        ctx.mission.mark_plan_ready();
    }

    match outcome.message {
        Some(message) => {
            frame.line(format!("{role}: {}", message.content));
            if !ctx.coordination.send_message(message) {
                debug!(%agent, "Queue full, outgoing message dropped");
            }
        }
        None => {
            let status = ctx
                .actors
                .iter()
                .find(|slot| slot.id == agent)
                .map(|slot| slot.lock().core().status_line().to_owned())
                .unwrap_or_default();
            frame.line(format!("{role}: {status}"));
        }
    }
}

/// Steps 3 and 4: coordinate, refresh metrics, transition, log, report.
pub(crate) fn close_tick(ctx: &mut SimulationContext, mut frame: TickFrame) -> StepReport {
    if frame.phase != Phase::Init {
        coordinate(ctx, &mut frame);
    }

    let (visited, total, buildings) = {
        let grid = ctx.lock_grid();
        (grid.visited_cell_count(), grid.total_cells(), grid.building_count())
    };
    ctx.mission.update_progress(visited, total, buildings);
    let shared = ctx.coordination.shared();
    for name in [METRIC_EXPLORATION, METRIC_BUILDINGS, METRIC_STEPS] {
        if let Some(value) = ctx.mission.metrics().get(name) {
            shared.update_metric(name, *value);
        }
    }

    let from = ctx.mission.phase();
    if let Some(to) = ctx.mission.advance_phase(&ctx.config.mission) {
        frame.line(format!("Phase changed: {from} -> {to}"));
    }

    let tick = frame.tick;
    let log_lines: Vec<String> = frame
        .lines
        .iter()
        .map(|line| format!("[Step {tick}] {line}"))
        .collect();
    ctx.append_log(&log_lines);

    let grid = if frame.failure.is_some() {
        ctx.last_good.clone()
    } else {
        let snapshot = ctx.snapshot();
        ctx.last_good = snapshot.clone();
        snapshot
    };

    let status = if frame.failure.is_some() {
        StepStatus::Error
    } else {
        StepStatus::Success
    };
    info!(
        tick,
        phase = %ctx.mission.phase(),
        status = ?status,
        exploration = ctx.mission.exploration_progress(),
        buildings = ctx.mission.buildings_built(),
        "Tick complete"
    );

    StepReport {
        tick,
        phase: ctx.mission.phase(),
        status,
        error: frame.failure,
        log_lines,
        grid,
        actors: ctx.actor_statuses(),
        mission: ctx.mission.snapshot(),
    }
}

/// Resolve and answer resource requests, then audit the ledger.
fn coordinate(ctx: &mut SimulationContext, frame: &mut TickFrame) {
    let conflicts = ctx.coordination.detect_conflicts().len();
    ctx.mission.coordination_needed = conflicts > 0;
    match ctx.coordination.process_resource_requests() {
        Ok(replies) => {
            if conflicts > 0 {
                frame.line(format!("Coordinator resolved {conflicts} resource conflict(s)"));
            }
            for reply in &replies {
                frame.line(format!("Coordinator: {}", reply.content));
            }
        }
        Err(err) => record_failure(ctx, frame, &TickError::from(err)),
    }

    if let Err(err) = ctx.coordination.shared().audit().into_result() {
        record_failure(ctx, frame, &TickError::from(err));
    }
}

/// Classify `err`, hand it to the recovery manager, and mark the frame
/// failed when the failure must propagate.
pub(crate) fn record_failure(ctx: &mut SimulationContext, frame: &mut TickFrame, err: &TickError) {
    let (category, severity) = err.classify();
    let event = ErrorEvent::new(category, severity, err.kind(), err.to_string())
        .with_context("tick", frame.tick.to_string())
        .with_context("phase", frame.phase.as_str());
    let outcome = ctx.recovery.handle_error(event);
    ctx.mission.record_error();

    if outcome.must_propagate() {
        error!(tick = frame.tick, %err, "Unrecovered tick failure");
        ctx.mission.emergency_mode = true;
        frame.line(format!("Error: {err}"));
        if frame.failure.is_none() {
            frame.failure = Some(err.to_string());
        }
    } else {
        warn!(tick = frame.tick, %err, recovered = outcome.recovered, "Tick failure absorbed");
        frame.line(format!("Recovered from error: {err}"));
    }
}

/// Run one sequential tick: only the actor for the current phase acts.
pub fn run_tick(ctx: &mut SimulationContext) -> StepReport {
    let mut frame = open_tick(ctx);

    if let Some(role) = frame.phase.active_role() {
        match ctx.slot_for(role) {
            Some(slot) => {
                let inbox = ctx.coordination.get_messages_for_agent(slot.id);
                let env = ctx.turn_env(frame.tick);
                let result = slot
                    .lock()
                    .take_turn(&env, &inbox)
                    .map_err(|source| TickError::Actor {
                        agent: slot.id,
                        source,
                    });
                settle_turn(ctx, &mut frame, slot.id, role, &inbox, result);
            }
            None => record_failure(ctx, &mut frame, &TickError::MissingActor { role }),
        }
    } else if frame.phase.is_terminal() {
        frame.line("Mission complete, no actor active");
    }

    close_tick(ctx, frame)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use waypoint_types::{Coord, MessageKind, ResourceKind, Structure};

    use super::*;
    use crate::config::SimulationConfig;
    use crate::decision::{ScriptedOracle, StubOracle};

    fn plain_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.grid.terrain_enabled = false;
        config
    }

    #[test]
    fn first_tick_initialises_and_enters_exploration() {
        let mut ctx = SimulationContext::new(plain_config(), Arc::new(StubOracle::new())).unwrap();
        let report = ctx.advance();
        assert!(report.is_success());
        assert_eq!(report.tick, 1);
        assert_eq!(report.phase, Phase::Exploration);
        assert!(report.log_lines.iter().any(|l| l.starts_with("[Step 1] Mission initialised")));
        assert!(report.log_lines.iter().any(|l| l.contains("init -> exploration")));
        assert_eq!(report.actors.len(), 3);
    }

    #[test]
    fn oracle_failure_is_recorded_but_tick_succeeds() {
        struct Down;
        impl crate::decision::DecisionOracle for Down {
            fn decide(
                &self,
                _: &crate::observation::Observation,
                _: &str,
            ) -> Result<String, OracleError> {
                Err(OracleError::Unavailable {
                    message: String::from("connection refused"),
                })
            }
        }

        let mut ctx = SimulationContext::new(plain_config(), Arc::new(Down)).unwrap();
        ctx.advance();
        let report = ctx.advance();
        assert!(report.is_success());
        assert_eq!(report.mission.error_recovery_attempts, 1);
        assert_eq!(ctx.recovery().statistics().total_errors, 1);
    }

    #[test]
    fn strategist_order_moves_mission_to_construction() {
        let mut config = plain_config();
        config.mission.exploration_step_limit = 1;
        let mut ctx = SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap();

        ctx.advance(); // init
        let explored = ctx.advance();
        assert_eq!(explored.phase, Phase::Analysis);

        let analysed = ctx.advance();
        assert_eq!(analysed.phase, Phase::Construction);
        assert!(
            analysed
                .log_lines
                .iter()
                .any(|l| l.contains("STRATEGIC_BUILD_ORDER: Build at"))
        );
        assert!(analysed.mission.strategic_plan_ready);
    }

    #[test]
    fn resource_request_is_answered_in_the_same_tick() {
        let mut config = plain_config();
        config.mission.exploration_step_limit = 5;
        let oracle = ScriptedOracle::new().with_script(Role::Scout, ["REQUEST_RESOURCE energy 20"]);
        let mut ctx = SimulationContext::new(config, Arc::new(oracle)).unwrap();
        ctx.advance();
        let report = ctx.advance();

        let scout = ctx.roster().get(&Role::Scout).copied().unwrap();
        let shared = ctx.coordination().shared();
        assert_eq!(shared.available(ResourceKind::Energy), 30);
        assert_eq!(shared.get_agent_resources(scout).get(&ResourceKind::Energy), Some(&20));
        assert!(report.log_lines.iter().any(|l| l.contains("Resource allocated: 20 energy")));

        let inbox = ctx.coordination().get_messages_for_agent(scout);
        assert!(inbox.iter().any(|m| m.kind == MessageKind::ResourceAllocation));
    }

    #[test]
    fn classification_follows_the_taxonomy() {
        let corrupt = TickError::from(CoordinationError::ConservationViolated {
            resource: ResourceKind::Materials,
            expected: 100,
            actual: 90,
        });
        assert_eq!(corrupt.classify(), (ErrorCategory::StateCorruption, Severity::Critical));

        let late = TickError::TurnTimeout {
            agent: AgentId::new(),
            timeout_ms: 10,
        };
        assert_eq!(late.classify(), (ErrorCategory::Timeout, Severity::Medium));

        let (category, severity, _) = classify_oracle(&OracleError::CircuitOpen);
        assert_eq!((category, severity), (ErrorCategory::DecisionOracle, Severity::Low));
    }

    #[test]
    fn severe_failure_reports_error_with_last_good_snapshot() {
        let mut ctx = SimulationContext::new(plain_config(), Arc::new(StubOracle::new())).unwrap();
        let good = ctx.advance();

        let mut frame = open_tick(&mut ctx);
        let corrupt = TickError::from(CoordinationError::ConservationViolated {
            resource: ResourceKind::Materials,
            expected: 100,
            actual: 90,
        });
        record_failure(&mut ctx, &mut frame, &corrupt);
        // Change the live grid so it differs from the last good one.
        assert!(
            ctx.lock_grid()
                .place_structure(Coord::new(5, 4), Structure::Building { owner: AgentId::new() })
        );
        let report = close_tick(&mut ctx, frame);

        assert_eq!(report.status, StepStatus::Error);
        assert!(report.error.unwrap().contains("conservation violated"));
        assert_eq!(report.grid, good.grid);
        assert!(ctx.mission().emergency_mode);
    }
}
