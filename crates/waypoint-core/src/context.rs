//! The simulation context: everything one mission owns.
//!
//! A [`SimulationContext`] is built once from a [`SimulationConfig`] and a
//! decision oracle, then driven by [`SimulationContext::advance`] (or the
//! run loop). There are no process-wide globals; every tick borrows the
//! context mutably.
//!
//! The grid, the message queue, and the shared state each sit behind their
//! own lock. Actors sit behind a per-actor mutex so a parallel turn that
//! outlives its deadline keeps the actor alive instead of losing it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;
use waypoint_coordination::{CoordinationManager, MessageQueue, SharedState, role_capabilities};
use waypoint_resilience::ErrorRecoveryManager;
use waypoint_types::{AgentId, Coord, Phase, Role};
use waypoint_world::{Grid, GridSnapshot, WorldError};

use crate::actor::{self, Actor, ActorStatus, TurnEnv};
use crate::briefing::BriefingRenderer;
use crate::config::SimulationConfig;
use crate::decision::DecisionOracle;
use crate::mission::{MissionMetrics, MissionState};
use crate::tick::{self, StepReport, TickError};

/// Start cells of the default roster, in placement order.
pub const DEFAULT_ROSTER: [(Role, Coord); 3] = [
    (Role::Builder, Coord::new(0, 0)),
    (Role::Strategist, Coord::new(1, 0)),
    (Role::Scout, Coord::new(2, 0)),
];

/// An actor shared with worker threads.
pub type SharedActor = Arc<Mutex<Box<dyn Actor>>>;

/// One roster entry. Id and role are copied out so lookups never wait on
/// an actor that is mid-turn.
#[derive(Clone)]
pub(crate) struct ActorSlot {
    pub(crate) id: AgentId,
    pub(crate) role: Role,
    pub(crate) actor: SharedActor,
}

impl ActorSlot {
    /// Lock the actor, recovering from a poisoned mutex.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Actor>> {
        self.actor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the grid, the coordination layer, the mission state, and the
/// actors of one simulation.
pub struct SimulationContext {
    pub(crate) config: SimulationConfig,
    pub(crate) grid: Arc<Mutex<Grid>>,
    pub(crate) coordination: CoordinationManager,
    pub(crate) mission: MissionState,
    pub(crate) actors: Vec<ActorSlot>,
    pub(crate) roster: Arc<BTreeMap<Role, AgentId>>,
    pub(crate) recovery: ErrorRecoveryManager,
    pub(crate) oracle: Arc<dyn DecisionOracle>,
    pub(crate) briefings: Arc<BriefingRenderer>,
    pub(crate) log: VecDeque<String>,
    pub(crate) last_good: GridSnapshot,
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("phase", &self.mission.phase())
            .field("tick", &self.mission.tick())
            .field("roster", &self.roster)
            .field("log_lines", &self.log.len())
            .finish_non_exhaustive()
    }
}

/// Grid, actors, and roster for a fresh mission.
struct World {
    grid: Grid,
    actors: Vec<ActorSlot>,
    roster: BTreeMap<Role, AgentId>,
}

fn build_world(config: &SimulationConfig) -> Result<World, WorldError> {
    let grid_config = &config.grid;
    let mut grid = if grid_config.terrain_enabled {
        Grid::generate(grid_config.width, grid_config.height, grid_config.seed)?
    } else {
        Grid::new(grid_config.width, grid_config.height)?
    };

    let mut actors = Vec::with_capacity(DEFAULT_ROSTER.len());
    let mut roster = BTreeMap::new();
    for (role, at) in DEFAULT_ROSTER {
        let id = AgentId::new();
        grid.clear_terrain(at);
        if !grid.place_actor(id, at) {
            return Err(WorldError::OutOfBounds(at));
        }
        actors.push(ActorSlot {
            id,
            role,
            actor: Arc::new(Mutex::new(actor::spawn(id, role))),
        });
        roster.insert(role, id);
    }
    Ok(World {
        grid,
        actors,
        roster,
    })
}

fn build_coordination(
    config: &SimulationConfig,
    roster: &BTreeMap<Role, AgentId>,
) -> CoordinationManager {
    let coordination = &config.coordination;
    let shared = Arc::new(SharedState::new(&coordination.initial_pool));
    for (role, id) in roster {
        shared.register_capabilities(*id, role_capabilities(*role).iter().copied());
    }
    CoordinationManager::new(
        MessageQueue::new(coordination.queue_capacity, coordination.history_capacity),
        shared,
    )
}

impl SimulationContext {
    /// Build a mission from `config`: generate the grid, place the default
    /// roster, and set up the coordination layer.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::World`] if the grid cannot hold the roster and
    /// [`TickError::Briefing`] if the briefing templates fail to compile.
    pub fn new(config: SimulationConfig, oracle: Arc<dyn DecisionOracle>) -> Result<Self, TickError> {
        let world = build_world(&config)?;
        let coordination = build_coordination(&config, &world.roster);
        let last_good = world.grid.snapshot();
        info!(
            width = config.grid.width,
            height = config.grid.height,
            seed = config.grid.seed,
            actors = world.actors.len(),
            "Simulation context created"
        );
        Ok(Self {
            config,
            grid: Arc::new(Mutex::new(world.grid)),
            coordination,
            mission: MissionState::new(),
            actors: world.actors,
            roster: Arc::new(world.roster),
            recovery: ErrorRecoveryManager::new(),
            oracle,
            briefings: Arc::new(BriefingRenderer::new()?),
            log: VecDeque::new(),
            last_good,
        })
    }

    /// Rebuild grid, coordination layer, mission state, actors, and log
    /// from the stored configuration. Error history is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::World`] if the grid cannot hold the roster. The
    /// context is unchanged in that case.
    pub fn reset(&mut self) -> Result<(), TickError> {
        let world = build_world(&self.config)?;
        self.coordination = build_coordination(&self.config, &world.roster);
        self.last_good = world.grid.snapshot();
        self.grid = Arc::new(Mutex::new(world.grid));
        self.actors = world.actors;
        self.roster = Arc::new(world.roster);
        self.mission = MissionState::new();
        self.log.clear();
        info!(seed = self.config.grid.seed, "Simulation reset");
        Ok(())
    }

    /// Run one tick and return its report.
    ///
    /// Never fails: failures are recorded and reported through
    /// [`StepReport::status`].
    pub fn advance(&mut self) -> StepReport {
        tick::run_tick(self)
    }

    /// Run one tick with actor turns on the blocking pool, dispatching
    /// every actor's turn concurrently when `execution.parallel` is set.
    pub async fn advance_async(&mut self) -> StepReport {
        if self.config.execution.parallel {
            crate::parallel::run_tick_parallel(self).await
        } else {
            crate::parallel::run_tick_offloaded(self).await
        }
    }

    /// The configuration this context was built from.
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current mission phase.
    pub const fn phase(&self) -> Phase {
        self.mission.phase()
    }

    /// Ticks run so far.
    pub const fn tick(&self) -> u64 {
        self.mission.tick()
    }

    /// The mission state.
    pub const fn mission(&self) -> &MissionState {
        &self.mission
    }

    /// Mission phase and metrics.
    pub fn metrics(&self) -> MissionMetrics {
        self.mission.snapshot()
    }

    /// The coordination layer.
    pub const fn coordination(&self) -> &CoordinationManager {
        &self.coordination
    }

    /// The error recovery manager.
    pub const fn recovery(&self) -> &ErrorRecoveryManager {
        &self.recovery
    }

    /// Mutable access to the error recovery manager, e.g. to register the
    /// oracle's circuit breaker.
    pub const fn recovery_mut(&mut self) -> &mut ErrorRecoveryManager {
        &mut self.recovery
    }

    /// Actor id by role.
    pub fn roster(&self) -> &BTreeMap<Role, AgentId> {
        &self.roster
    }

    /// Lock the grid, recovering from a poisoned mutex.
    pub fn lock_grid(&self) -> MutexGuard<'_, Grid> {
        self.grid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current grid snapshot.
    pub fn snapshot(&self) -> GridSnapshot {
        self.lock_grid().snapshot()
    }

    /// The tick log, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.log.iter().cloned().collect()
    }

    /// Status of every actor, in roster placement order.
    pub fn actor_statuses(&self) -> Vec<ActorStatus> {
        let positions = self.lock_grid().agent_positions().clone();
        self.actors
            .iter()
            .map(|slot| slot.lock().status(positions.get(&slot.id).copied()))
            .collect()
    }

    /// The roster entry holding `role`.
    pub(crate) fn slot_for(&self, role: Role) -> Option<ActorSlot> {
        self.actors.iter().find(|slot| slot.role == role).cloned()
    }

    /// Turn environment for `tick`.
    pub(crate) fn turn_env(&self, tick: u64) -> TurnEnv {
        TurnEnv {
            tick,
            grid: Arc::clone(&self.grid),
            oracle: Arc::clone(&self.oracle),
            briefings: Arc::clone(&self.briefings),
            roster: Arc::clone(&self.roster),
        }
    }

    /// Append lines to the tick log, evicting the oldest at capacity.
    pub(crate) fn append_log(&mut self, lines: &[String]) {
        let capacity = self.config.mission.log_capacity;
        for line in lines {
            while capacity > 0 && self.log.len() >= capacity {
                self.log.pop_front();
            }
            if capacity > 0 {
                self.log.push_back(line.clone());
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decision::StubOracle;

    fn context() -> SimulationContext {
        SimulationContext::new(SimulationConfig::default(), Arc::new(StubOracle::new())).unwrap()
    }

    #[test]
    fn default_roster_is_placed() {
        let ctx = context();
        let grid = ctx.lock_grid();
        for (role, at) in DEFAULT_ROSTER {
            let id = ctx.roster().get(&role).copied().unwrap();
            assert_eq!(grid.position_of(id), Some(at));
            assert!(grid.cell(at).unwrap().terrain.can_move_through());
        }
        drop(grid);
        assert_eq!(ctx.phase(), Phase::Init);
        assert_eq!(ctx.actor_statuses().len(), 3);
    }

    #[test]
    fn capabilities_are_registered_per_role() {
        let ctx = context();
        let scout = ctx.roster().get(&Role::Scout).copied().unwrap();
        let shared = ctx.coordination().shared();
        assert!(shared.capabilities_of(scout).contains("exploration"));
        assert_eq!(shared.agents_with_capability("construction").len(), 1);
    }

    #[test]
    fn too_small_grid_is_rejected() {
        let mut config = SimulationConfig::default();
        config.grid.width = 2;
        let err = SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap_err();
        assert!(matches!(err, TickError::World { .. }));
    }

    #[test]
    fn reset_rebuilds_everything() {
        let mut ctx = context();
        let before = ctx.roster().clone();
        ctx.advance();
        ctx.advance();
        assert_eq!(ctx.tick(), 2);
        assert!(!ctx.logs().is_empty());

        ctx.reset().unwrap();
        assert_eq!(ctx.tick(), 0);
        assert_eq!(ctx.phase(), Phase::Init);
        assert!(ctx.logs().is_empty());
        assert_ne!(ctx.roster(), &before);
        assert!(ctx.coordination().queue().is_empty());
    }

    #[test]
    fn log_is_bounded() {
        let mut config = SimulationConfig::default();
        config.mission.log_capacity = 3;
        let mut ctx = SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap();
        let lines: Vec<String> = (0..5).map(|i| format!("line {i}")).collect();
        ctx.append_log(&lines);
        assert_eq!(ctx.logs(), vec!["line 2", "line 3", "line 4"]);
    }
}
