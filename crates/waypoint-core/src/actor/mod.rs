//! Actors: the participants that take turns on the shared grid.
//!
//! Every actor owns an [`ActorCore`] (identity, status line, bounded
//! memory) and implements [`Actor::take_turn`]. A turn observes the grid,
//! asks the decision oracle for an action with the grid lock released,
//! then re-locks the grid to act. A turn returns at most one outgoing
//! message in its [`TurnOutcome`].
//!
//! # Roles
//!
//! - [`Scout`] -- explores and reports findings
//! - [`Strategist`] -- picks build sites and issues build orders
//! - [`Builder`] -- follows build orders and constructs buildings

mod builder;
mod scout;
mod strategist;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_types::{AgentId, Coord, Direction, Message, MessageKind, ResourceKind, Role};
use waypoint_world::Grid;

pub use builder::Builder;
pub use scout::Scout;
pub use strategist::Strategist;

use crate::briefing::{BriefingError, BriefingRenderer};
use crate::decision::{DecisionOracle, OracleError, decide_or_wait};
use crate::observation::Observation;
use crate::parse::{Action, parse_action};

/// Short-term memory entries kept per actor.
pub const MEMORY_CAPACITY: usize = 20;

/// Memory entries surfaced in status records and observations.
pub const STATUS_MEMORY: usize = 5;

/// Errors raised during an actor's turn.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// The actor has no position on the grid.
    #[error("actor {agent} is not on the grid")]
    NotPlaced {
        /// The unplaced actor.
        agent: AgentId,
    },

    /// The briefing could not be rendered.
    #[error(transparent)]
    Briefing(#[from] BriefingError),
}

/// Everything a turn may touch besides the actor itself.
///
/// Cheap to clone: every field is shared.
#[derive(Clone)]
pub struct TurnEnv {
    /// The current tick.
    pub tick: u64,
    /// The shared grid.
    pub grid: Arc<Mutex<Grid>>,
    /// The decision oracle.
    pub oracle: Arc<dyn DecisionOracle>,
    /// Role briefing templates.
    pub briefings: Arc<BriefingRenderer>,
    /// Actor id by role, for addressing peers.
    pub roster: Arc<BTreeMap<Role, AgentId>>,
}

impl TurnEnv {
    /// Lock the grid, recovering from a poisoned mutex.
    pub fn lock_grid(&self) -> MutexGuard<'_, Grid> {
        self.grid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The actor holding `role`, if any.
    pub fn peer(&self, role: Role) -> Option<AgentId> {
        self.roster.get(&role).copied()
    }
}

impl std::fmt::Debug for TurnEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEnv")
            .field("tick", &self.tick)
            .field("roster", &self.roster)
            .finish_non_exhaustive()
    }
}

/// The result of one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// The outgoing message, if any.
    pub message: Option<Message>,
    /// The action the oracle chose.
    pub action: Option<Action>,
    /// A build site the actor directed someone to build on.
    pub directive: Option<Coord>,
    /// A building this turn constructed.
    pub built: Option<Coord>,
    /// The oracle failure that forced a fallback to waiting.
    pub oracle_error: Option<OracleError>,
}

/// Read-only view of an actor for step reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStatus {
    /// Actor id.
    pub id: AgentId,
    /// Actor role.
    pub role: Role,
    /// Current position.
    pub position: Option<Coord>,
    /// Human-readable status line.
    pub status: String,
    /// The last raw oracle reply.
    pub last_action: Option<String>,
    /// The most recent memory entries, oldest first.
    pub memory: Vec<String>,
    /// Turns taken.
    pub turns: u64,
}

/// State shared by every role.
#[derive(Debug, Clone)]
pub struct ActorCore {
    /// Actor id.
    id: AgentId,
    /// Actor role.
    role: Role,
    /// Human-readable status line.
    status: String,
    /// The last raw oracle reply.
    last_action: Option<String>,
    /// Short-term memory, oldest first.
    memory: VecDeque<String>,
    /// Turns taken.
    turns: u64,
}

impl ActorCore {
    /// A fresh core for a new actor.
    pub fn new(id: AgentId, role: Role) -> Self {
        Self {
            id,
            role,
            status: String::from("Initializing"),
            last_action: None,
            memory: VecDeque::with_capacity(MEMORY_CAPACITY),
            turns: 0,
        }
    }

    /// Actor id.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Actor role.
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The status line.
    pub fn status_line(&self) -> &str {
        &self.status
    }

    /// Store a memory entry, evicting the oldest at capacity.
    pub fn remember(&mut self, entry: impl Into<String>) {
        while self.memory.len() >= MEMORY_CAPACITY {
            self.memory.pop_front();
        }
        self.memory.push_back(entry.into());
    }

    /// Replace the status line and remember it.
    pub fn set_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        self.remember(status.clone());
        self.status = status;
    }

    /// Up to `limit` most recent memory entries, oldest first.
    pub fn recent_memory(&self, limit: usize) -> Vec<String> {
        let skip = self.memory.len().saturating_sub(limit);
        self.memory.iter().skip(skip).cloned().collect()
    }

    /// Status record at `position`.
    pub fn status(&self, position: Option<Coord>) -> ActorStatus {
        ActorStatus {
            id: self.id,
            role: self.role,
            position,
            status: self.status.clone(),
            last_action: self.last_action.clone(),
            memory: self.recent_memory(STATUS_MEMORY),
            turns: self.turns,
        }
    }

    /// Start a turn: count it and remember the inbox.
    fn begin_turn(&mut self, inbox: &[Message]) {
        self.turns = self.turns.saturating_add(1);
        for message in inbox {
            self.remember(format!("Received: {}", message.content));
        }
    }

    /// Observe the grid, render the briefing, and ask the oracle. The grid
    /// lock is released before the oracle is called.
    fn consult(
        &mut self,
        env: &TurnEnv,
        inbox: &[Message],
    ) -> Result<(Action, Option<OracleError>), ActorError> {
        let observation = {
            let grid = env.lock_grid();
            Observation::capture(
                &grid,
                self.id,
                self.role,
                env.tick,
                inbox,
                &self.recent_memory(STATUS_MEMORY),
            )
        };
        let briefing = env.briefings.render(&observation)?;
        let (reply, oracle_error) = decide_or_wait(env.oracle.as_ref(), &observation, &briefing);
        let action = parse_action(&reply);
        debug!(agent_id = %self.id, role = %self.role, ?action, "Oracle decided");
        self.last_action = Some(reply);
        Ok((action, oracle_error))
    }

    /// A broadcast report from this actor.
    fn report(&self, content: impl Into<String>) -> Message {
        Message::new(self.id, content)
    }

    /// A resource request addressed to the coordinator.
    fn resource_request(&mut self, kind: ResourceKind, amount: u32) -> Message {
        self.set_status(format!("Requested {amount} {kind}"));
        Message::new(self.id, format!("Requesting {amount} {kind}"))
            .to(AgentId::COORDINATOR)
            .with_kind(MessageKind::ResourceRequest)
            .with_metadata("resource_type", kind.as_str())
            .with_metadata("amount", amount.to_string())
    }
}

/// A participant that takes turns on the grid.
pub trait Actor: Send {
    /// Shared actor state.
    fn core(&self) -> &ActorCore;

    /// Take one turn.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError`] on unexpected state (the actor is not on the
    /// grid, the briefing cannot be rendered). Expected failures such as a
    /// blocked move are reported through the status line instead.
    fn take_turn(&mut self, env: &TurnEnv, inbox: &[Message]) -> Result<TurnOutcome, ActorError>;

    /// Actor id.
    fn id(&self) -> AgentId {
        self.core().id()
    }

    /// Actor role.
    fn role(&self) -> Role {
        self.core().role()
    }

    /// Status record at `position`.
    fn status(&self, position: Option<Coord>) -> ActorStatus {
        self.core().status(position)
    }
}

/// Create the actor for `role`.
pub fn spawn(id: AgentId, role: Role) -> Box<dyn Actor> {
    match role {
        Role::Scout => Box::new(Scout::new(id)),
        Role::Strategist => Box::new(Strategist::new(id)),
        Role::Builder => Box::new(Builder::new(id)),
    }
}

/// Move `agent` one step in `direction`. Returns the new position.
fn step(grid: &mut Grid, agent: AgentId, direction: Direction) -> Option<Coord> {
    let target = grid.position_of(agent)?.step(direction)?;
    grid.move_actor(agent, target).then_some(target)
}

/// The direction of a one-cell step from `from` to `to`.
fn direction_between(from: Coord, to: Coord) -> Option<Direction> {
    Direction::ALL
        .into_iter()
        .find(|direction| from.step(*direction) == Some(to))
}

/// Whether `agent` may build on `coord`: buildable, no structure, and not
/// occupied by another actor.
fn can_build_here(grid: &Grid, coord: Coord, agent: AgentId) -> bool {
    grid.cell(coord)
        .is_some_and(|cell| cell.can_build() && cell.occupant.is_none_or(|occupant| occupant == agent))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_bounded_and_status_shows_last_five() {
        let mut core = ActorCore::new(AgentId::new(), Role::Scout);
        for i in 0..30 {
            core.remember(format!("entry {i}"));
        }
        let status = core.status(None);
        assert_eq!(status.memory.len(), STATUS_MEMORY);
        assert_eq!(status.memory.first().map(String::as_str), Some("entry 25"));
        assert_eq!(status.memory.last().map(String::as_str), Some("entry 29"));
        assert_eq!(core.recent_memory(100).len(), MEMORY_CAPACITY);
    }

    #[test]
    fn resource_request_is_addressed_to_coordinator() {
        let mut core = ActorCore::new(AgentId::new(), Role::Builder);
        let msg = core.resource_request(ResourceKind::Materials, 12);
        assert_eq!(msg.recipient, Some(AgentId::COORDINATOR));
        assert_eq!(msg.kind, MessageKind::ResourceRequest);
        assert_eq!(msg.metadata.get("amount").map(String::as_str), Some("12"));
        assert_eq!(core.status_line(), "Requested 12 materials");
    }

    #[test]
    fn spawn_matches_role() {
        let id = AgentId::new();
        for role in [Role::Scout, Role::Strategist, Role::Builder] {
            let actor = spawn(id, role);
            assert_eq!(actor.role(), role);
            assert_eq!(actor.id(), id);
        }
    }

    #[test]
    fn direction_between_neighbours() {
        let origin = Coord::new(2, 2);
        assert_eq!(direction_between(origin, Coord::new(2, 1)), Some(Direction::North));
        assert_eq!(direction_between(origin, Coord::new(3, 2)), Some(Direction::East));
        assert_eq!(direction_between(origin, Coord::new(4, 2)), None);
    }
}
