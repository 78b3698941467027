//! The scout: explores the grid and reports what it sees.

use std::collections::BTreeSet;

use tracing::debug;
use waypoint_types::{AgentId, Coord, Direction, Message, Role, Structure};
use waypoint_world::Grid;

use super::{Actor, ActorCore, ActorError, TurnEnv, TurnOutcome, step};
use crate::parse::Action;

/// Explores unvisited cells and reports findings.
#[derive(Debug, Clone)]
pub struct Scout {
    core: ActorCore,
    /// Cells this scout has stood on.
    visited: BTreeSet<Coord>,
}

impl Scout {
    /// A new scout.
    pub fn new(id: AgentId) -> Self {
        Self {
            core: ActorCore::new(id, Role::Scout),
            visited: BTreeSet::new(),
        }
    }

    /// Cells this scout has stood on.
    pub const fn visited(&self) -> &BTreeSet<Coord> {
        &self.visited
    }

    fn move_in(&mut self, grid: &mut Grid, direction: Direction) -> Option<Message> {
        let id = self.core.id();
        if let Some(to) = step(grid, id, direction) {
            self.visited.insert(to);
            self.core.set_status(format!("Moved {direction} to {to}"));
            Some(self.core.report(format!("Scout moved {direction} to {to}")))
        } else {
            self.core
                .set_status(format!("Cannot move {direction} - blocked or out of bounds"));
            None
        }
    }

    fn observe_and_report(&mut self, grid: &mut Grid, position: Coord) -> Message {
        if grid.place_structure(position, Structure::Scanned) {
            debug!(%position, "Cell marked as scanned");
        }
        let findings: Vec<String> = grid
            .observe(position)
            .into_iter()
            .flat_map(|view| {
                let structure = match view.structure {
                    Structure::None => None,
                    Structure::Building { .. } => Some(format!("Structure at {}: building", view.coord)),
                    Structure::Scanned => Some(format!("Structure at {}: scanned", view.coord)),
                };
                let agent = view
                    .occupant
                    .map(|occupant| format!("Agent at {}: {occupant}", view.coord));
                let blocked = (!view.passable).then(|| format!("Impassable terrain at {}", view.coord));
                [structure, agent, blocked].into_iter().flatten()
            })
            .collect();

        self.core.set_status("Observing and reporting");
        if findings.is_empty() {
            self.core.report(format!(
                "Scout at {position}: Area clear, no structures or agents nearby"
            ))
        } else {
            self.core
                .report(format!("Scout reporting from {position}: {}", findings.join("; ")))
        }
    }

    /// Built-in exploration: prefer cells nobody has visited, then cells
    /// this scout has not visited, then any free cell. Reports instead of
    /// moving when boxed in.
    fn explore(&mut self, grid: &mut Grid, position: Coord) -> Message {
        let candidates: Vec<(Direction, Coord)> = Direction::ALL
            .into_iter()
            .filter_map(|direction| Some((direction, position.step(direction)?)))
            .filter(|(_, coord)| {
                grid.cell(*coord)
                    .is_some_and(|cell| cell.is_unoccupied() && cell.terrain.can_move_through())
            })
            .collect();

        let unexplored = candidates
            .iter()
            .find(|(_, coord)| grid.cell(*coord).is_some_and(|cell| !cell.is_visited()));
        let unseen = candidates
            .iter()
            .find(|(_, coord)| !self.visited.contains(coord));
        if let Some((direction, _)) = unexplored.or(unseen).copied()
            && let Some(message) = self.move_in(grid, direction)
        {
            return message;
        }

        if let Some((direction, to)) = candidates.first().copied()
            && self.move_in(grid, direction).is_some()
        {
            return self
                .core
                .report(format!("Scout exploring randomly: moved {direction} to {to}"));
        }

        self.observe_and_report(grid, position)
    }
}

impl Actor for Scout {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn take_turn(&mut self, env: &TurnEnv, inbox: &[Message]) -> Result<TurnOutcome, ActorError> {
        self.core.begin_turn(inbox);
        let (action, oracle_error) = self.core.consult(env, inbox)?;

        let mut grid = env.lock_grid();
        let id = self.core.id();
        let position = grid.position_of(id).ok_or(ActorError::NotPlaced { agent: id })?;
        self.visited.insert(position);

        let message = match &action {
            Action::Move(direction) => self.move_in(&mut grid, *direction),
            Action::Observe => Some(self.observe_and_report(&mut grid, position)),
            Action::Report(text) if !text.is_empty() => {
                self.core.set_status("Sending report");
                Some(self.core.report(format!("Scout report: {text}")))
            }
            Action::RequestResource { kind, amount } => {
                Some(self.core.resource_request(*kind, *amount))
            }
            _ => Some(self.explore(&mut grid, position)),
        };

        Ok(TurnOutcome {
            message,
            action: Some(action),
            oracle_error,
            ..TurnOutcome::default()
        })
    }
}
