//! The builder: works through build orders and constructs buildings.
//!
//! Orders arrive as `Build at (x, y)` messages and queue up across turns.
//! Each turn the builder works on the front of the queue: it walks toward
//! the site along the cheapest path and builds once within
//! [`BUILD_RANGE`]. With no orders it builds opportunistically next to
//! itself.

use std::collections::VecDeque;

use waypoint_types::{AgentId, Coord, Direction, Message, Role, Structure};
use waypoint_world::Grid;

use super::{Actor, ActorCore, ActorError, TurnEnv, TurnOutcome, can_build_here, direction_between, step};
use crate::parse::Action;

/// Maximum Manhattan distance between the builder and the site it builds on.
pub const BUILD_RANGE: u32 = 2;

/// What a construction attempt did.
enum Work {
    /// An ordered building went up.
    Built(Coord),
    /// A building went up next to the builder without an order.
    Opportunistic(Coord),
    /// Something happened that produced a message but no building.
    Message(Message),
    /// Nothing worth reporting.
    Idle,
}

/// Constructs buildings on ordered sites.
#[derive(Debug, Clone)]
pub struct Builder {
    core: ActorCore,
    /// Pending build sites, oldest first.
    build_queue: VecDeque<Coord>,
    /// Buildings placed so far.
    buildings_completed: u32,
}

impl Builder {
    /// A new builder.
    pub fn new(id: AgentId) -> Self {
        Self {
            core: ActorCore::new(id, Role::Builder),
            build_queue: VecDeque::new(),
            buildings_completed: 0,
        }
    }

    /// Pending build sites, oldest first.
    pub const fn build_queue(&self) -> &VecDeque<Coord> {
        &self.build_queue
    }

    /// Buildings placed so far.
    pub const fn buildings_completed(&self) -> u32 {
        self.buildings_completed
    }

    /// Queue every `Build at (x, y)` order in the inbox.
    fn absorb_orders(&mut self, inbox: &[Message]) {
        for message in inbox {
            let Some(coord) = parse_order(&message.content) else {
                continue;
            };
            if !self.build_queue.contains(&coord) {
                self.core.remember(format!("Queued build order at {coord}"));
                self.build_queue.push_back(coord);
            }
        }
    }

    /// Try to build at `coord` from `position`.
    fn attempt_build(&mut self, grid: &mut Grid, position: Coord, coord: Coord) -> bool {
        let id = self.core.id();
        if !grid.in_bounds(coord) {
            self.core.set_status(format!("Build failed: {coord} out of bounds"));
            return false;
        }
        if !can_build_here(grid, coord, id) {
            self.core.set_status(format!("Build failed: {coord} unavailable"));
            return false;
        }
        if position.manhattan(coord) > BUILD_RANGE {
            self.core.set_status(format!("Build failed: {coord} too far away"));
            return false;
        }
        if !grid.place_structure(coord, Structure::Building { owner: id }) {
            self.core.set_status(format!("Build failed: {coord} rejected"));
            return false;
        }
        self.buildings_completed = self.buildings_completed.saturating_add(1);
        self.build_queue.retain(|queued| *queued != coord);
        self.core.set_status(format!(
            "Built structure #{} at {coord}",
            self.buildings_completed
        ));
        true
    }

    fn build_ordered(&mut self, grid: &mut Grid, position: Coord, coord: Coord) -> Work {
        if self.attempt_build(grid, position, coord) {
            Work::Built(coord)
        } else {
            Work::Message(self.core.report(format!(
                "CONSTRUCTION_FAILED: Cannot build at {coord} - location unavailable"
            )))
        }
    }

    fn move_in(&mut self, grid: &mut Grid, direction: Direction) -> Work {
        if let Some(to) = step(grid, self.core.id(), direction) {
            self.core.set_status(format!("Moved {direction} to {to}"));
            Work::Message(
                self.core
                    .report(format!("Builder repositioning: moved {direction} to {to}")),
            )
        } else {
            self.core.set_status(format!("Cannot move {direction} - blocked"));
            Work::Idle
        }
    }

    /// Work on the build queue, or build next to the builder when it is
    /// empty.
    fn default_work(&mut self, grid: &mut Grid, position: Coord) -> Work {
        let id = self.core.id();
        if let Some(target) = self.build_queue.front().copied() {
            if !can_build_here(grid, target, id) {
                self.build_queue.pop_front();
                self.core.set_status(format!("Dropped invalid target {target}"));
                return Work::Message(self.core.report(format!(
                    "CONSTRUCTION_FAILED: Removed invalid target {target} from queue"
                )));
            }
            if position.manhattan(target) <= BUILD_RANGE {
                return self.build_ordered(grid, position, target);
            }
            let path = grid.find_path(position, target);
            let next = path.get(1).copied();
            return match next.and_then(|next| direction_between(position, next)) {
                Some(direction) => self.move_in(grid, direction),
                None => {
                    self.build_queue.pop_front();
                    self.core.set_status(format!("No route to {target}"));
                    Work::Message(self.core.report(format!(
                        "CONSTRUCTION_FAILED: No route to {target}, removed from queue"
                    )))
                }
            };
        }

        let adjacent = Direction::ALL
            .into_iter()
            .filter_map(|direction| position.step(direction))
            .find(|coord| can_build_here(grid, *coord, id) && grid.is_empty(*coord));
        if let Some(coord) = adjacent
            && self.attempt_build(grid, position, coord)
        {
            return Work::Opportunistic(coord);
        }

        self.core.set_status("No construction opportunities");
        Work::Idle
    }
}

impl Actor for Builder {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn take_turn(&mut self, env: &TurnEnv, inbox: &[Message]) -> Result<TurnOutcome, ActorError> {
        self.core.begin_turn(inbox);
        self.absorb_orders(inbox);
        let (action, oracle_error) = self.core.consult(env, inbox)?;

        let mut grid = env.lock_grid();
        let id = self.core.id();
        let position = grid.position_of(id).ok_or(ActorError::NotPlaced { agent: id })?;

        let work = match &action {
            Action::Build(coord) => self.build_ordered(&mut grid, position, *coord),
            Action::Move(direction) => self.move_in(&mut grid, *direction),
            Action::RequestResource { kind, amount } => {
                Work::Message(self.core.resource_request(*kind, *amount))
            }
            Action::Wait if self.build_queue.is_empty() => {
                self.core.set_status("Awaiting strategic build orders");
                Work::Message(
                    self.core
                        .report("Builder ready: Awaiting construction orders from strategist"),
                )
            }
            _ => self.default_work(&mut grid, position),
        };

        let (message, built) = match work {
            Work::Built(coord) => (
                Some(self.core.report(format!(
                    "CONSTRUCTION_COMPLETE: Building constructed at {coord}"
                ))),
                Some(coord),
            ),
            Work::Opportunistic(coord) => (
                Some(self.core.report(format!(
                    "OPPORTUNISTIC_BUILD: Constructed building at {coord}"
                ))),
                Some(coord),
            ),
            Work::Message(message) => (Some(message), None),
            Work::Idle => (None, None),
        };

        Ok(TurnOutcome {
            message,
            action: Some(action),
            built,
            oracle_error,
            ..TurnOutcome::default()
        })
    }
}

/// Extract the site from a `Build at (x, y)` order.
fn parse_order(content: &str) -> Option<Coord> {
    let (_, rest) = content.split_once("Build at ")?;
    let end = rest.find(')')?;
    Coord::parse(rest.get(..=end)?)
}
