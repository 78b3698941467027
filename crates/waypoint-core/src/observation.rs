//! What an actor sees when it is asked to decide.
//!
//! An [`Observation`] is captured from the grid at the start of a turn and
//! handed both to the briefing renderer and to the decision oracle. It is
//! plain serializable data so the oracle never touches the grid lock.

use serde::{Deserialize, Serialize};
use waypoint_types::{AgentId, Coord, Direction, Message, Role, Structure};
use waypoint_world::Grid;

/// Number of inbox messages surfaced to the oracle.
pub const RECENT_MESSAGE_LIMIT: usize = 5;

/// One neighbouring cell as seen by an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborSummary {
    /// Direction from the observer.
    pub direction: Direction,
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Whether another actor stands there.
    pub occupied: bool,
    /// The structure marker there.
    pub structure: Structure,
    /// Whether the cell can be entered.
    pub passable: bool,
}

/// Everything an actor knows at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// The deciding actor.
    pub agent: AgentId,
    /// Its role.
    pub role: Role,
    /// Current tick.
    pub tick: u64,
    /// Its position, if placed.
    pub position: Option<Coord>,
    /// Grid columns.
    pub grid_width: u32,
    /// Grid rows.
    pub grid_height: u32,
    /// Neighbouring cells.
    pub neighbors: Vec<NeighborSummary>,
    /// Contents of the most recent inbox messages, oldest first.
    pub recent_messages: Vec<String>,
    /// Memory entries, oldest first.
    pub memory: Vec<String>,
    /// Capability tags.
    pub capabilities: Vec<String>,
}

impl Observation {
    /// Capture an observation for `agent` from the current grid.
    pub fn capture(
        grid: &Grid,
        agent: AgentId,
        role: Role,
        tick: u64,
        inbox: &[Message],
        memory: &[String],
    ) -> Self {
        let position = grid.position_of(agent);
        let neighbors = position
            .map(|coord| {
                grid.observe(coord)
                    .into_iter()
                    .map(|view| NeighborSummary {
                        direction: view.direction,
                        x: view.coord.x,
                        y: view.coord.y,
                        occupied: view.occupant.is_some(),
                        structure: view.structure,
                        passable: view.passable,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let skip = inbox.len().saturating_sub(RECENT_MESSAGE_LIMIT);
        let recent_messages = inbox
            .iter()
            .skip(skip)
            .map(|message| message.content.clone())
            .collect();

        Self {
            agent,
            role,
            tick,
            position,
            grid_width: grid.width(),
            grid_height: grid.height(),
            neighbors,
            recent_messages,
            memory: memory.to_vec(),
            capabilities: waypoint_coordination::role_capabilities(role)
                .iter()
                .map(|tag| (*tag).to_owned())
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn captures_neighbours_and_recent_messages() {
        let mut grid = Grid::new(3, 3).unwrap();
        let me = AgentId::new();
        let other = AgentId::new();
        assert!(grid.place_actor(me, Coord::new(1, 1)));
        assert!(grid.place_actor(other, Coord::new(1, 0)));

        let inbox: Vec<Message> = (0..7).map(|i| Message::new(other, format!("m{i}"))).collect();
        let obs = Observation::capture(&grid, me, Role::Scout, 3, &inbox, &[]);

        assert_eq!(obs.position, Some(Coord::new(1, 1)));
        assert_eq!(obs.neighbors.len(), 4);
        assert!(obs.neighbors.iter().any(|n| n.direction == Direction::North && n.occupied));
        assert_eq!(obs.recent_messages, vec!["m2", "m3", "m4", "m5", "m6"]);
        assert!(obs.capabilities.iter().any(|c| c == "exploration"));
    }

    #[test]
    fn unplaced_actor_sees_nothing() {
        let grid = Grid::new(2, 2).unwrap();
        let obs = Observation::capture(&grid, AgentId::new(), Role::Builder, 0, &[], &[]);
        assert_eq!(obs.position, None);
        assert!(obs.neighbors.is_empty());
    }
}
