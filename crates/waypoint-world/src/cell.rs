//! A single grid cell.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use waypoint_types::{AgentId, Coord, ResourceKind, Structure};

use crate::terrain::TerrainDescriptor;

/// Scale applied to float movement costs so pathfinding can use integers.
pub const COST_SCALE: f64 = 1000.0;

/// One cell of the grid: occupant, structure marker, terrain, and visits.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Where the cell sits.
    pub coord: Coord,
    /// The actor standing here, if any.
    pub occupant: Option<AgentId>,
    /// The structure marker.
    pub structure: Structure,
    /// Terrain and deposits.
    pub terrain: TerrainDescriptor,
    /// Last visit time per actor.
    pub visits: BTreeMap<AgentId, DateTime<Utc>>,
}

impl Cell {
    /// An empty cell with the given terrain.
    pub const fn new(coord: Coord, terrain: TerrainDescriptor) -> Self {
        Self {
            coord,
            occupant: None,
            structure: Structure::None,
            terrain,
            visits: BTreeMap::new(),
        }
    }

    /// Whether no actor stands here.
    pub const fn is_unoccupied(&self) -> bool {
        self.occupant.is_none()
    }

    /// Whether a structure marker is present.
    pub const fn has_structure(&self) -> bool {
        self.structure.is_present()
    }

    /// Whether a building may be placed here right now. A scan marker does
    /// not prevent it.
    pub const fn can_build(&self) -> bool {
        !self.structure.is_building() && self.terrain.can_build_on()
    }

    /// Whether any actor has ever visited this cell.
    pub fn is_visited(&self) -> bool {
        !self.visits.is_empty()
    }

    /// Record a visit by `agent`.
    pub fn visit(&mut self, agent: AgentId, now: DateTime<Utc>) {
        self.visits.insert(agent, now);
    }

    /// Effective movement cost: the terrain multiplier, doubled while
    /// another actor stands here.
    pub fn movement_cost(&self) -> f64 {
        let base = self.terrain.movement_cost;
        if self.occupant.is_some() {
            base * 2.0
        } else {
            base
        }
    }

    /// Movement cost scaled to integer units, or `None` if impassable.
    pub fn step_cost(&self) -> Option<u64> {
        if !self.terrain.can_move_through() {
            return None;
        }
        let cost = self.movement_cost();
        if !cost.is_finite() || cost < 0.0 {
            return None;
        }
        // Finite, non-negative, and bounded by the terrain table.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (cost * COST_SCALE).round() as u64;
        Some(scaled.max(1))
    }

    /// Current amount per resource kind.
    pub fn resources(&self) -> BTreeMap<ResourceKind, u32> {
        self.terrain
            .deposits
            .iter()
            .map(|(kind, deposit)| (*kind, deposit.amount()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use waypoint_types::TerrainKind;

    use super::*;

    #[test]
    fn occupied_cell_costs_double() {
        let mut cell = Cell::new(Coord::new(0, 0), TerrainDescriptor::of(TerrainKind::Difficult));
        assert_eq!(cell.step_cost(), Some(2000));
        cell.occupant = Some(AgentId::new());
        assert_eq!(cell.step_cost(), Some(4000));
    }

    #[test]
    fn obstacle_has_no_step_cost() {
        let cell = Cell::new(Coord::new(1, 1), TerrainDescriptor::of(TerrainKind::Obstacle));
        assert_eq!(cell.step_cost(), None);
        assert!(!cell.can_build());
    }

    #[test]
    fn structure_blocks_building_only() {
        let mut cell = Cell::new(Coord::new(2, 2), TerrainDescriptor::plain());
        assert!(cell.can_build());
        cell.structure = Structure::Building { owner: AgentId::new() };
        assert!(!cell.can_build());
        assert!(cell.step_cost().is_some());
    }

    #[test]
    fn scan_marker_leaves_cell_buildable() {
        let mut cell = Cell::new(Coord::new(1, 1), TerrainDescriptor::plain());
        cell.structure = Structure::Scanned;
        assert!(cell.has_structure());
        assert!(cell.can_build());
    }
}
