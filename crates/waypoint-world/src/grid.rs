//! The grid: cells, the actor position registry, and movement bookkeeping.
//!
//! [`Grid`] keeps `Cell::occupant` and the position registry in lock-step:
//! an actor id appears as the occupant of at most one cell, and
//! [`Grid::position_of`] always reflects the last successful placement or
//! move. Expected failures (occupied, out of bounds, impassable) return
//! `false` and log at `debug` level.
//!
//! Two movement paths exist. [`Grid::move_actor`] applies a single move
//! immediately. [`Grid::request_movement`] plus [`Grid::execute_movements`]
//! batch simultaneous requests and resolve contested cells by priority.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use waypoint_types::{AgentId, Coord, Direction, ResourceKind, Structure};

use crate::cell::Cell;
use crate::collision::CollisionResolver;
use crate::error::WorldError;
use crate::pathfinding;
use crate::snapshot::{CellSnapshot, ExtractionRecord, GridMetrics, GridSnapshot, MovementRecord};
use crate::terrain::{TerrainDescriptor, TerrainGenerator};

/// Number of movement-history entries surfaced in [`GridMetrics`].
const RECENT_MOVEMENTS: usize = 10;

/// What an actor sees in one neighbouring cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborView {
    /// Direction from the observer.
    pub direction: Direction,
    /// The neighbouring coordinate.
    pub coord: Coord,
    /// The actor standing there.
    pub occupant: Option<AgentId>,
    /// The structure marker there.
    pub structure: Structure,
    /// Whether the cell can be entered.
    pub passable: bool,
}

/// The spatial environment shared by all actors.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Number of columns.
    width: u32,
    /// Number of rows.
    height: u32,
    /// Every cell, keyed by coordinate.
    cells: BTreeMap<Coord, Cell>,
    /// Actor position registry, kept consistent with `Cell::occupant`.
    positions: BTreeMap<AgentId, Coord>,
    /// Append-only movement history.
    movement_history: Vec<MovementRecord>,
    /// Append-only resource-extraction log.
    extraction_log: Vec<ExtractionRecord>,
    /// Pending batched movement requests.
    collision: CollisionResolver,
}

impl Grid {
    /// Create a grid of plain terrain.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        Self::build(width, height, |_| TerrainDescriptor::plain())
    }

    /// Create a grid with terrain generated from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] if either dimension is zero.
    pub fn generate(width: u32, height: u32, seed: u64) -> Result<Self, WorldError> {
        let mut generator = TerrainGenerator::new(seed);
        Self::build(width, height, |_| generator.next_terrain())
    }

    /// Build a grid, asking `terrain_for` for each cell in row-major order.
    fn build(
        width: u32,
        height: u32,
        mut terrain_for: impl FnMut(Coord) -> TerrainDescriptor,
    ) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }
        let mut cells = BTreeMap::new();
        for y in 0..height {
            for x in 0..width {
                let coord = Coord::new(x, y);
                cells.insert(coord, Cell::new(coord, terrain_for(coord)));
            }
        }
        Ok(Self {
            width,
            height,
            cells,
            positions: BTreeMap::new(),
            movement_history: Vec::new(),
            extraction_log: Vec::new(),
            collision: CollisionResolver::new(),
        })
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Number of columns.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells.
    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Whether `coord` lies inside the grid.
    pub const fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    /// The cell at `coord`.
    pub fn cell(&self, coord: Coord) -> Option<&Cell> {
        self.cells.get(&coord)
    }

    /// Iterate over all cells in coordinate order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Current position of `agent`.
    pub fn position_of(&self, agent: AgentId) -> Option<Coord> {
        self.positions.get(&agent).copied()
    }

    /// The full position registry.
    pub const fn agent_positions(&self) -> &BTreeMap<AgentId, Coord> {
        &self.positions
    }

    /// In-bounds 4-connected neighbours of `coord`, in [`Direction::ALL`] order.
    pub fn neighbors(&self, coord: Coord) -> Vec<Coord> {
        Direction::ALL
            .into_iter()
            .filter_map(|direction| coord.step(direction))
            .filter(|next| self.in_bounds(*next))
            .collect()
    }

    /// Describe the neighbours of `coord` for an observing actor.
    pub fn observe(&self, coord: Coord) -> Vec<NeighborView> {
        Direction::ALL
            .into_iter()
            .filter_map(|direction| {
                let next = coord.step(direction)?;
                let cell = self.cells.get(&next)?;
                Some(NeighborView {
                    direction,
                    coord: next,
                    occupant: cell.occupant,
                    structure: cell.structure,
                    passable: cell.terrain.can_move_through(),
                })
            })
            .collect()
    }

    /// True iff `coord` is in bounds and no actor stands there.
    ///
    /// Terrain and structures do not affect this check.
    pub fn is_empty(&self, coord: Coord) -> bool {
        self.cells.get(&coord).is_some_and(Cell::is_unoccupied)
    }

    /// Whether a structure marker sits on `coord`.
    pub fn has_structure(&self, coord: Coord) -> bool {
        self.cells.get(&coord).is_some_and(Cell::has_structure)
    }

    /// Whether a structure could be placed on `coord` right now.
    pub fn can_build(&self, coord: Coord) -> bool {
        self.cells.get(&coord).is_some_and(Cell::can_build)
    }

    /// Number of cells any actor has visited.
    pub fn visited_cell_count(&self) -> usize {
        self.cells.values().filter(|cell| cell.is_visited()).count()
    }

    /// Number of cells carrying a structure marker.
    pub fn structure_count(&self) -> usize {
        self.cells.values().filter(|cell| cell.has_structure()).count()
    }

    /// Number of cells carrying a building.
    pub fn building_count(&self) -> usize {
        self.cells
            .values()
            .filter(|cell| cell.structure.is_building())
            .count()
    }

    /// Number of cells carrying a scan marker.
    pub fn scanned_cell_count(&self) -> usize {
        self.cells
            .values()
            .filter(|cell| cell.structure == Structure::Scanned)
            .count()
    }

    /// The first unoccupied cell a structure could be placed on, scanning
    /// column by column.
    pub fn find_build_site(&self) -> Option<Coord> {
        self.cells
            .values()
            .find(|cell| cell.is_unoccupied() && cell.can_build())
            .map(|cell| cell.coord)
    }

    /// The movement history, oldest first.
    pub fn movement_history(&self) -> &[MovementRecord] {
        &self.movement_history
    }

    /// The extraction log, oldest first.
    pub fn extraction_log(&self) -> &[ExtractionRecord] {
        &self.extraction_log
    }

    // -------------------------------------------------------------------
    // Terrain
    // -------------------------------------------------------------------

    /// Replace the terrain of a cell. Returns `false` when out of bounds.
    pub fn set_terrain(&mut self, coord: Coord, terrain: TerrainDescriptor) -> bool {
        let Some(cell) = self.cells.get_mut(&coord) else {
            return false;
        };
        cell.terrain = terrain;
        true
    }

    /// Reset a cell to plain ground with no deposits.
    pub fn clear_terrain(&mut self, coord: Coord) -> bool {
        self.set_terrain(coord, TerrainDescriptor::plain())
    }

    // -------------------------------------------------------------------
    // Placement and movement
    // -------------------------------------------------------------------

    /// Place an actor that is not yet on the grid.
    ///
    /// Fails if the actor is already placed, `coord` is out of bounds,
    /// occupied, or impassable.
    pub fn place_actor(&mut self, agent: AgentId, coord: Coord) -> bool {
        if self.positions.contains_key(&agent) {
            debug!(%agent, %coord, "Placement rejected: actor already on grid");
            return false;
        }
        let Some(cell) = self.cells.get_mut(&coord) else {
            debug!(%agent, %coord, "Placement rejected: out of bounds");
            return false;
        };
        if cell.occupant.is_some() || !cell.terrain.can_move_through() {
            debug!(%agent, %coord, "Placement rejected: occupied or impassable");
            return false;
        }

        cell.occupant = Some(agent);
        cell.visit(agent, Utc::now());
        self.positions.insert(agent, coord);
        info!(%agent, %coord, "Actor placed");
        true
    }

    /// Move a placed actor to `to` immediately.
    ///
    /// Fails if the actor is unplaced, `to` is out of bounds, occupied by a
    /// different actor, or impassable. On success the old cell is cleared,
    /// the new cell claimed, and a movement record appended.
    pub fn move_actor(&mut self, agent: AgentId, to: Coord) -> bool {
        let Some(from) = self.positions.get(&agent).copied() else {
            debug!(%agent, %to, "Move rejected: actor not on grid");
            return false;
        };
        let Some(target) = self.cells.get(&to) else {
            debug!(%agent, %to, "Move rejected: out of bounds");
            return false;
        };
        if target.occupant.is_some_and(|other| other != agent) {
            debug!(%agent, %to, "Move rejected: cell occupied");
            return false;
        }
        if !target.terrain.can_move_through() {
            debug!(%agent, %to, "Move rejected: terrain impassable");
            return false;
        }

        let now = Utc::now();
        if let Some(old) = self.cells.get_mut(&from) {
            old.occupant = None;
        }
        if let Some(new) = self.cells.get_mut(&to) {
            new.occupant = Some(agent);
            new.visit(agent, now);
        }
        self.positions.insert(agent, to);
        self.movement_history.push(MovementRecord {
            agent,
            from,
            to,
            at: now,
        });
        debug!(%agent, %from, %to, "Actor moved");
        true
    }

    /// Queue a movement for the next [`Grid::execute_movements`] batch.
    ///
    /// Returns `false` (and queues nothing) if the actor is unplaced or the
    /// target is out of bounds or impassable.
    pub fn request_movement(&mut self, agent: AgentId, target: Coord, priority: u32) -> bool {
        if !self.positions.contains_key(&agent) {
            return false;
        }
        let passable = self
            .cells
            .get(&target)
            .is_some_and(|cell| cell.terrain.can_move_through());
        if !passable {
            return false;
        }
        self.collision.request(agent, target, priority);
        true
    }

    /// Resolve and apply all queued movement requests.
    ///
    /// For each contested target the highest priority (then earliest)
    /// request is executed through [`Grid::move_actor`]; every other request
    /// for that target fails. Winners are applied in passes so a move into
    /// a cell vacated in the same batch succeeds regardless of submission
    /// order. Moves still blocked when a pass makes no progress (swaps,
    /// cycles, stationary occupants) fail. The request table is empty
    /// afterwards.
    pub fn execute_movements(&mut self) -> BTreeMap<AgentId, bool> {
        let (mut pending, losers) = self.collision.resolve();
        let mut results = BTreeMap::new();
        for loser in losers {
            debug!(agent = %loser.agent, target = %loser.target, "Movement lost conflict");
            results.insert(loser.agent, false);
        }
        loop {
            let before = pending.len();
            pending.retain(|winner| {
                if !self.is_empty(winner.target) {
                    return true;
                }
                let moved = self.move_actor(winner.agent, winner.target);
                results.insert(winner.agent, moved);
                false
            });
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for blocked in pending {
            debug!(agent = %blocked.agent, target = %blocked.target, "Movement blocked by occupant");
            results.insert(blocked.agent, false);
        }
        results
    }

    // -------------------------------------------------------------------
    // Structures and resources
    // -------------------------------------------------------------------

    /// Place a structure marker.
    ///
    /// Fails if `coord` is out of bounds or `structure` is
    /// [`Structure::None`]. A building needs buildable terrain and no other
    /// building, and may replace a scan marker; a scan marker needs a cell
    /// with no structure at all. An actor standing on the cell does not
    /// prevent either.
    pub fn place_structure(&mut self, coord: Coord, structure: Structure) -> bool {
        if !structure.is_present() {
            return false;
        }
        let Some(cell) = self.cells.get_mut(&coord) else {
            debug!(%coord, "Structure rejected: out of bounds");
            return false;
        };
        let allowed = match structure {
            // Marks territory only; never overwrites another marker.
            Structure::Scanned => !cell.has_structure(),
            Structure::Building { .. } | Structure::None => cell.can_build(),
        };
        if !allowed {
            debug!(%coord, "Structure rejected: existing structure or unbuildable terrain");
            return false;
        }
        cell.structure = structure;
        info!(%coord, ?structure, "Structure placed");
        true
    }

    /// Harvest up to `amount` of `kind` at `coord` on behalf of `agent`.
    ///
    /// Returns the amount harvested; `0` if there is no such cell or
    /// deposit. Non-zero harvests are appended to the extraction log.
    pub fn harvest_resource(
        &mut self,
        coord: Coord,
        kind: ResourceKind,
        amount: u32,
        agent: AgentId,
    ) -> u32 {
        let now = Utc::now();
        let Some(deposit) = self
            .cells
            .get_mut(&coord)
            .and_then(|cell| cell.terrain.deposits.get_mut(&kind))
        else {
            return 0;
        };
        let harvested = deposit.harvest(amount, now);
        if harvested > 0 {
            self.extraction_log.push(ExtractionRecord {
                agent,
                coord,
                kind,
                amount: harvested,
                at: now,
            });
            debug!(%agent, %coord, %kind, harvested, "Resource harvested");
        }
        harvested
    }

    /// Regenerate every deposit on the grid.
    ///
    /// Returns the units added per cell and resource kind (cells with no
    /// regeneration are omitted).
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ArithmeticOverflow`] on math failure.
    pub fn update_resources(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<Coord, BTreeMap<ResourceKind, u32>>, WorldError> {
        let mut results = BTreeMap::new();
        for (coord, cell) in &mut self.cells {
            let mut regen = BTreeMap::new();
            for (kind, deposit) in &mut cell.terrain.deposits {
                let added = deposit.regenerate(now)?;
                if added > 0 {
                    regen.insert(*kind, added);
                }
            }
            if !regen.is_empty() {
                results.insert(*coord, regen);
            }
        }
        Ok(results)
    }

    // -------------------------------------------------------------------
    // Pathfinding and views
    // -------------------------------------------------------------------

    /// Cheapest terrain-aware path. See [`pathfinding::find_path`].
    pub fn find_path(&self, start: Coord, goal: Coord) -> Vec<Coord> {
        pathfinding::find_path(self, start, goal)
    }

    /// Serializable snapshot of every cell and the position registry.
    pub fn snapshot(&self) -> GridSnapshot {
        let cells = self
            .cells
            .values()
            .map(|cell| {
                let snapshot = CellSnapshot {
                    x: cell.coord.x,
                    y: cell.coord.y,
                    occupied_by: cell.occupant,
                    structure: cell.structure,
                    terrain_type: cell.terrain.kind,
                    movement_cost: cell
                        .terrain
                        .can_move_through()
                        .then_some(cell.terrain.movement_cost),
                    can_build: cell.terrain.can_build_on(),
                    resources: cell.resources(),
                };
                (cell.coord.key(), snapshot)
            })
            .collect();

        GridSnapshot {
            width: self.width,
            height: self.height,
            cells,
            agent_positions: self.positions.clone(),
            total_cells: self.cells.len(),
        }
    }

    /// Activity counters and the most recent moves.
    pub fn metrics(&self) -> GridMetrics {
        let skip = self.movement_history.len().saturating_sub(RECENT_MOVEMENTS);
        GridMetrics {
            total_movements: self.movement_history.len(),
            resource_extractions: self.extraction_log.len(),
            active_agents: self.positions.len(),
            occupied_cells: self
                .cells
                .values()
                .filter(|cell| cell.occupant.is_some())
                .count(),
            structures: self.structure_count(),
            scanned_cells: self.scanned_cell_count(),
            recent_movements: self.movement_history.iter().skip(skip).copied().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use waypoint_types::TerrainKind;

    use super::*;
    use crate::resource::ResourceDeposit;

    fn grid() -> Grid {
        Grid::new(6, 5).unwrap()
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(
            Grid::new(0, 5),
            Err(WorldError::InvalidDimensions { width: 0, height: 5 })
        ));
    }

    #[test]
    fn place_and_query() {
        let mut g = grid();
        let a = AgentId::new();
        assert!(g.place_actor(a, Coord::new(1, 1)));
        assert_eq!(g.position_of(a), Some(Coord::new(1, 1)));
        assert!(!g.is_empty(Coord::new(1, 1)));
        assert_eq!(g.visited_cell_count(), 1);
    }

    #[test]
    fn place_rejects_occupied_out_of_bounds_and_duplicates() {
        let mut g = grid();
        let a = AgentId::new();
        let b = AgentId::new();
        assert!(g.place_actor(a, Coord::new(0, 0)));
        assert!(!g.place_actor(b, Coord::new(0, 0)));
        assert!(!g.place_actor(b, Coord::new(6, 0)));
        assert!(!g.place_actor(a, Coord::new(2, 2)));
        assert_eq!(g.position_of(a), Some(Coord::new(0, 0)));
        assert_eq!(g.position_of(b), None);
    }

    #[test]
    fn place_rejects_obstacle() {
        let mut g = grid();
        g.set_terrain(Coord::new(3, 3), TerrainDescriptor::of(TerrainKind::Obstacle));
        assert!(!g.place_actor(AgentId::new(), Coord::new(3, 3)));
    }

    #[test]
    fn move_updates_registry_and_history() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(0, 0));
        assert!(g.move_actor(a, Coord::new(0, 1)));
        assert!(g.is_empty(Coord::new(0, 0)));
        assert_eq!(g.position_of(a), Some(Coord::new(0, 1)));
        assert_eq!(g.movement_history().len(), 1);
        assert_eq!(g.metrics().total_movements, 1);
    }

    #[test]
    fn move_rejects_occupied_and_unplaced() {
        let mut g = grid();
        let a = AgentId::new();
        let b = AgentId::new();
        g.place_actor(a, Coord::new(0, 0));
        g.place_actor(b, Coord::new(1, 0));
        assert!(!g.move_actor(a, Coord::new(1, 0)));
        assert!(!g.move_actor(AgentId::new(), Coord::new(2, 2)));
        assert_eq!(g.position_of(a), Some(Coord::new(0, 0)));
    }

    #[test]
    fn structures_do_not_block_movement() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(0, 0));
        assert!(g.place_structure(Coord::new(0, 1), Structure::Building { owner: a }));
        assert!(g.is_empty(Coord::new(0, 1)));
        assert!(g.move_actor(a, Coord::new(0, 1)));
    }

    #[test]
    fn structure_rules() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(2, 2));
        // Building on your own square is allowed.
        assert!(g.place_structure(Coord::new(2, 2), Structure::Building { owner: a }));
        assert!(!g.place_structure(Coord::new(2, 2), Structure::Building { owner: a }));
        assert!(!g.place_structure(Coord::new(9, 9), Structure::Building { owner: a }));
        assert!(!g.place_structure(Coord::new(3, 3), Structure::None));
        g.set_terrain(Coord::new(4, 4), TerrainDescriptor::of(TerrainKind::Water));
        assert!(!g.place_structure(Coord::new(4, 4), Structure::Building { owner: a }));
        assert_eq!(g.structure_count(), 1);
    }

    #[test]
    fn harvest_logs_extraction() {
        let mut g = grid();
        let a = AgentId::new();
        let coord = Coord::new(1, 2);
        g.set_terrain(
            coord,
            TerrainDescriptor::of(TerrainKind::ResourceRich)
                .with_deposit(ResourceDeposit::new(ResourceKind::Energy, 20, 100, 0.0)),
        );
        assert_eq!(g.harvest_resource(coord, ResourceKind::Energy, 15, a), 15);
        assert_eq!(g.harvest_resource(coord, ResourceKind::Energy, 15, a), 5);
        assert_eq!(g.harvest_resource(coord, ResourceKind::Energy, 15, a), 0);
        assert_eq!(g.harvest_resource(coord, ResourceKind::Tools, 1, a), 0);
        assert_eq!(g.extraction_log().len(), 2);
    }

    #[test]
    fn observe_reports_neighbours() {
        let mut g = grid();
        let a = AgentId::new();
        let b = AgentId::new();
        g.place_actor(a, Coord::new(0, 0));
        g.place_actor(b, Coord::new(1, 0));
        let views = g.observe(Coord::new(0, 0));
        assert_eq!(views.len(), 2);
        assert!(views.iter().any(|v| v.occupant == Some(b) && v.direction == Direction::East));
    }

    #[test]
    fn scan_markers_are_not_buildings() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(1, 1));
        assert!(g.place_structure(Coord::new(1, 1), Structure::Scanned));
        assert!(!g.place_structure(Coord::new(1, 1), Structure::Scanned));
        assert_eq!(g.scanned_cell_count(), 1);
        assert_eq!(g.building_count(), 0);

        // A building replaces the marker; a scan never replaces a building.
        assert!(g.place_structure(Coord::new(1, 1), Structure::Building { owner: a }));
        assert!(!g.place_structure(Coord::new(1, 1), Structure::Scanned));
        assert_eq!(g.scanned_cell_count(), 0);
        assert_eq!(g.building_count(), 1);
        assert_eq!(g.metrics().structures, 1);
    }

    #[test]
    fn build_site_skips_occupied_and_built() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(0, 0));
        g.place_structure(Coord::new(0, 1), Structure::Building { owner: a });
        assert_eq!(g.find_build_site(), Some(Coord::new(0, 2)));
    }

    #[test]
    fn snapshot_has_every_cell() {
        let mut g = grid();
        let a = AgentId::new();
        g.place_actor(a, Coord::new(2, 0));
        g.set_terrain(Coord::new(5, 4), TerrainDescriptor::of(TerrainKind::Obstacle));
        let snap = g.snapshot();
        assert_eq!(snap.total_cells, 30);
        assert_eq!(snap.cells.len(), 30);
        assert_eq!(snap.agent_positions.get(&a), Some(&Coord::new(2, 0)));
        assert_eq!(snap.cells.get("2,0").and_then(|c| c.occupied_by), Some(a));
        assert_eq!(snap.cells.get("5,4").and_then(|c| c.movement_cost), None);
        let json = serde_json::to_string(&snap);
        assert!(json.is_ok());
    }

    #[test]
    fn generated_grid_is_reproducible() {
        let a = Grid::generate(8, 8, 99).unwrap();
        let b = Grid::generate(8, 8, 99).unwrap();
        let kinds_a: Vec<_> = a.cells().map(|c| c.terrain.kind).collect();
        let kinds_b: Vec<_> = b.cells().map(|c| c.terrain.kind).collect();
        assert_eq!(kinds_a, kinds_b);
    }
}
