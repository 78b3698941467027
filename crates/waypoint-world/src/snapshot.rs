//! Serializable views of the grid for read accessors and step reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_types::{AgentId, Coord, ResourceKind, Structure, TerrainKind};

/// One entry in the append-only movement history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// The actor that moved.
    pub agent: AgentId,
    /// Where it came from.
    pub from: Coord,
    /// Where it went.
    pub to: Coord,
    /// When the move happened.
    pub at: DateTime<Utc>,
}

/// One entry in the append-only resource-extraction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// The harvesting actor.
    pub agent: AgentId,
    /// The harvested cell.
    pub coord: Coord,
    /// The harvested resource.
    pub kind: ResourceKind,
    /// Units removed from the deposit.
    pub amount: u32,
    /// When the harvest happened.
    pub at: DateTime<Utc>,
}

/// Serialized state of a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// The actor standing here.
    pub occupied_by: Option<AgentId>,
    /// The structure marker.
    pub structure: Structure,
    /// Terrain kind.
    pub terrain_type: TerrainKind,
    /// Movement-cost multiplier, `None` when impassable.
    pub movement_cost: Option<f64>,
    /// Whether a structure could be placed here by terrain rules.
    pub can_build: bool,
    /// Current deposit amounts.
    pub resources: BTreeMap<ResourceKind, u32>,
}

/// Serialized state of the whole grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Cells keyed by `"x,y"`.
    pub cells: BTreeMap<String, CellSnapshot>,
    /// Current actor positions.
    pub agent_positions: BTreeMap<AgentId, Coord>,
    /// Number of cells.
    pub total_cells: usize,
}

/// Counters describing grid activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridMetrics {
    /// Moves recorded in the movement history.
    pub total_movements: usize,
    /// Harvests recorded in the extraction log.
    pub resource_extractions: usize,
    /// Actors currently placed on the grid.
    pub active_agents: usize,
    /// Cells with an occupant.
    pub occupied_cells: usize,
    /// Cells with a structure marker.
    pub structures: usize,
    /// Cells a scout has marked as scanned.
    pub scanned_cells: usize,
    /// The most recent movement-history entries (at most ten).
    pub recent_movements: Vec<MovementRecord>,
}
