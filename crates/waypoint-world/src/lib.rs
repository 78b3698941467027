//! Spatial environment for the Waypoint coordination core.
//!
//! This crate models the shared world the actors move through: a
//! rectangular grid of cells with terrain, resource deposits, structure
//! markers, and a registry of actor positions. It offers collision-safe
//! immediate and batched movement, structure placement, resource harvesting,
//! and terrain-aware A* pathfinding.
//!
//! # Modules
//!
//! - [`cell`] -- A single [`Cell`] with occupant, structure, terrain, visits.
//! - [`collision`] -- Batched movement requests and priority resolution.
//! - [`error`] -- Error types for grid construction ([`WorldError`]).
//! - [`grid`] -- The [`Grid`] itself.
//! - [`pathfinding`] -- A* over cell movement costs.
//! - [`resource`] -- [`ResourceDeposit`] harvest and regeneration.
//! - [`snapshot`] -- Serializable grid views and activity records.
//! - [`terrain`] -- Terrain descriptors and seeded generation.

pub mod cell;
pub mod collision;
pub mod error;
pub mod grid;
pub mod pathfinding;
pub mod resource;
pub mod snapshot;
pub mod terrain;

// Re-export primary types at crate root.
pub use cell::Cell;
pub use collision::{CollisionResolver, MovementRequest};
pub use error::WorldError;
pub use grid::{Grid, NeighborView};
pub use resource::ResourceDeposit;
pub use snapshot::{CellSnapshot, ExtractionRecord, GridMetrics, GridSnapshot, MovementRecord};
pub use terrain::{TerrainDescriptor, TerrainGenerator};
