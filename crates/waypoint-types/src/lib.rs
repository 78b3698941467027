//! Shared type definitions for the Waypoint coordination core.
//!
//! Every crate in the workspace speaks this vocabulary: actor and message
//! identifiers, grid coordinates, terrain and resource kinds, mission
//! phases, and the [`Message`] exchanged over the coordination queue.
//! Serialized types also derive `ts-rs` bindings so a dashboard consuming
//! grid snapshots can be typed against them.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers ([`AgentId`], [`MessageId`])
//! - [`enums`] -- Terrain, resource, role, phase, priority, and message kinds
//! - [`structs`] -- [`Coord`], [`Structure`], and [`Message`]

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{Direction, MessageKind, Phase, Priority, ResourceKind, Role, TerrainKind};
pub use ids::{AgentId, MessageId};
pub use structs::{Coord, Message, Structure};
