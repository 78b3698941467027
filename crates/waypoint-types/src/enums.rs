//! Enumeration types shared across the Waypoint workspace.
//!
//! Terrain and resource kinds describe the spatial environment, [`Role`]
//! and [`Phase`] drive the mission orchestrator, and [`Priority`] /
//! [`MessageKind`] classify traffic on the coordination queue.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

/// The kind of terrain covering a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TerrainKind {
    /// Open ground. Normal movement and building.
    Plain,
    /// Rock or wreckage. Cannot be entered or built on.
    Obstacle,
    /// Ground carrying a resource deposit. Slightly easier to build on.
    ResourceRich,
    /// Rough ground. Doubles the movement cost.
    Difficult,
    /// Shallow water. Passable at a high cost, never buildable.
    Water,
}

impl TerrainKind {
    /// Whether actors may enter a cell of this terrain.
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Obstacle)
    }

    /// Whether structures may be placed on this terrain.
    pub const fn is_buildable(self) -> bool {
        !matches!(self, Self::Obstacle | Self::Water)
    }

    /// Default movement-cost multiplier. Impassable terrain is infinite.
    pub const fn movement_cost(self) -> f64 {
        match self {
            Self::Plain | Self::ResourceRich => 1.0,
            Self::Difficult => 2.0,
            Self::Water => 3.0,
            Self::Obstacle => f64::INFINITY,
        }
    }

    /// Default build-difficulty multiplier.
    pub const fn build_difficulty(self) -> f64 {
        match self {
            Self::Plain | Self::Water | Self::Obstacle => 1.0,
            Self::ResourceRich => 0.8,
            Self::Difficult => 1.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A kind of resource held in deposits and in the shared pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ResourceKind {
    /// Raw building material.
    Materials,
    /// Power for machines and actors.
    Energy,
    /// Tools used by builders.
    Tools,
    /// Scarce minerals found only in rich ground.
    RareMinerals,
}

impl ResourceKind {
    /// All resource kinds in declaration order.
    pub const ALL: [Self; 4] = [Self::Materials, Self::Energy, Self::Tools, Self::RareMinerals];

    /// The snake-case name used in message metadata and config files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Materials => "materials",
            Self::Energy => "energy",
            Self::Tools => "tools",
            Self::RareMinerals => "rare_minerals",
        }
    }

    /// Parse a snake-case resource name. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actors and mission
// ---------------------------------------------------------------------------

/// The role an actor plays in the mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    /// Explores the grid and reports findings.
    Scout,
    /// Analyses the grid and issues build directives.
    Strategist,
    /// Places structures.
    Builder,
}

impl Role {
    /// Lower-case role name used in log lines and briefings.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scout => "scout",
            Self::Strategist => "strategist",
            Self::Builder => "builder",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase of the mission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Phase {
    /// First tick: actors initialise.
    Init,
    /// The scout explores until coverage or the step ceiling is reached.
    Exploration,
    /// The strategist issues build directives.
    Analysis,
    /// The builder places structures.
    Construction,
    /// Optional polishing phase after construction.
    Optimization,
    /// Terminal phase. Ticks advance but no actor acts.
    Completion,
}

impl Phase {
    /// The role that acts during this phase, if any.
    pub const fn active_role(self) -> Option<Role> {
        match self {
            Self::Exploration => Some(Role::Scout),
            Self::Analysis | Self::Optimization => Some(Role::Strategist),
            Self::Construction => Some(Role::Builder),
            Self::Init | Self::Completion => None,
        }
    }

    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completion)
    }

    /// Lower-case phase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Exploration => "exploration",
            Self::Analysis => "analysis",
            Self::Construction => "construction",
            Self::Optimization => "optimization",
            Self::Completion => "completion",
        }
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// Message priority. Higher priorities are dequeued first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Priority {
    /// Background traffic.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Time-sensitive traffic.
    High,
    /// Must be handled before anything else.
    Urgent,
}

impl Priority {
    /// Numeric priority value (`Low` = 1 through `Urgent` = 4).
    pub const fn value(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

/// The purpose of a message on the coordination queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MessageKind {
    /// An instruction for the recipient.
    Command,
    /// A request for information.
    Query,
    /// Findings or status from the sender.
    Report,
    /// Acknowledges an earlier message.
    Ack,
    /// Reports a failure.
    Error,
    /// Coordination chatter (plans, follow-ups).
    Coordination,
    /// Asks the coordination layer for resources.
    ResourceRequest,
    /// Grants resources in reply to a request.
    ResourceAllocation,
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// A cardinal direction on the grid. North is towards `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// `y - 1`.
    North,
    /// `y + 1`.
    South,
    /// `x + 1`.
    East,
    /// `x - 1`.
    West,
}

impl Direction {
    /// All four directions in search order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Parse a direction word (case-insensitive).
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "north" | "n" | "up" => Some(Self::North),
            "south" | "s" | "down" => Some(Self::South),
            "east" | "e" | "right" => Some(Self::East),
            "west" | "w" | "left" => Some(Self::West),
            _ => None,
        }
    }

    /// Lower-case direction name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::Urgent.value(), 4);
    }

    #[test]
    fn terrain_rules() {
        assert!(!TerrainKind::Obstacle.is_passable());
        assert!(TerrainKind::Water.is_passable());
        assert!(!TerrainKind::Water.is_buildable());
        assert!(!TerrainKind::Obstacle.is_buildable());
        assert!(TerrainKind::Difficult.is_buildable());
        assert!(TerrainKind::Obstacle.movement_cost().is_infinite());
    }

    #[test]
    fn resource_kind_parse() {
        assert_eq!(ResourceKind::parse("materials"), Some(ResourceKind::Materials));
        assert_eq!(ResourceKind::parse(" Rare_Minerals "), Some(ResourceKind::RareMinerals));
        assert_eq!(ResourceKind::parse("gold"), None);
    }

    #[test]
    fn phase_roles() {
        assert_eq!(Phase::Exploration.active_role(), Some(Role::Scout));
        assert_eq!(Phase::Analysis.active_role(), Some(Role::Strategist));
        assert_eq!(Phase::Construction.active_role(), Some(Role::Builder));
        assert_eq!(Phase::Init.active_role(), None);
        assert!(Phase::Completion.is_terminal());
    }

    #[test]
    fn direction_parse() {
        assert_eq!(Direction::parse("North"), Some(Direction::North));
        assert_eq!(Direction::parse("w"), Some(Direction::West));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&MessageKind::ResourceRequest).unwrap_or_default();
        assert_eq!(json, "\"resource_request\"");
    }
}
