//! Terrain descriptors and seeded terrain generation.
//!
//! Generation is deterministic: the same seed always yields the same
//! layout. Each cell rolls once:
//!
//! | Roll        | Terrain        | Notes                                   |
//! |-------------|----------------|-----------------------------------------|
//! | `< 0.10`    | `Obstacle`     | impassable, not buildable               |
//! | `< 0.20`    | `Difficult`    | movement x2.0, build x1.5               |
//! | `< 0.30`    | `ResourceRich` | 70% chance of a deposit of 10..=50      |
//! | otherwise   | `Plain`        |                                         |

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use waypoint_types::{ResourceKind, TerrainKind};

use crate::resource::{DEFAULT_MAX_AMOUNT, ResourceDeposit};

/// Probability that a cell is an obstacle.
const OBSTACLE_CHANCE: f64 = 0.1;
/// Cumulative probability bound for difficult terrain.
const DIFFICULT_BOUND: f64 = 0.2;
/// Cumulative probability bound for resource-rich terrain.
const RESOURCE_RICH_BOUND: f64 = 0.3;
/// Chance that resource-rich ground actually carries a deposit.
const DEPOSIT_CHANCE: f64 = 0.7;
/// Regeneration rate for generated deposits (units per second).
const GENERATED_REGEN_RATE: f64 = 0.1;

/// Terrain of a single cell: kind, cost multipliers, and deposits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainDescriptor {
    /// The terrain kind.
    pub kind: TerrainKind,
    /// Movement-cost multiplier. Infinite for impassable terrain.
    pub movement_cost: f64,
    /// Build-difficulty multiplier.
    pub build_difficulty: f64,
    /// Deposits keyed by resource kind.
    pub deposits: BTreeMap<ResourceKind, ResourceDeposit>,
}

impl TerrainDescriptor {
    /// A descriptor with the default multipliers for `kind` and no deposits.
    pub const fn of(kind: TerrainKind) -> Self {
        Self {
            kind,
            movement_cost: kind.movement_cost(),
            build_difficulty: kind.build_difficulty(),
            deposits: BTreeMap::new(),
        }
    }

    /// Plain ground.
    pub const fn plain() -> Self {
        Self::of(TerrainKind::Plain)
    }

    /// Attach a deposit, replacing any existing deposit of the same kind.
    #[must_use]
    pub fn with_deposit(mut self, deposit: ResourceDeposit) -> Self {
        self.deposits.insert(deposit.kind, deposit);
        self
    }

    /// Whether actors may enter this terrain.
    pub fn can_move_through(&self) -> bool {
        self.kind.is_passable() && self.movement_cost.is_finite()
    }

    /// Whether structures may be placed on this terrain.
    pub const fn can_build_on(&self) -> bool {
        self.kind.is_buildable()
    }
}

impl Default for TerrainDescriptor {
    fn default() -> Self {
        Self::plain()
    }
}

/// Deterministic terrain generator.
#[derive(Debug)]
pub struct TerrainGenerator {
    rng: StdRng,
}

impl TerrainGenerator {
    /// Create a generator for the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Roll the terrain for the next cell.
    pub fn next_terrain(&mut self) -> TerrainDescriptor {
        let roll: f64 = self.rng.random();
        if roll < OBSTACLE_CHANCE {
            TerrainDescriptor::of(TerrainKind::Obstacle)
        } else if roll < DIFFICULT_BOUND {
            TerrainDescriptor::of(TerrainKind::Difficult)
        } else if roll < RESOURCE_RICH_BOUND {
            let terrain = TerrainDescriptor::of(TerrainKind::ResourceRich);
            if self.rng.random_bool(DEPOSIT_CHANCE) {
                terrain.with_deposit(self.random_deposit())
            } else {
                terrain
            }
        } else {
            TerrainDescriptor::plain()
        }
    }

    /// A deposit of a random kind holding 10..=50 units.
    fn random_deposit(&mut self) -> ResourceDeposit {
        let index = self.rng.random_range(0..ResourceKind::ALL.len());
        let kind = ResourceKind::ALL
            .get(index)
            .copied()
            .unwrap_or(ResourceKind::Materials);
        let amount = self.rng.random_range(10..=50);
        ResourceDeposit::new(kind, amount, DEFAULT_MAX_AMOUNT, GENERATED_REGEN_RATE)
    }
}
