//! Terrain-aware A* pathfinding over the grid.
//!
//! Costs are the entered cell's [`Cell::step_cost`]: terrain multiplier
//! scaled by [`COST_SCALE`], doubled while occupied. The heuristic is the
//! Manhattan distance times the cheapest possible step, so it never
//! overestimates. Impassable cells are pruned from expansion.
//!
//! The open set is a `BTreeSet` keyed on `(f_score, coord)`, so expansion
//! order is deterministic for a given grid.
//!
//! [`Cell::step_cost`]: crate::cell::Cell::step_cost
//! [`COST_SCALE`]: crate::cell::COST_SCALE

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use waypoint_types::Coord;

use crate::grid::Grid;

/// Cost of the cheapest step (plain terrain) in scaled units.
const MIN_STEP_COST: u64 = 1000;

/// Find the cheapest path from `start` to `goal`, inclusive of both ends.
///
/// Returns `[start]` when `start == goal` and an empty vector when the goal
/// is unreachable, out of bounds, or impassable.
pub fn find_path(grid: &Grid, start: Coord, goal: Coord) -> Vec<Coord> {
    if start == goal {
        return vec![start];
    }
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return Vec::new();
    }
    if grid.cell(goal).and_then(crate::cell::Cell::step_cost).is_none() {
        return Vec::new();
    }

    let mut g_score: BTreeMap<Coord, u64> = BTreeMap::new();
    let mut came_from: BTreeMap<Coord, Coord> = BTreeMap::new();
    let mut open: BTreeSet<(u64, Coord)> = BTreeSet::new();
    let mut closed: BTreeSet<Coord> = BTreeSet::new();

    g_score.insert(start, 0);
    open.insert((heuristic(start, goal), start));

    while let Some((_, current)) = open.pop_first() {
        if current == goal {
            return reconstruct(&came_from, start, goal);
        }
        if !closed.insert(current) {
            continue;
        }
        let current_g = g_score.get(&current).copied().unwrap_or(u64::MAX);

        for neighbor in grid.neighbors(current) {
            if closed.contains(&neighbor) {
                continue;
            }
            let Some(step) = grid.cell(neighbor).and_then(crate::cell::Cell::step_cost) else {
                continue;
            };
            let Some(tentative) = current_g.checked_add(step) else {
                continue;
            };

            let is_better = g_score
                .get(&neighbor)
                .is_none_or(|&existing| tentative < existing);
            if is_better {
                if let Some(&old_g) = g_score.get(&neighbor) {
                    open.remove(&(old_g.saturating_add(heuristic(neighbor, goal)), neighbor));
                }
                g_score.insert(neighbor, tentative);
                came_from.insert(neighbor, current);
                open.insert((tentative.saturating_add(heuristic(neighbor, goal)), neighbor));
            }
        }
    }

    Vec::new()
}

/// Total scaled cost of walking `path` (excluding the start cell).
pub fn path_cost(grid: &Grid, path: &[Coord]) -> Option<u64> {
    path.iter().skip(1).try_fold(0_u64, |acc, coord| {
        let step = grid.cell(*coord)?.step_cost()?;
        acc.checked_add(step)
    })
}

/// Admissible Manhattan heuristic in scaled cost units.
fn heuristic(from: Coord, to: Coord) -> u64 {
    u64::from(from.manhattan(to)).saturating_mul(MIN_STEP_COST)
}

/// Walk the predecessor map back from `goal` to `start`.
fn reconstruct(came_from: &BTreeMap<Coord, Coord>, start: Coord, goal: Coord) -> Vec<Coord> {
    let mut path = VecDeque::new();
    let mut current = goal;
    path.push_front(current);
    while let Some(&previous) = came_from.get(&current) {
        path.push_front(previous);
        current = previous;
        if current == start {
            break;
        }
    }
    path.into_iter().collect()
}
