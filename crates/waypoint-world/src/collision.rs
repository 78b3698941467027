//! Batched movement requests with priority-based conflict resolution.
//!
//! Actors submit requests during a coordination phase; [`CollisionResolver::resolve`]
//! groups them by target cell and picks one winner per cell: the highest
//! priority, ties broken by submission order. The request table is cleared
//! after every resolution.

use std::collections::BTreeMap;

use waypoint_types::{AgentId, Coord};

/// A pending request to move an actor to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementRequest {
    /// The actor that wants to move.
    pub agent: AgentId,
    /// The destination cell.
    pub target: Coord,
    /// Higher values win contested cells.
    pub priority: u32,
    /// Submission order, used to break priority ties.
    pub sequence: u64,
}

/// Collects movement requests and resolves them in one batch.
#[derive(Debug, Clone, Default)]
pub struct CollisionResolver {
    /// Latest request per actor.
    requests: BTreeMap<AgentId, MovementRequest>,
    /// Next submission sequence number.
    next_sequence: u64,
}

impl CollisionResolver {
    /// Create an empty resolver.
    pub const fn new() -> Self {
        Self {
            requests: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Queue a request. A later request from the same actor replaces the
    /// earlier one.
    pub fn request(&mut self, agent: AgentId, target: Coord, priority: u32) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.requests.insert(
            agent,
            MovementRequest {
                agent,
                target,
                priority,
                sequence,
            },
        );
    }

    /// Number of pending requests.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// Resolve all pending requests and clear the table.
    ///
    /// Returns `(winners, losers)`. Winners are ordered by submission so the
    /// caller can execute them deterministically.
    pub fn resolve(&mut self) -> (Vec<MovementRequest>, Vec<MovementRequest>) {
        let mut by_target: BTreeMap<Coord, Vec<MovementRequest>> = BTreeMap::new();
        for request in std::mem::take(&mut self.requests).into_values() {
            by_target.entry(request.target).or_default().push(request);
        }

        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for mut contenders in by_target.into_values() {
            // Highest priority first; earliest submission breaks ties.
            contenders.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.sequence.cmp(&b.sequence))
            });
            let mut iter = contenders.into_iter();
            if let Some(first) = iter.next() {
                winners.push(first);
            }
            losers.extend(iter);
        }

        winners.sort_by_key(|r| r.sequence);
        (winners, losers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_request_wins() {
        let mut resolver = CollisionResolver::new();
        let a = AgentId::new();
        resolver.request(a, Coord::new(1, 1), 1);
        let (winners, losers) = resolver.resolve();
        assert_eq!(winners.len(), 1);
        assert!(losers.is_empty());
        assert_eq!(resolver.pending(), 0);
    }

    #[test]
    fn higher_priority_wins_contested_cell() {
        let mut resolver = CollisionResolver::new();
        let low = AgentId::new();
        let high = AgentId::new();
        resolver.request(low, Coord::new(2, 2), 1);
        resolver.request(high, Coord::new(2, 2), 5);
        let (winners, losers) = resolver.resolve();
        assert_eq!(winners.first().map(|r| r.agent), Some(high));
        assert_eq!(losers.first().map(|r| r.agent), Some(low));
    }

    #[test]
    fn tie_goes_to_first_submitter() {
        let mut resolver = CollisionResolver::new();
        let first = AgentId::new();
        let second = AgentId::new();
        resolver.request(first, Coord::new(0, 1), 3);
        resolver.request(second, Coord::new(0, 1), 3);
        let (winners, _) = resolver.resolve();
        assert_eq!(winners.first().map(|r| r.agent), Some(first));
    }

    #[test]
    fn re_request_replaces_previous() {
        let mut resolver = CollisionResolver::new();
        let a = AgentId::new();
        resolver.request(a, Coord::new(0, 1), 1);
        resolver.request(a, Coord::new(1, 0), 1);
        assert_eq!(resolver.pending(), 1);
        let (winners, _) = resolver.resolve();
        assert_eq!(winners.first().map(|r| r.target), Some(Coord::new(1, 0)));
    }
}
