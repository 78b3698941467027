//! The strategist: picks build sites and orders the builder to build.

use std::collections::BTreeSet;

use waypoint_types::{AgentId, Coord, Message, MessageKind, Priority, Role};
use waypoint_world::Grid;

use super::{Actor, ActorCore, ActorError, TurnEnv, TurnOutcome, can_build_here};
use crate::parse::Action;

/// Prefix of every build order.
pub const BUILD_ORDER_PREFIX: &str = "STRATEGIC_BUILD_ORDER";

/// Issues build orders for free buildable cells.
#[derive(Debug, Clone)]
pub struct Strategist {
    core: ActorCore,
    /// Sites already ordered.
    issued: BTreeSet<Coord>,
}

impl Strategist {
    /// A new strategist.
    pub fn new(id: AgentId) -> Self {
        Self {
            core: ActorCore::new(id, Role::Strategist),
            issued: BTreeSet::new(),
        }
    }

    /// Sites already ordered.
    pub const fn issued(&self) -> &BTreeSet<Coord> {
        &self.issued
    }

    /// The first free buildable cell not yet ordered, scanning column by
    /// column.
    fn scan(&self, grid: &Grid) -> Option<Coord> {
        grid.cells()
            .find(|cell| {
                cell.is_unoccupied() && cell.can_build() && !self.issued.contains(&cell.coord)
            })
            .map(|cell| cell.coord)
    }
}

impl Actor for Strategist {
    fn core(&self) -> &ActorCore {
        &self.core
    }

    fn take_turn(&mut self, env: &TurnEnv, inbox: &[Message]) -> Result<TurnOutcome, ActorError> {
        self.core.begin_turn(inbox);
        let (action, oracle_error) = self.core.consult(env, inbox)?;

        if let Action::RequestResource { kind, amount } = action {
            let message = self.core.resource_request(kind, amount);
            return Ok(TurnOutcome {
                message: Some(message),
                action: Some(action),
                oracle_error,
                ..TurnOutcome::default()
            });
        }

        let site = {
            let grid = env.lock_grid();
            match action {
                Action::SuggestBuild(coord) | Action::Build(coord)
                    if can_build_here(&grid, coord, self.core.id()) =>
                {
                    Some(coord)
                }
                _ => self.scan(&grid),
            }
        };

        let Some(site) = site else {
            self.core.set_status("No empty space to suggest");
            return Ok(TurnOutcome {
                action: Some(action),
                oracle_error,
                ..TurnOutcome::default()
            });
        };

        self.issued.insert(site);
        self.core.set_status(format!("Suggested Build at {site}"));
        let mut order = Message::new(self.core.id(), format!("{BUILD_ORDER_PREFIX}: Build at {site}"))
            .with_kind(MessageKind::Command)
            .with_priority(Priority::High)
            .with_metadata("x", site.x.to_string())
            .with_metadata("y", site.y.to_string());
        if let Some(builder) = env.peer(Role::Builder) {
            order = order.to(builder).requiring_ack();
        }

        Ok(TurnOutcome {
            message: Some(order),
            action: Some(action),
            directive: Some(site),
            oracle_error,
            ..TurnOutcome::default()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use waypoint_types::{Structure, TerrainKind};
    use waypoint_world::TerrainDescriptor;

    use super::*;
    use crate::actor::test_support::env;
    use crate::decision::{ScriptedOracle, StubOracle};

    #[test]
    fn orders_first_free_site_to_builder() {
        let mut grid = Grid::new(4, 3).unwrap();
        let strategist = AgentId::new();
        let builder = AgentId::new();
        grid.place_actor(builder, Coord::new(0, 0));
        grid.place_actor(strategist, Coord::new(1, 0));
        let env = env(
            grid,
            Arc::new(StubOracle::new()),
            &[(Role::Strategist, strategist), (Role::Builder, builder)],
        );
        let mut actor = Strategist::new(strategist);

        let outcome = actor.take_turn(&env, &[]).unwrap();
        assert_eq!(outcome.directive, Some(Coord::new(0, 1)));
        let order = outcome.message.unwrap();
        assert_eq!(order.content, "STRATEGIC_BUILD_ORDER: Build at (0, 1)");
        assert_eq!(order.recipient, Some(builder));
        assert!(order.requires_ack);

        // The next turn picks a different site.
        let next = actor.take_turn(&env, &[]).unwrap();
        assert_eq!(next.directive, Some(Coord::new(0, 2)));
    }

    #[test]
    fn honours_valid_suggestion_and_skips_invalid() {
        let mut grid = Grid::new(4, 4).unwrap();
        let strategist = AgentId::new();
        grid.place_actor(strategist, Coord::new(3, 3));
        grid.set_terrain(Coord::new(1, 1), TerrainDescriptor::of(TerrainKind::Water));
        let oracle =
            ScriptedOracle::new().with_script(Role::Strategist, ["SUGGEST_BUILD 2,2", "SUGGEST_BUILD 1,1"]);
        let env = env(grid, Arc::new(oracle), &[(Role::Strategist, strategist)]);
        let mut actor = Strategist::new(strategist);

        let first = actor.take_turn(&env, &[]).unwrap();
        assert_eq!(first.directive, Some(Coord::new(2, 2)));
        // No builder on the roster: the order is broadcast.
        assert!(first.message.unwrap().is_broadcast());

        let second = actor.take_turn(&env, &[]).unwrap();
        assert_eq!(second.directive, Some(Coord::new(0, 0)));
    }

    #[test]
    fn full_grid_yields_no_order() {
        let mut grid = Grid::new(1, 2).unwrap();
        let strategist = AgentId::new();
        grid.place_actor(strategist, Coord::new(0, 0));
        grid.place_structure(Coord::new(0, 1), Structure::Building { owner: strategist });
        let env = env(grid, Arc::new(StubOracle::new()), &[]);
        let mut actor = Strategist::new(strategist);

        let outcome = actor.take_turn(&env, &[]).unwrap();
        assert!(outcome.message.is_none());
        assert!(outcome.directive.is_none());
        assert_eq!(actor.core().status_line(), "No empty space to suggest");
    }
}
