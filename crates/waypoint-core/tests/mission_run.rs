//! End-to-end mission runs on the default 6x5 grid with the stub oracle.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use waypoint_core::config::SimulationConfig;
use waypoint_core::context::SimulationContext;
use waypoint_core::decision::StubOracle;
use waypoint_core::runner::{EndReason, NoOpCallback, run_simulation};
use waypoint_core::tick::StepStatus;
use waypoint_types::{Coord, Phase, Role};

fn plain_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.grid.terrain_enabled = false;
    config
}

fn context(config: SimulationConfig) -> SimulationContext {
    SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap()
}

#[test]
fn scout_moves_or_reports_on_its_first_turn() {
    let mut ctx = context(plain_config());
    let init = ctx.advance();
    assert_eq!(init.phase, Phase::Exploration);

    let report = ctx.advance();
    assert_eq!(report.status, StepStatus::Success);

    let scout = report.actors.iter().find(|a| a.role == Role::Scout).unwrap();
    let moved = scout.position != Some(Coord::new(2, 0));
    let reported = !ctx.coordination().queue().history(10).is_empty();
    assert!(moved || reported);
    assert_eq!(scout.turns, 1);
}

#[test]
fn exploration_progress_never_decreases() {
    let mut ctx = context(plain_config());
    let mut last = 0.0_f64;
    for _ in 0..20 {
        let report = ctx.advance();
        assert!(report.mission.exploration_progress >= last);
        last = report.mission.exploration_progress;
    }
    assert!(last > 0.0);
}

#[test]
fn only_the_phase_actor_takes_turns() {
    let mut ctx = context(plain_config());
    ctx.advance();
    for _ in 0..3 {
        let report = ctx.advance();
        if report.phase != Phase::Exploration {
            break;
        }
        let builder = report.actors.iter().find(|a| a.role == Role::Builder).unwrap();
        assert_eq!(builder.turns, 0);
    }
}

#[tokio::test]
async fn stub_mission_completes_when_analysis_is_revisited() {
    let mut config = plain_config();
    config.mission.analysis_revisit_interval = 2;
    config.mission.max_ticks = 200;
    let target = config.mission.building_target;
    let mut ctx = context(config);

    let result = run_simulation(&mut ctx, &mut NoOpCallback).await;

    assert_eq!(result.end_reason, EndReason::MissionComplete);
    assert_eq!(result.failed_ticks, 0);
    let last = result.final_report.unwrap();
    assert_eq!(last.phase, Phase::Completion);
    assert!(last.mission.buildings_built >= target);
    assert!(ctx.logs().iter().any(|line| line.contains("Phase changed")));
}

#[tokio::test]
async fn parallel_run_keeps_every_actor_busy() {
    let mut config = plain_config();
    config.execution.parallel = true;
    let mut ctx = context(config);

    ctx.advance_async().await;
    let mut last = 0.0_f64;
    for tick in 2..=8_u64 {
        let report = ctx.advance_async().await;
        assert!(report.is_success());
        assert!(report.mission.exploration_progress >= last);
        last = report.mission.exploration_progress;
        assert!(report.actors.iter().all(|a| a.turns == tick - 1));
    }
    assert_ne!(ctx.phase(), Phase::Init);
}
