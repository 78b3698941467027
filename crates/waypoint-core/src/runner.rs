//! Simulation loop runner.
//!
//! [`run_simulation`] drives ticks until the mission completes or the
//! configured `max_ticks` is reached, handing every [`StepReport`] to a
//! [`TickCallback`]. A failed tick does not stop the run; it is reported
//! and the loop carries on, unless the callback asks to stop.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::SimulationContext;
use crate::tick::StepReport;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The mission reached its terminal phase.
    MissionComplete,
    /// The configured `max_ticks` was reached first.
    MaxTicksReached,
    /// The callback asked to stop.
    Stopped,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Why the run ended.
    pub end_reason: EndReason,
    /// The last tick's report, if any tick ran.
    pub final_report: Option<StepReport>,
    /// Ticks executed by this run.
    pub total_ticks: u64,
    /// Ticks whose report carried an error status.
    pub failed_ticks: u64,
}

/// Callback invoked after each tick.
pub trait TickCallback: Send {
    /// Called with every tick's report. Return `false` to stop the run.
    fn on_tick(&mut self, report: &StepReport) -> bool;
}

/// A callback that never stops the run.
#[derive(Debug, Default)]
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &StepReport) -> bool {
        true
    }
}

/// Run ticks until the mission completes, `max_ticks` is reached, or the
/// callback stops the run.
///
/// Ticks already run on `ctx` count against `max_ticks`.
pub async fn run_simulation(
    ctx: &mut SimulationContext,
    callback: &mut dyn TickCallback,
) -> SimulationResult {
    let max_ticks = ctx.config().mission.max_ticks;
    let mut final_report = None;
    let mut total_ticks: u64 = 0;
    let mut failed_ticks: u64 = 0;

    info!(
        max_ticks,
        parallel = ctx.config().execution.parallel,
        "Simulation starting"
    );

    let end_reason = loop {
        if ctx.phase().is_terminal() {
            info!(tick = ctx.tick(), "Mission complete");
            break EndReason::MissionComplete;
        }
        if ctx.tick() >= max_ticks {
            info!(tick = ctx.tick(), max_ticks, "Tick limit reached");
            break EndReason::MaxTicksReached;
        }

        let report = ctx.advance_async().await;
        total_ticks = total_ticks.saturating_add(1);
        if !report.is_success() {
            failed_ticks = failed_ticks.saturating_add(1);
            warn!(tick = report.tick, error = ?report.error, "Tick reported an error");
        }

        let keep_going = callback.on_tick(&report);
        final_report = Some(report);
        if !keep_going {
            info!(tick = ctx.tick(), "Run stopped by callback");
            break EndReason::Stopped;
        }
    };

    SimulationResult {
        end_reason,
        final_report,
        total_ticks,
        failed_ticks,
    }
}

/// Log the end of a run.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        failed_ticks = result.failed_ticks,
        final_tick = result.final_report.as_ref().map(|r| r.tick),
        "Simulation ended"
    );

    if let Some(report) = &result.final_report {
        info!(
            tick = report.tick,
            phase = %report.phase,
            exploration = report.mission.exploration_progress,
            buildings = report.mission.buildings_built,
            errors = report.mission.error_recovery_attempts,
            "Final tick report"
        );
    } else {
        warn!("Simulation ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SimulationConfig;
    use crate::decision::StubOracle;

    /// Stops after a fixed number of ticks.
    struct StopAfter(u64);

    impl TickCallback for StopAfter {
        fn on_tick(&mut self, report: &StepReport) -> bool {
            report.tick < self.0
        }
    }

    fn context(max_ticks: u64) -> SimulationContext {
        let mut config = SimulationConfig::default();
        config.grid.terrain_enabled = false;
        config.mission.max_ticks = max_ticks;
        SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap()
    }

    #[tokio::test]
    async fn stops_at_max_ticks() {
        let mut ctx = context(4);
        let result = run_simulation(&mut ctx, &mut NoOpCallback).await;
        assert_eq!(result.end_reason, EndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 4);
        assert_eq!(result.final_report.unwrap().tick, 4);
    }

    #[tokio::test]
    async fn callback_can_stop_the_run() {
        let mut ctx = context(50);
        let result = run_simulation(&mut ctx, &mut StopAfter(2)).await;
        assert_eq!(result.end_reason, EndReason::Stopped);
        assert_eq!(result.total_ticks, 2);
        log_simulation_end(&result);
    }

    #[tokio::test]
    async fn zero_max_ticks_runs_nothing() {
        let mut ctx = context(0);
        let result = run_simulation(&mut ctx, &mut NoOpCallback).await;
        assert_eq!(result.end_reason, EndReason::MaxTicksReached);
        assert!(result.final_report.is_none());
    }
}
