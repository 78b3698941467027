//! Tick callback that mirrors the tick log into tracing.

use tracing::{info, warn};
use waypoint_core::runner::TickCallback;
use waypoint_core::tick::StepReport;

/// Logs every tick's `[Step n]` lines and counts error ticks.
#[derive(Debug, Default)]
pub struct LogCallback {
    error_ticks: u64,
}

impl LogCallback {
    /// A callback with no ticks seen.
    pub const fn new() -> Self {
        Self { error_ticks: 0 }
    }

    /// Ticks that reported an error.
    pub const fn error_ticks(&self) -> u64 {
        self.error_ticks
    }
}

impl TickCallback for LogCallback {
    fn on_tick(&mut self, report: &StepReport) -> bool {
        for line in &report.log_lines {
            info!(tick = report.tick, phase = %report.phase, "{line}");
        }
        if !report.is_success() {
            self.error_ticks = self.error_ticks.saturating_add(1);
            warn!(
                tick = report.tick,
                error = report.error.as_deref().unwrap_or("unknown"),
                "Tick failed, showing last good grid"
            );
        }
        true
    }
}
