//! Engine binary for the Waypoint coordination core.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `waypoint-config.yaml` (or the path given as
//!    the first argument), applying environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Wrap the decision oracle in the circuit breaker and retry policy
//! 4. Build the simulation context (grid, coordination layer, actors)
//! 5. Run the mission until completion or `max_ticks`
//! 6. Log the result and print the final report as JSON

mod error;
mod report_callback;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use waypoint_core::config::{LoggingConfig, SimulationConfig};
use waypoint_core::context::SimulationContext;
use waypoint_core::decision::{DecisionOracle, ResilientOracle, StubOracle};
use waypoint_core::runner;

use crate::error::EngineError;
use crate::report_callback::LogCallback;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "waypoint-config.yaml";

/// Name the oracle breaker is registered under.
const ORACLE_BREAKER: &str = "decision_oracle";

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        width = config.grid.width,
        height = config.grid.height,
        seed = config.grid.seed,
        max_ticks = config.mission.max_ticks,
        parallel = config.execution.parallel,
        "Configuration loaded"
    );

    // 3. Decision oracle.
    if config.oracle.model != "stub" {
        warn!(model = %config.oracle.model, "No oracle backend is linked, using the stub oracle");
    }
    let oracle = Arc::new(ResilientOracle::new(StubOracle::new(), &config.oracle));
    let breaker = Arc::clone(oracle.breaker());
    let oracle: Arc<dyn DecisionOracle> = oracle;

    // 4. Simulation context.
    let mut ctx = SimulationContext::new(config, oracle)?;
    ctx.recovery_mut().register_breaker(ORACLE_BREAKER, breaker);
    info!(roster = ?ctx.roster(), "Simulation context ready");

    // 5. Run.
    let mut callback = LogCallback::new();
    let result = runner::run_simulation(&mut ctx, &mut callback).await;

    // 6. Report.
    runner::log_simulation_end(&result);
    let stats = ctx.recovery().statistics();
    info!(
        total_errors = stats.total_errors,
        recovery_rate = stats.recovery_rate,
        error_ticks = callback.error_ticks(),
        "Error statistics"
    );
    if let Some(report) = &result.final_report {
        println!("{}", serde_json::to_string_pretty(&report.mission)?);
    }

    info!(end_reason = ?result.end_reason, "waypoint-engine shutdown complete");
    Ok(())
}

/// Load the configuration file, falling back to defaults when the default
/// file is absent. An explicit path must exist.
fn load_config() -> Result<SimulationConfig, EngineError> {
    if let Some(path) = std::env::args().nth(1) {
        return Ok(SimulationConfig::from_file(&PathBuf::from(path))?);
    }
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        Ok(SimulationConfig::from_file(&path)?)
    } else {
        let mut config = SimulationConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log filter '{}': {e}", logging.level),
        })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
