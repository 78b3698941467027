//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `waypoint-config.yaml` at the
//! project root. Every section and field has a default, so a partial file
//! (or none at all) yields a runnable simulation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use waypoint_types::ResourceKind;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `waypoint-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Grid dimensions and terrain.
    #[serde(default)]
    pub grid: GridConfig,

    /// Mission phase thresholds and run bounds.
    #[serde(default)]
    pub mission: MissionConfig,

    /// Queue sizes and the starting resource pool.
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Decision oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Sequential or parallel actor turns.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `WAYPOINT_SEED` overrides `grid.seed`
    /// - `WAYPOINT_MAX_TICKS` overrides `mission.max_ticks`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `WAYPOINT_*` environment overrides. Unparsable values are
    /// ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(seed) = env_u64("WAYPOINT_SEED") {
            self.grid.seed = seed;
        }
        if let Some(max_ticks) = env_u64("WAYPOINT_MAX_TICKS") {
            self.mission.max_ticks = max_ticks;
        }
    }
}

/// Read an environment variable as `u64`.
fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// Number of columns.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Number of rows.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Terrain generation seed.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// When false every cell is plain ground.
    #[serde(default = "default_true")]
    pub terrain_enabled: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            seed: default_seed(),
            terrain_enabled: true,
        }
    }
}

/// Mission phase configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MissionConfig {
    /// Coverage fraction that ends exploration.
    #[serde(default = "default_exploration_threshold")]
    pub exploration_threshold: f64,

    /// Exploration ends after this many ticks regardless of coverage.
    #[serde(default = "default_exploration_step_limit")]
    pub exploration_step_limit: u64,

    /// Buildings needed to finish construction.
    #[serde(default = "default_building_target")]
    pub building_target: usize,

    /// Hard cap on ticks per run.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Loop from Construction back to Analysis every N construction ticks
    /// (0 = never).
    #[serde(default)]
    pub analysis_revisit_interval: u64,

    /// Go straight from Construction to Completion instead of through
    /// Optimization.
    #[serde(default = "default_true")]
    pub completion_after_construction: bool,

    /// Ticks spent in Optimization before Completion.
    #[serde(default = "default_optimization_ticks")]
    pub optimization_ticks: u64,

    /// Tick log lines kept in memory.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            exploration_threshold: default_exploration_threshold(),
            exploration_step_limit: default_exploration_step_limit(),
            building_target: default_building_target(),
            max_ticks: default_max_ticks(),
            analysis_revisit_interval: 0,
            completion_after_construction: true,
            optimization_ticks: default_optimization_ticks(),
            log_capacity: default_log_capacity(),
        }
    }
}

/// Coordination layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinationConfig {
    /// Maximum queued messages.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Messages kept in the history ring.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Starting resource pool.
    #[serde(default = "default_initial_pool")]
    pub initial_pool: BTreeMap<ResourceKind, u32>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_capacity: default_history_capacity(),
            initial_pool: default_initial_pool(),
        }
    }
}

/// Decision oracle configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OracleConfig {
    /// Model name passed to the oracle backend (`stub` uses no backend).
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Reply length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after a failed call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Retry delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failures that open the circuit.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// How long the circuit stays open, in milliseconds.
    #[serde(default = "default_breaker_recovery_ms")]
    pub breaker_recovery_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            breaker_threshold: default_breaker_threshold(),
            breaker_recovery_ms: default_breaker_recovery_ms(),
        }
    }
}

/// Actor turn execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionConfig {
    /// Run every actor's turn concurrently each tick.
    #[serde(default)]
    pub parallel: bool,

    /// Per-tick deadline for parallel turns, in milliseconds.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            turn_timeout_ms: default_turn_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_width() -> u32 {
    6
}

const fn default_height() -> u32 {
    5
}

const fn default_seed() -> u64 {
    42
}

const fn default_exploration_threshold() -> f64 {
    0.3
}

const fn default_exploration_step_limit() -> u64 {
    10
}

const fn default_building_target() -> usize {
    5
}

const fn default_max_ticks() -> u64 {
    100
}

const fn default_optimization_ticks() -> u64 {
    3
}

const fn default_log_capacity() -> usize {
    100
}

const fn default_queue_capacity() -> usize {
    1000
}

const fn default_history_capacity() -> usize {
    500
}

fn default_initial_pool() -> BTreeMap<ResourceKind, u32> {
    BTreeMap::from([
        (ResourceKind::Materials, 100),
        (ResourceKind::Energy, 50),
        (ResourceKind::Tools, 10),
    ])
}

fn default_model() -> String {
    String::from("stub")
}

const fn default_temperature() -> f64 {
    0.7
}

const fn default_max_tokens() -> u32 {
    64
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_base_delay_ms() -> u64 {
    2000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_breaker_threshold() -> u32 {
    5
}

const fn default_breaker_recovery_ms() -> u64 {
    60_000
}

const fn default_turn_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}

const fn default_true() -> bool {
    true
}
