//! Mission orchestrator for the Waypoint coordination core.
//!
//! A [`SimulationContext`] owns the grid, the coordination layer, the
//! mission state, and three actors (scout, strategist, builder). Each tick
//! the actor for the current mission phase observes the grid, asks the
//! decision oracle for an action, acts, and sends at most one message; the
//! mission then advances through its phases on explicit transition rules.
//!
//! # Modules
//!
//! - [`actor`] -- The [`Actor`] trait and the three roles
//! - [`briefing`] -- Per-role briefing templates rendered with `minijinja`
//! - [`config`] -- Configuration loading from `waypoint-config.yaml`
//! - [`context`] -- [`SimulationContext`], reset, and read accessors
//! - [`decision`] -- The [`DecisionOracle`] seam, stub, scripted and
//!   resilient oracles
//! - [`mission`] -- [`MissionState`] and the phase transition function
//! - [`observation`] -- What an actor sees before deciding
//! - [`parallel`] -- Actor turns on the blocking pool with a tick deadline
//! - [`parse`] -- Oracle reply parsing into typed actions
//! - [`runner`] -- The bounded run loop
//! - [`tick`] -- One orchestrator tick and the [`StepReport`]
//!
//! [`Actor`]: actor::Actor
//! [`SimulationContext`]: context::SimulationContext
//! [`DecisionOracle`]: decision::DecisionOracle
//! [`MissionState`]: mission::MissionState
//! [`StepReport`]: tick::StepReport

pub mod actor;
pub mod briefing;
pub mod config;
pub mod context;
pub mod decision;
pub mod mission;
pub mod observation;
pub mod parallel;
pub mod parse;
pub mod runner;
pub mod tick;
