//! Actor turns on tokio's blocking pool.
//!
//! A turn may sit in a synchronous oracle call, retry backoff included, so
//! async callers never run it on a runtime worker. In parallel mode every
//! actor acts in the same tick; otherwise only the phase's actor does.
//! Results are joined against one deadline for the whole tick; a turn that
//! misses it, or whose worker panics, counts as a failed turn for that
//! tick. The late worker keeps running in the background and releases its
//! actor when it finishes.
//!
//! The order in which parallel turns' messages reach the queue is the
//! roster order of the joins, not the order in which turns finished, and
//! callers must not rely on it.

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use waypoint_types::{AgentId, Message, Role};

use crate::actor::TurnOutcome;
use crate::context::{ActorSlot, SimulationContext};
use crate::tick::{self, StepReport, TickError};

/// The result of one parallel turn.
#[derive(Debug)]
pub struct TurnResult {
    /// The actor that took the turn.
    pub agent: AgentId,
    /// Its role.
    pub role: Role,
    /// The messages it was handed.
    pub inbox: Vec<Message>,
    /// What came back.
    pub result: Result<TurnOutcome, TickError>,
}

/// Run every actor's turn concurrently and join them before `timeout`
/// elapses.
///
/// Inboxes are drained before any turn starts, so a message sent this
/// tick is delivered next tick.
pub async fn run_parallel_turns(ctx: &SimulationContext, tick: u64, timeout: Duration) -> Vec<TurnResult> {
    join_turns(ctx, &ctx.actors, tick, timeout).await
}

/// Spawn a blocking turn for each of `slots` and join them before
/// `timeout` elapses.
async fn join_turns(
    ctx: &SimulationContext,
    slots: &[ActorSlot],
    tick: u64,
    timeout: Duration,
) -> Vec<TurnResult> {
    let started = Instant::now();
    let mut pending = Vec::with_capacity(slots.len());
    for slot in slots {
        let inbox = ctx.coordination.get_messages_for_agent(slot.id);
        let env = ctx.turn_env(tick);
        let worker_slot = slot.clone();
        let worker_inbox = inbox.clone();
        let handle = tokio::task::spawn_blocking(move || {
            worker_slot
                .lock()
                .take_turn(&env, &worker_inbox)
                .map_err(|source| TickError::Actor {
                    agent: worker_slot.id,
                    source,
                })
        });
        pending.push((slot.id, slot.role, inbox, handle));
    }

    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let mut results = Vec::with_capacity(pending.len());
    for (agent, role, inbox, handle) in pending {
        let remaining = timeout.saturating_sub(started.elapsed());
        let result = match tokio::time::timeout(remaining, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                warn!(%agent, error = %join_err, "Parallel turn aborted");
                Err(TickError::TurnAborted {
                    agent,
                    message: join_err.to_string(),
                })
            }
            Err(_) => {
                warn!(%agent, timeout_ms, "Parallel turn timed out");
                Err(TickError::TurnTimeout { agent, timeout_ms })
            }
        };
        results.push(TurnResult {
            agent,
            role,
            inbox,
            result,
        });
    }
    debug!(tick, turns = results.len(), elapsed = ?started.elapsed(), "Turns joined");
    results
}

/// Turn deadline from the execution config.
const fn turn_timeout(ctx: &SimulationContext) -> Duration {
    Duration::from_millis(ctx.config.execution.turn_timeout_ms)
}

/// Run one sequential tick with the phase's actor turn on the blocking
/// pool. Apart from the turn deadline it behaves like
/// [`tick::run_tick`].
pub async fn run_tick_offloaded(ctx: &mut SimulationContext) -> StepReport {
    let mut frame = tick::open_tick(ctx);

    if let Some(role) = frame.phase.active_role() {
        match ctx.slot_for(role) {
            Some(slot) => {
                let results = join_turns(ctx, &[slot], frame.tick, turn_timeout(ctx)).await;
                for turn in results {
                    tick::settle_turn(ctx, &mut frame, turn.agent, turn.role, &turn.inbox, turn.result);
                }
            }
            None => tick::record_failure(ctx, &mut frame, &TickError::MissingActor { role }),
        }
    } else if frame.phase.is_terminal() {
        frame.line("Mission complete, no actor active");
    }

    tick::close_tick(ctx, frame)
}

/// Run one tick with every actor acting concurrently.
///
/// The first and terminal phases take no turns, as in the sequential tick.
pub async fn run_tick_parallel(ctx: &mut SimulationContext) -> StepReport {
    let mut frame = tick::open_tick(ctx);

    if frame.phase.active_role().is_some() {
        let results = run_parallel_turns(ctx, frame.tick, turn_timeout(ctx)).await;
        for turn in results {
            tick::settle_turn(ctx, &mut frame, turn.agent, turn.role, &turn.inbox, turn.result);
        }
    }

    tick::close_tick(ctx, frame)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use waypoint_types::Phase;

    use super::*;
    use crate::config::SimulationConfig;
    use crate::decision::{DecisionOracle, OracleError, StubOracle};
    use crate::observation::Observation;

    fn parallel_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.grid.terrain_enabled = false;
        config.execution.parallel = true;
        config
    }

    #[tokio::test]
    async fn every_actor_acts() {
        let mut ctx = SimulationContext::new(parallel_config(), Arc::new(StubOracle::new())).unwrap();
        ctx.advance_async().await;
        let report = ctx.advance_async().await;
        assert!(report.is_success());
        assert!(report.actors.iter().all(|status| status.turns == 1));
        assert_eq!(report.mission.error_recovery_attempts, 0);
    }

    /// Sleeps past any reasonable deadline for the scout only.
    struct SlowScout;

    impl DecisionOracle for SlowScout {
        fn decide(&self, observation: &Observation, _: &str) -> Result<String, OracleError> {
            if observation.role == Role::Scout {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(String::from("WAIT"))
        }
    }

    #[tokio::test]
    async fn offloaded_tick_matches_the_sequential_one() {
        let mut config = parallel_config();
        config.execution.parallel = false;
        let mut blocking = SimulationContext::new(config.clone(), Arc::new(StubOracle::new())).unwrap();
        let mut offloaded = SimulationContext::new(config, Arc::new(StubOracle::new())).unwrap();

        for _ in 0..3 {
            let expected = blocking.advance();
            let report = offloaded.advance_async().await;
            assert!(report.is_success());
            assert_eq!(report.phase, expected.phase);
            assert_eq!(report.log_lines.len(), expected.log_lines.len());
            let turns: Vec<u64> = report.actors.iter().map(|a| a.turns).collect();
            let expected_turns: Vec<u64> = expected.actors.iter().map(|a| a.turns).collect();
            assert_eq!(turns, expected_turns);
        }
    }

    #[tokio::test]
    async fn slow_sequential_turn_does_not_stall_the_runtime() {
        let mut config = parallel_config();
        config.execution.parallel = false;
        config.execution.turn_timeout_ms = 50;
        let mut ctx = SimulationContext::new(config, Arc::new(SlowScout)).unwrap();
        ctx.advance_async().await;

        // The scout's turn sleeps on the blocking pool; the deadline fires on
        // this single-threaded runtime, which a blocking call would prevent.
        let report = ctx.advance_async().await;
        assert!(report.is_success());
        assert_eq!(report.mission.error_recovery_attempts, 1);
        assert!(report.log_lines.iter().any(|l| l.contains("exceeded 50ms")));
    }

    #[tokio::test]
    async fn late_turn_is_a_recovered_timeout() {
        let mut config = parallel_config();
        config.execution.turn_timeout_ms = 50;
        let mut ctx = SimulationContext::new(config, Arc::new(SlowScout)).unwrap();
        ctx.advance_async().await;
        let report = ctx.advance_async().await;

        assert!(report.is_success());
        assert_eq!(report.phase, Phase::Exploration);
        assert_eq!(report.mission.error_recovery_attempts, 1);
        assert!(report.log_lines.iter().any(|l| l.contains("exceeded 50ms")));
        let stats = ctx.recovery().statistics();
        assert_eq!(stats.total_errors, 1);
    }
}
