//! Resource deposits attached to terrain.
//!
//! A [`ResourceDeposit`] holds a current `amount`, a `max_amount` ceiling,
//! and a `regen_rate` in units per second. Harvesting removes at most what
//! is there; regeneration converts elapsed wall-clock time into whole units
//! and never pushes the amount past the ceiling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use waypoint_types::ResourceKind;

use crate::error::WorldError;

/// Default ceiling for generated deposits.
pub const DEFAULT_MAX_AMOUNT: u32 = 100;

/// A harvestable stock of one resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeposit {
    /// The resource held by this deposit.
    pub kind: ResourceKind,
    /// Units currently available. Always `<= max_amount`.
    amount: u32,
    /// Regeneration ceiling.
    max_amount: u32,
    /// Units regenerated per elapsed second.
    regen_rate: f64,
    /// Start of the not-yet-regenerated time window.
    last_harvest: DateTime<Utc>,
}

impl ResourceDeposit {
    /// Create a deposit. `amount` is clamped to `max_amount`, and a negative
    /// or non-finite rate is treated as zero.
    pub fn new(kind: ResourceKind, amount: u32, max_amount: u32, regen_rate: f64) -> Self {
        Self {
            kind,
            amount: amount.min(max_amount),
            max_amount,
            regen_rate: if regen_rate.is_finite() && regen_rate > 0.0 {
                regen_rate
            } else {
                0.0
            },
            last_harvest: Utc::now(),
        }
    }

    /// Units currently available.
    pub const fn amount(&self) -> u32 {
        self.amount
    }

    /// Regeneration ceiling.
    pub const fn max_amount(&self) -> u32 {
        self.max_amount
    }

    /// Units regenerated per second.
    pub const fn regen_rate(&self) -> f64 {
        self.regen_rate
    }

    /// When the deposit was last harvested or regenerated.
    pub const fn last_harvest(&self) -> DateTime<Utc> {
        self.last_harvest
    }

    /// Remove up to `requested` units, returning the amount actually taken.
    ///
    /// `taken + remaining` always equals the amount before the call.
    pub fn harvest(&mut self, requested: u32, now: DateTime<Utc>) -> u32 {
        let taken = requested.min(self.amount);
        self.amount = self.amount.saturating_sub(taken);
        if taken > 0 {
            self.last_harvest = now;
        }
        taken
    }

    /// Add `floor(elapsed_seconds * regen_rate)` units, capped at the ceiling.
    ///
    /// Returns the number of units added. The regeneration window only
    /// advances by the time that produced whole units, so frequent calls
    /// still accumulate fractional progress.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ArithmeticOverflow`] if checked arithmetic fails.
    pub fn regenerate(&mut self, now: DateTime<Utc>) -> Result<u32, WorldError> {
        if self.regen_rate <= 0.0 {
            return Ok(0);
        }
        if self.amount >= self.max_amount {
            self.last_harvest = now;
            return Ok(0);
        }

        let elapsed_ms = now.signed_duration_since(self.last_harvest).num_milliseconds();
        if elapsed_ms <= 0 {
            return Ok(0);
        }

        // Millisecond counts below 2^53 are exact in f64.
        #[allow(clippy::cast_precision_loss)]
        let produced = (elapsed_ms as f64 / 1000.0 * self.regen_rate).floor();
        if produced < 1.0 {
            return Ok(0);
        }

        let headroom = self
            .max_amount
            .checked_sub(self.amount)
            .ok_or(WorldError::ArithmeticOverflow)?;

        // `produced` is finite and positive; clamp before narrowing.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let produced_units = produced.min(f64::from(u32::MAX)) as u32;
        let added = produced_units.min(headroom);

        self.amount = self
            .amount
            .checked_add(added)
            .ok_or(WorldError::ArithmeticOverflow)?;

        if self.amount >= self.max_amount {
            self.last_harvest = now;
        } else {
            // Consume only the time that produced whole units.
            #[allow(clippy::cast_possible_truncation)]
            let consumed_ms = (f64::from(added) / self.regen_rate * 1000.0).floor() as i64;
            self.last_harvest = self
                .last_harvest
                .checked_add_signed(Duration::milliseconds(consumed_ms))
                .ok_or(WorldError::ArithmeticOverflow)?;
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_deposit(amount: u32, max: u32, rate: f64) -> ResourceDeposit {
        ResourceDeposit::new(ResourceKind::Materials, amount, max, rate)
    }

    #[test]
    fn harvest_takes_requested() {
        let mut dep = make_deposit(40, 100, 0.0);
        assert_eq!(dep.harvest(15, Utc::now()), 15);
        assert_eq!(dep.amount(), 25);
    }

    #[test]
    fn harvest_takes_remaining_when_short() {
        let mut dep = make_deposit(10, 100, 0.0);
        assert_eq!(dep.harvest(25, Utc::now()), 10);
        assert_eq!(dep.amount(), 0);
        assert_eq!(dep.harvest(5, Utc::now()), 0);
    }

    #[test]
    fn new_clamps_amount() {
        let dep = make_deposit(500, 100, 0.1);
        assert_eq!(dep.amount(), 100);
    }

    #[test]
    fn regen_uses_elapsed_seconds() {
        let mut dep = make_deposit(0, 100, 0.5);
        let start = dep.last_harvest();
        let added = dep.regenerate(start + Duration::seconds(10));
        assert_eq!(added.ok(), Some(5));
        assert_eq!(dep.amount(), 5);
    }

    #[test]
    fn regen_capped_at_max() {
        let mut dep = make_deposit(95, 100, 1.0);
        let start = dep.last_harvest();
        let added = dep.regenerate(start + Duration::seconds(60));
        assert_eq!(added.ok(), Some(5));
        assert_eq!(dep.amount(), 100);
    }

    #[test]
    fn regen_accumulates_fractional_progress() {
        let mut dep = make_deposit(0, 100, 0.1);
        let start = dep.last_harvest();
        // 4 seconds at 0.1/s is 0.4 units: nothing yet.
        assert_eq!(dep.regenerate(start + Duration::seconds(4)).ok(), Some(0));
        // 12 seconds in total is 1.2 units.
        assert_eq!(dep.regenerate(start + Duration::seconds(12)).ok(), Some(1));
        assert_eq!(dep.amount(), 1);
    }

    #[test]
    fn regen_zero_rate_is_noop() {
        let mut dep = make_deposit(3, 100, 0.0);
        let start = dep.last_harvest();
        assert_eq!(dep.regenerate(start + Duration::hours(1)).ok(), Some(0));
        assert_eq!(dep.amount(), 3);
    }
}
