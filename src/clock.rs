//! Simulation time sources.
//!
//! `GridModel` never reads wall-clock time directly; it asks a [`Clock`]
//! for the timestamp associated with a tick number. Tests pin a
//! [`DeterministicClock`] so `simulation_time` is reproducible; production
//! callers may prefer [`WallClock`] to stamp snapshots with real time while
//! the tick-to-tick physics stays deterministic.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the `simulation_time` stamped onto each tick's snapshot.
pub trait Clock: Send + Sync {
    /// Returns the simulation time for `tick_number`, given the configured
    /// `tick_rate`.
    fn simulation_time(&self, tick_number: u64, tick_rate: Duration) -> Duration;
}

/// Stamps ticks with wall-clock time elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: SystemTime,
}

impl WallClock {
    /// Creates a wall clock anchored to the current time.
    pub fn new() -> Self {
        Self {
            origin: SystemTime::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn simulation_time(&self, _tick_number: u64, _tick_rate: Duration) -> Duration {
        self.origin.elapsed().unwrap_or(Duration::ZERO)
    }
}

/// Stamps ticks with `start + tick_number * tick_step`, ignoring wall-clock
/// time entirely. Used in tests and anywhere reproducible snapshots matter.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicClock {
    start: Duration,
    tick_step: Duration,
}

impl DeterministicClock {
    /// Creates a clock that starts at `start` and advances by `tick_step`
    /// per tick, independent of the tick rate passed to
    /// [`Clock::simulation_time`].
    pub fn new(start: Duration, tick_step: Duration) -> Self {
        Self { start, tick_step }
    }

    /// Creates a clock starting at `Duration::ZERO` that advances by
    /// `tick_rate` (the configured Δt) per tick — the common case.
    pub fn from_tick_rate(tick_rate: Duration) -> Self {
        Self::new(Duration::ZERO, tick_rate)
    }
}

impl Clock for DeterministicClock {
    fn simulation_time(&self, tick_number: u64, _tick_rate: Duration) -> Duration {
        self.start + self.tick_step.saturating_mul(tick_number as u32)
    }
}

/// Returns the current unix time in whole seconds, used only for
/// human-facing lifecycle timestamps (creation/start/completion), never for
/// anything that feeds the deterministic tick pipeline.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
