//! The tick/time source.
//!
//! [`TickClock`] is owned by the [`TickLoop`](crate::tick::TickLoop) and read
//! by every system. Systems never advance it; the loop does, once per tick,
//! and only while recording and unpaused.

use serde::{Deserialize, Serialize};

/// Whether the host is producing new ticks or replaying recorded ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewindMode {
    #[default]
    Record,
    Playback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickClock {
    pub tick: u32,
    pub fixed_delta_time: f32,
    pub is_paused: bool,
    pub mode: RewindMode,
}

impl TickClock {
    pub fn new(fixed_delta_time: f32) -> Self {
        Self {
            tick: 0,
            fixed_delta_time,
            is_paused: false,
            mode: RewindMode::Record,
        }
    }

    /// True when gameplay and most observers are allowed to act.
    pub fn is_live(&self) -> bool {
        self.mode == RewindMode::Record && !self.is_paused
    }

    /// Advance by one tick if live. Returns whether the tick moved.
    pub(crate) fn advance(&mut self) -> bool {
        if self.is_live() {
            self.tick += 1;
            true
        } else {
            false
        }
    }

    /// Seconds represented by `ticks` fixed steps.
    pub fn seconds(&self, ticks: u32) -> f32 {
        ticks as f32 * self.fixed_delta_time
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}

/// Per-system delta-time derivation from tick advances.
///
/// Each system that integrates over time keeps one of these. The delta is
/// `(tick - last_tick) * fixed_dt`, or zero when the tick repeated or went
/// backwards, which keeps replayed ticks from double-integrating.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickDelta {
    last_tick: Option<u32>,
}

impl TickDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta for the first observation is one fixed step.
    pub fn step(&mut self, clock: &TickClock) -> f32 {
        let dt = match self.last_tick {
            None => clock.fixed_delta_time,
            Some(last) if clock.tick > last => clock.seconds(clock.tick - last),
            Some(_) => 0.0,
        };
        self.last_tick = Some(clock.tick);
        dt
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }
}
