//! Periodic progress line for human operators.

use std::collections::BTreeMap;

use hearth_ecs::command::CommandBuffer;
use hearth_sim::tick::System;
use hearth_sim::world::World;
use tracing::info;

/// Count of gatherers per phase, keyed by phase name.
pub fn phase_histogram(world: &World) -> BTreeMap<&'static str, usize> {
    let mut histogram = BTreeMap::new();
    for (_, state) in world.gatherers.iter() {
        *histogram.entry(state.phase.name()).or_insert(0) += 1;
    }
    histogram
}

/// `idle=1 harvest=2`, in phase-name order.
pub fn format_histogram(histogram: &BTreeMap<&'static str, usize>) -> String {
    histogram
        .iter()
        .map(|(phase, count)| format!("{phase}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct HeartbeatSystem {
    interval: u32,
    beats: u32,
}

impl HeartbeatSystem {
    /// An interval of 0 disables the heartbeat.
    pub fn new(interval: u32) -> Self {
        Self { interval, beats: 0 }
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }
}

impl System for HeartbeatSystem {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        let tick = world.clock().tick;
        if self.interval == 0 || !world.clock().is_live() || tick % self.interval != 0 {
            return;
        }
        self.beats += 1;
        let phases = format_histogram(&phase_histogram(world));
        info!(
            tick,
            scenario_tick = world.run.scenario_tick(tick),
            villagers = world.gatherers.len(),
            stored = world.total_stored(),
            phases = %phases,
            "heartbeat"
        );
    }
}
