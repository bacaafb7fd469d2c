//! Fixed-step tick loop with staged, ordered systems.
//!
//! Each call to [`TickLoop::tick`]:
//!
//! 1. Runs every registered system once, stage by stage
//!    ([`Stage::Gameplay`] → [`Stage::Observe`] → [`Stage::Export`] →
//!    [`Stage::Exit`]), in registration order within a stage.
//! 2. Applies the shared [`CommandBuffer`] after each system, so deferred
//!    structural changes are visible to the next one.
//! 3. Advances the clock, but only while recording and unpaused.
//!
//! The stage order is the one ordering guarantee the harness relies on for
//! correctness: observers see the tick's final gameplay state, and the exit
//! system only runs after telemetry has been exported.
//!
//! ```
//! use hearth_sim::prelude::*;
//!
//! struct Noop;
//! impl System for Noop {
//!     fn name(&self) -> &str { "noop" }
//!     fn run(&mut self, _world: &mut World, _cmds: &mut CommandBuffer<World>) {}
//! }
//!
//! let mut tick_loop = TickLoop::new(World::new(1.0 / 60.0));
//! tick_loop.add_system(Stage::Gameplay, Noop);
//! tick_loop.run_ticks(10);
//! assert_eq!(tick_loop.world().clock().tick, 10);
//! ```

use std::time::{Duration, Instant};

use hearth_ecs::command::CommandBuffer;
use tracing::trace;

use crate::world::World;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A unit of per-tick work.
///
/// Systems own their private bookkeeping (timers, last-tick markers, proof
/// state) and receive the world mutably. By convention a system writes only
/// the components it owns.
pub trait System {
    /// Unique name, used for ordering constraints and diagnostics.
    fn name(&self) -> &str;

    fn run(&mut self, world: &mut World, cmds: &mut CommandBuffer<World>);
}

/// Execution stage. Stages run in declaration order every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// State machines that mutate the simulation.
    Gameplay,
    /// Read-only observers: detector, proofs, audit, heartbeat.
    Observe,
    /// Telemetry export.
    Export,
    /// Deferred process exit.
    Exit,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Wall-clock timings for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Time spent in each system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Time for the whole tick, command application included.
    pub total_time: Duration,
    /// Deferred commands that applied cleanly this tick.
    pub commands_applied: usize,
    /// Deferred commands that returned an error this tick.
    pub commands_failed: usize,
}

struct RegisteredSystem {
    stage: Stage,
    after: Vec<String>,
    system: Box<dyn System>,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

pub struct TickLoop {
    world: World,
    commands: CommandBuffer<World>,
    systems: Vec<RegisteredSystem>,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    pub fn new(world: World) -> Self {
        let dt = world.clock().fixed_delta_time;
        assert!(
            dt > 0.0 && dt.is_finite(),
            "fixed_dt must be positive and finite, got {dt}"
        );
        Self {
            world,
            commands: CommandBuffer::new(),
            systems: Vec::new(),
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a system at the end of `stage`.
    ///
    /// # Panics
    ///
    /// If a system with the same name is already registered.
    pub fn add_system(&mut self, stage: Stage, system: impl System + 'static) {
        self.add_system_after(stage, &[], system);
    }

    /// Register a system that must run after each system named in `after`.
    ///
    /// # Panics
    ///
    /// - A dependency is not registered yet, or sits in a later stage.
    /// - The name is already taken.
    /// - The dependency graph would contain a cycle.
    pub fn add_system_after(
        &mut self,
        stage: Stage,
        after: &[&str],
        system: impl System + 'static,
    ) {
        let name = system.name().to_owned();
        assert!(
            !self.systems.iter().any(|s| s.system.name() == name),
            "duplicate system name: {name:?}"
        );
        for dep in after {
            let found = self
                .systems
                .iter()
                .find(|s| s.system.name() == *dep)
                .unwrap_or_else(|| {
                    panic!("system '{name}' declares dependency on '{dep}', but '{dep}' is not registered")
                });
            assert!(
                found.stage <= stage,
                "system '{name}' in {stage:?} cannot run after '{dep}' in {:?}",
                found.stage
            );
        }

        let entry = RegisteredSystem {
            stage,
            after: after.iter().map(|s| s.to_string()).collect(),
            system: Box::new(system),
        };
        // Insert after the last system of the same or an earlier stage.
        let pos = self
            .systems
            .iter()
            .rposition(|s| s.stage <= stage)
            .map_or(0, |p| p + 1);
        self.systems.insert(pos, entry);
        self.validate_system_order();
    }

    /// Depth-first search for back edges in the `after` graph.
    fn validate_system_order(&self) {
        fn dfs(
            systems: &[RegisteredSystem],
            idx: usize,
            visited: &mut [bool],
            in_stack: &mut [bool],
        ) -> bool {
            if in_stack[idx] {
                return false;
            }
            if visited[idx] {
                return true;
            }
            visited[idx] = true;
            in_stack[idx] = true;
            for dep in &systems[idx].after {
                if let Some(dep_idx) = systems.iter().position(|s| s.system.name() == dep) {
                    if !dfs(systems, dep_idx, visited, in_stack) {
                        return false;
                    }
                }
            }
            in_stack[idx] = false;
            true
        }

        let mut visited = vec![false; self.systems.len()];
        let mut in_stack = vec![false; self.systems.len()];
        for i in 0..self.systems.len() {
            assert!(
                dfs(&self.systems, i, &mut visited, &mut in_stack),
                "cycle detected in system dependencies"
            );
        }
    }

    /// Run one tick. Returns whether the clock advanced.
    pub fn tick(&mut self) -> bool {
        let tick_start = Instant::now();
        let mut diagnostics = TickDiagnostics {
            system_times: Vec::with_capacity(self.systems.len()),
            ..Default::default()
        };

        for entry in &mut self.systems {
            let started = Instant::now();
            entry.system.run(&mut self.world, &mut self.commands);
            let report = self.commands.apply(&mut self.world);
            diagnostics.commands_applied += report.success_count;
            diagnostics.commands_failed += report.failed_count;
            diagnostics
                .system_times
                .push((entry.system.name().to_owned(), started.elapsed()));
        }

        let advanced = self.world.clock_mut().advance();
        diagnostics.total_time = tick_start.elapsed();
        trace!(tick = self.world.clock().tick, advanced, "tick complete");
        self.last_diagnostics = diagnostics;
        advanced
    }

    pub fn run_ticks(&mut self, count: u32) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Tick until `stop` returns true or `max_ticks` ticks have run.
    /// Returns the number of ticks executed.
    pub fn run_until(&mut self, max_ticks: u32, mut stop: impl FnMut(&World) -> bool) -> u32 {
        let mut ran = 0;
        while ran < max_ticks && !stop(&self.world) {
            self.tick();
            ran += 1;
        }
        ran
    }

    // -- accessors ----------------------------------------------------------

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for setup, host clock control and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Names in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.system.name()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
