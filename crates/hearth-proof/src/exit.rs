//! Deferred, latched process exit.
//!
//! Proofs never exit the process themselves. They record an
//! [`ExitRequest`] with [`request_exit`]; the [`ExitSystem`] runs in the
//! last stage of the tick, after telemetry export, and hands the code to a
//! [`QuitHandle`] exactly once.
//!
//! Failure codes are sticky: the first nonzero code recorded wins and a
//! later zero never downgrades it. A zero code is held back while any armed
//! proof is still pending; a nonzero code quits at once.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use hearth_ecs::command::CommandBuffer;
use hearth_sim::resources::ExitRequest;
use hearth_sim::tick::System;
use hearth_sim::world::World;
use tracing::{debug, info};

/// Upsert the exit request in `slot`.
///
/// - No record yet: store `(exit_code, tick)`.
/// - Stored zero, incoming nonzero: overwrite.
/// - Anything else: keep the stored record.
pub fn request_exit(slot: &mut Option<ExitRequest>, tick: u32, exit_code: i32) {
    match slot {
        None => {
            *slot = Some(ExitRequest {
                exit_code,
                requested_tick: tick,
            });
        }
        Some(existing) if existing.exit_code == 0 && exit_code != 0 => {
            existing.exit_code = exit_code;
            existing.requested_tick = tick;
        }
        Some(existing) => {
            debug!(
                stored = existing.exit_code,
                incoming = exit_code,
                "exit request kept"
            );
        }
    }
}

/// The process-termination collaborator.
pub trait QuitHandle {
    fn quit(&mut self, exit_code: i32);
}

/// Thread-safe flag the headless runner polls to know when to stop.
#[derive(Debug, Clone, Default)]
pub struct QuitSignal {
    requested: Arc<AtomicBool>,
    code: Arc<AtomicI32>,
}

impl QuitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Option<i32> {
        self.requested
            .load(Ordering::Acquire)
            .then(|| self.code.load(Ordering::Acquire))
    }
}

impl QuitHandle for QuitSignal {
    fn quit(&mut self, exit_code: i32) {
        self.code.store(exit_code, Ordering::Release);
        self.requested.store(true, Ordering::Release);
    }
}

/// Issues the quit call at most once per run.
pub struct ExitSystem {
    quit: Box<dyn QuitHandle>,
    quit_issued: bool,
}

impl ExitSystem {
    pub fn new(quit: impl QuitHandle + 'static) -> Self {
        Self {
            quit: Box::new(quit),
            quit_issued: false,
        }
    }

    pub fn quit_issued(&self) -> bool {
        self.quit_issued
    }
}

impl System for ExitSystem {
    fn name(&self) -> &str {
        "exit"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if self.quit_issued {
            return;
        }
        let Some(request) = world.exit_request else {
            return;
        };
        if request.exit_code == 0 && world.pending_proofs > 0 {
            return;
        }
        self.quit_issued = true;
        info!(
            exit_code = request.exit_code,
            requested_tick = request.requested_tick,
            tick = world.clock().tick,
            "quit issued"
        );
        self.quit.quit(request.exit_code);
    }
}
