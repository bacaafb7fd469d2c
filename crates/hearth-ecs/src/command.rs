//! Deferred structural changes.
//!
//! Systems that need to add components, spawn entities or otherwise change
//! the shape of the world while they are iterating it queue a command here.
//! The tick loop applies the buffer after each system in strict FIFO order,
//! so the same systems in the same order always produce the same world.
//!
//! ```
//! use hearth_ecs::command::{CausalReason, CommandBuffer};
//!
//! let mut counter = 0u32;
//! let mut cmds: CommandBuffer<u32> = CommandBuffer::new();
//! cmds.push(None, CausalReason::GameRule("bump".to_owned()), |c| {
//!     *c += 1;
//!     Ok(())
//! });
//! let report = cmds.apply(&mut counter);
//! assert_eq!(report.success_count, 1);
//! assert_eq!(counter, 1);
//! ```

use tracing::warn;

use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// CausalReason
// ---------------------------------------------------------------------------

/// Why a command was queued; carried into warnings when it fails to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CausalReason {
    /// A gameplay rule fired (e.g. `"inventory_bootstrap"`).
    GameRule(String),
    /// A state machine moved between phases.
    StateTransition { from: String, to: String },
    /// Scenario setup or teardown.
    Scenario(String),
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

type ApplyFn<W> = Box<dyn FnOnce(&mut W) -> Result<(), EcsError> + Send>;

/// One queued mutation.
pub struct Command<W> {
    /// The entity the command is about, if any (used in diagnostics only).
    pub target: Option<EntityId>,
    pub reason: CausalReason,
    apply: ApplyFn<W>,
}

impl<W> std::fmt::Debug for Command<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Outcome of one [`CommandBuffer::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub success_count: usize,
    pub failed_count: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO queue of deferred mutations against a world of type `W`.
pub struct CommandBuffer<W> {
    commands: Vec<Command<W>>,
    last_report: ApplyReport,
}

impl<W> Default for CommandBuffer<W> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            last_report: ApplyReport::default(),
        }
    }
}

impl<W> CommandBuffer<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a mutation. It runs when the buffer is next applied.
    pub fn push<F>(&mut self, target: Option<EntityId>, reason: CausalReason, apply: F)
    where
        F: FnOnce(&mut W) -> Result<(), EcsError> + Send + 'static,
    {
        self.commands.push(Command {
            target,
            reason,
            apply: Box::new(apply),
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_report
    }

    /// Apply and drain every queued command in insertion order.
    ///
    /// A command that fails (usually a stale entity) is logged and skipped;
    /// the rest of the queue still applies.
    pub fn apply(&mut self, world: &mut W) -> ApplyReport {
        let mut report = ApplyReport::default();
        for command in self.commands.drain(..) {
            match (command.apply)(world) {
                Ok(()) => report.success_count += 1,
                Err(err) => {
                    report.failed_count += 1;
                    warn!(
                        target = ?command.target,
                        reason = ?command.reason,
                        "deferred command skipped: {err}"
                    );
                }
            }
        }
        self.last_report = report.clone();
        report
    }
}
