//! Hearth ECS -- the minimal entity substrate under the village simulation.
//!
//! Three pieces, nothing more:
//!
//! - [`entity`]: generational [`EntityId`](entity::EntityId) handles and
//!   their allocator. Handles are weak; liveness is always checked.
//! - [`sparse`]: [`SparseSet`](sparse::SparseSet) component storage, one per
//!   component type, used as the "does this entity have X" capability check.
//! - [`command`]: a FIFO [`CommandBuffer`](command::CommandBuffer) for
//!   structural changes deferred until the running system releases the world.
//!
//! ```
//! use hearth_ecs::prelude::*;
//!
//! let mut alloc = EntityAllocator::new();
//! let mut health: SparseSet<f32> = SparseSet::new();
//!
//! let e = alloc.allocate();
//! health.insert(e, 100.0);
//! assert!(health.contains(e));
//!
//! alloc.free(e);
//! assert!(!alloc.is_alive(e));
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod entity;
pub mod sparse;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by entity operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle's generation no longer matches its slot, or it was never
    /// allocated.
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A component the operation depends on is absent.
    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::command::{ApplyReport, CausalReason, Command, CommandBuffer};
    pub use crate::entity::{EntityAllocator, EntityId};
    pub use crate::sparse::SparseSet;
    pub use crate::EcsError;
}
