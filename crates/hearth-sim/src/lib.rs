//! Hearth simulation -- the deterministic village gameplay layer.
//!
//! A [`TickLoop`](tick::TickLoop) owns a [`World`](world::World) and runs
//! registered [`System`](tick::System)s in fixed stage order every tick. The
//! gameplay systems in [`systems`] implement the villager state machines:
//! gather/deliver logistics, needs growth and satisfaction, goal selection,
//! a two-combatant duel and construction. [`movement`] and [`nav`] hold the
//! shared kinematics and risk-weighted routing.
//!
//! ```
//! use hearth_sim::prelude::*;
//!
//! let config = HarnessConfig::default();
//! let world = scenario::populate(ScenarioKind::VillagerLoop, &config);
//! let mut tick_loop = TickLoop::new(world);
//! systems::register_gameplay(&mut tick_loop, &config);
//! tick_loop.run_ticks(600);
//! assert!(tick_loop.world().total_stored() > 0.0);
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod components;
pub mod config;
pub mod movement;
pub mod nav;
pub mod resources;
pub mod rng;
pub mod scenario;
pub mod systems;
pub mod tick;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The scenario path names none of the built-in scenarios.
    #[error("unknown scenario '{path}'")]
    UnknownScenario { path: String },

    #[error(transparent)]
    Ecs(#[from] hearth_ecs::EcsError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::clock::{RewindMode, TickClock, TickDelta};
    pub use crate::components::*;
    pub use crate::config::{EnvSource, HarnessConfig, MapEnv, ProcessEnv, ProofToggle};
    pub use crate::resources::{
        CombatDuel, ExitRequest, ProofLog, RunContext, TelemetryBuffer, TelemetryRecord,
    };
    pub use crate::scenario::{self, ScenarioBuilder, ScenarioKind};
    pub use crate::systems;
    pub use crate::tick::{Stage, System, TickDiagnostics, TickLoop};
    pub use crate::world::World;
    pub use crate::SimError;
    pub use hearth_ecs::prelude::*;
}
