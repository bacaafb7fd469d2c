//! Gameplay-stage state machines.
//!
//! Registration order inside the gameplay stage is fixed by
//! [`register_gameplay`]: combat publishes threats, goal selection reads them,
//! needs and gather act on the selected goal, then construction and the
//! probe movers.

pub mod combat;
pub mod construction;
pub mod gather;
pub mod goals;
pub mod needs;

use hearth_ecs::entity::EntityId;

use crate::components::{AgentJob, JobPhase, JobType, MoveIntent, MovePlan};
use crate::config::HarnessConfig;
use crate::movement::ProbeMovementSystem;
use crate::nav::RoutePlannerSystem;
use crate::tick::{Stage, TickLoop};
use crate::world::World;

pub use combat::CombatSystem;
pub use construction::ConstructionSystem;
pub use gather::GatherSystem;
pub use goals::GoalSelectionSystem;
pub use needs::NeedsSystem;

/// Register every gameplay system in its canonical order.
pub fn register_gameplay(tick_loop: &mut TickLoop, config: &HarnessConfig) {
    tick_loop.add_system(Stage::Gameplay, CombatSystem::new(config.combat.clone()));
    tick_loop.add_system_after(
        Stage::Gameplay,
        &["combat"],
        GoalSelectionSystem::new(config.needs.clone()),
    );
    tick_loop.add_system_after(
        Stage::Gameplay,
        &["goal_selection"],
        NeedsSystem::new(config.needs.clone()),
    );
    tick_loop.add_system_after(
        Stage::Gameplay,
        &["goal_selection"],
        GatherSystem::new(config.gather.clone()),
    );
    tick_loop.add_system_after(
        Stage::Gameplay,
        &["goal_selection"],
        ConstructionSystem::new(config.build.clone()),
    );
    tick_loop.add_system(Stage::Gameplay, ProbeMovementSystem::new());
    tick_loop.add_system(Stage::Gameplay, RoutePlannerSystem::new());
}

/// Overwrite the villager's published intent, if it has an intent record.
pub(crate) fn publish_job(
    world: &mut World,
    entity: EntityId,
    job_type: JobType,
    job_phase: JobPhase,
    target: Option<EntityId>,
    carry_count: f32,
) {
    let (move_intent, move_plan) = match job_phase {
        JobPhase::Seek | JobPhase::Deliver => (MoveIntent::ToTarget, MovePlan::Direct),
        _ => (MoveIntent::Hold, MovePlan::None),
    };
    if let Some(job) = world.jobs.get_mut(entity) {
        *job = AgentJob {
            job_type,
            job_phase,
            move_intent,
            move_plan,
            target,
            carry_count,
        };
    }
}
