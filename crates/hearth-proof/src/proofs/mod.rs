//! The built-in proofs.
//!
//! Each one is a [`ProofCriteria`](crate::verdict::ProofCriteria) paired with
//! the scenario it activates on. [`register_all`] wires every proof into the
//! observe stage.

pub mod build;
pub mod collision;
pub mod combat;
pub mod gather;
pub mod movement;
pub mod navpref;
pub mod needs;

use hearth_sim::config::{HarnessConfig, ProofToggle};
use hearth_sim::scenario::ScenarioKind;
use hearth_sim::tick::{Stage, TickLoop};

use crate::repetition::RepetitionProof;
use crate::verdict::{ProofCriteria, ProofSystem};

pub use build::BuildProof;
pub use collision::CollisionProof;
pub use combat::CombatProof;
pub use gather::GatherProof;
pub use movement::MovementProof;
pub use navpref::NavPreferenceProof;
pub use needs::NeedsProof;

fn add<C: ProofCriteria + 'static>(
    tick_loop: &mut TickLoop,
    config: &HarnessConfig,
    kind: ScenarioKind,
    criteria: C,
    toggle: ProofToggle,
) {
    let file_name = kind.file_name();
    let suffixes = [kind.name(), file_name.as_str()];
    let system = ProofSystem::for_scenario(criteria, toggle, config, &suffixes);
    tick_loop.add_system(Stage::Observe, system);
}

/// Register one system per proof. Inactive proofs are registered too and
/// stay silent.
pub fn register_all(tick_loop: &mut TickLoop, config: &HarnessConfig) {
    let p = &config.proofs;
    let t = &config.tuning;
    add(
        tick_loop,
        config,
        ScenarioKind::MovementProbe,
        MovementProof::new(t.movement_epsilon),
        p.movement.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::VillagerLoop,
        GatherProof::new(t.gather_min_distance, t.bank_test_id.clone()),
        p.gather.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::CombatDuel,
        CombatProof::new(),
        p.combat.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::NeedsCycle,
        NeedsProof::new(t.needs_high_water, t.needs_low_water),
        p.needs.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::VillageBuild,
        BuildProof::new(),
        p.build.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::NavPreference,
        NavPreferenceProof::new(),
        p.navpref.clone(),
    );
    add(
        tick_loop,
        config,
        ScenarioKind::CollisionProbe,
        CollisionProof::new(
            t.collision_contact_epsilon,
            t.collision_penetration_tolerance,
        ),
        p.collision.clone(),
    );

    // The repetition verdict lands at the window tick; the configured
    // timeout is only the grace period past it.
    let repetition = ProofToggle {
        timeout_ticks: config
            .detector
            .window_ticks
            .saturating_add(p.repetition.timeout_ticks),
        ..p.repetition.clone()
    };
    add(
        tick_loop,
        config,
        ScenarioKind::RepetitionLivelock,
        RepetitionProof::new(config.detector.clone()),
        repetition,
    );
}
