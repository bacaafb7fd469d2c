//! Villagers walk, harvest and the storehouses fill up.
//!
//! Also writes the `BANK:` marker CI aggregates on.

use std::collections::BTreeMap;

use glam::Vec3;
use hearth_ecs::entity::EntityId;
use hearth_sim::movement::xz_distance;
use hearth_sim::world::World;

use crate::telemetry::bank_marker;
use crate::verdict::{Evaluation, ProofCriteria, Verdict};

pub struct GatherProof {
    min_distance: f32,
    test_id: String,
    baseline_stored: Option<f32>,
    origins: BTreeMap<EntityId, Vec3>,
    max_moved: f32,
}

impl GatherProof {
    pub fn new(min_distance: f32, test_id: impl Into<String>) -> Self {
        Self {
            min_distance,
            test_id: test_id.into(),
            baseline_stored: None,
            origins: BTreeMap::new(),
            max_moved: 0.0,
        }
    }

    fn stored_delta(&self, world: &World) -> f32 {
        let now = world.total_stored();
        now - self.baseline_stored.unwrap_or(now)
    }
}

impl ProofCriteria for GatherProof {
    fn name(&self) -> &'static str {
        "VillagerGatherProof"
    }

    fn loop_id(&self) -> &'static str {
        "villager_gather"
    }

    fn expected_rule(&self) -> &'static str {
        "stored_delta>0&&moved>min_distance"
    }

    fn failure_exit_code(&self) -> i32 {
        3
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        if self.baseline_stored.is_none() {
            self.baseline_stored = Some(world.total_stored());
        }
        for (entity, _) in world.gatherers.iter() {
            let Some(pos) = world.position(entity) else {
                continue;
            };
            let origin = *self.origins.entry(entity).or_insert(pos);
            self.max_moved = self.max_moved.max(xz_distance(origin, pos));
        }

        let delta = self.stored_delta(world);
        if delta > 0.0 && self.max_moved > self.min_distance {
            Evaluation::pass(
                delta,
                format!("moved={:.2} villagers={}", self.max_moved, self.origins.len()),
            )
        } else {
            Evaluation::Pending
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let delta = self.stored_delta(world);
        let reason = if self.origins.is_empty() {
            "no_villagers"
        } else if self.max_moved <= self.min_distance {
            "villagers_static"
        } else {
            "nothing_stored"
        };
        (
            reason.to_owned(),
            delta,
            format!("moved={:.2} stored={:.2}", self.max_moved, world.total_stored()),
        )
    }

    fn on_verdict(&mut self, world: &mut World, verdict: &Verdict) {
        let delta = self.stored_delta(world).round() as i32;
        bank_marker(
            world,
            &self.test_id,
            verdict.pass,
            verdict.reason.as_deref(),
            delta,
        );
    }
}
