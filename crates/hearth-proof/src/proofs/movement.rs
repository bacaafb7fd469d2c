//! A probe villager actually moves.

use std::collections::BTreeMap;

use glam::Vec3;
use hearth_ecs::entity::EntityId;
use hearth_sim::movement::xz_distance;
use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

pub struct MovementProof {
    epsilon: f32,
    origins: BTreeMap<EntityId, Vec3>,
    best: f32,
}

impl MovementProof {
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon,
            origins: BTreeMap::new(),
            best: 0.0,
        }
    }
}

impl ProofCriteria for MovementProof {
    fn name(&self) -> &'static str {
        "MovementProof"
    }

    fn loop_id(&self) -> &'static str {
        "movement"
    }

    fn expected_rule(&self) -> &'static str {
        "displacement>epsilon"
    }

    fn failure_exit_code(&self) -> i32 {
        4
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        for (entity, _) in world.move_targets.iter() {
            let Some(pos) = world.position(entity) else {
                continue;
            };
            let origin = *self.origins.entry(entity).or_insert(pos);
            self.best = self.best.max(xz_distance(origin, pos));
        }
        if self.best > self.epsilon {
            Evaluation::pass(
                self.best,
                format!("probes={} epsilon={}", self.origins.len(), self.epsilon),
            )
        } else {
            Evaluation::Pending
        }
    }

    fn timeout_diagnostics(&self, _world: &World) -> (String, f32, String) {
        let reason = if self.origins.is_empty() {
            "no_probe"
        } else {
            "no_displacement"
        };
        (
            reason.to_owned(),
            self.best,
            format!("probes={} epsilon={}", self.origins.len(), self.epsilon),
        )
    }
}
