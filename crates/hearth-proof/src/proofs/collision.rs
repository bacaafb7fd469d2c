//! Probes touch obstacles without passing through them.

use hearth_sim::movement::{xz_distance, PROBE_BODY_RADIUS};
use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

pub struct CollisionProof {
    contact_epsilon: f32,
    penetration_tolerance: f32,
    closest_gap: f32,
}

impl CollisionProof {
    pub fn new(contact_epsilon: f32, penetration_tolerance: f32) -> Self {
        Self {
            contact_epsilon,
            penetration_tolerance,
            closest_gap: f32::INFINITY,
        }
    }
}

impl ProofCriteria for CollisionProof {
    fn name(&self) -> &'static str {
        "CollisionProof"
    }

    fn loop_id(&self) -> &'static str {
        "collision"
    }

    fn expected_rule(&self) -> &'static str {
        "contact&&!penetration"
    }

    fn failure_exit_code(&self) -> i32 {
        4
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        let mut contact = None;
        for (probe, _) in world.move_targets.iter() {
            let Some(pos) = world.position(probe) else {
                continue;
            };
            for (obstacle, shape) in world.obstacles.iter() {
                let Some(center) = world.position(obstacle) else {
                    continue;
                };
                let reach = shape.radius + PROBE_BODY_RADIUS;
                // Signed gap between the surfaces; negative is overlap.
                let gap = xz_distance(pos, center) - reach;
                self.closest_gap = self.closest_gap.min(gap);
                if gap < -self.penetration_tolerance {
                    return Evaluation::fail(
                        "penetration",
                        gap,
                        format!("probe={probe} obstacle={obstacle}"),
                    );
                }
                if gap <= self.contact_epsilon {
                    contact.get_or_insert((probe, obstacle, gap));
                }
            }
        }
        match contact {
            Some((probe, obstacle, gap)) => {
                Evaluation::pass(gap, format!("probe={probe} obstacle={obstacle}"))
            }
            None => Evaluation::Pending,
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let observed = if self.closest_gap.is_finite() {
            self.closest_gap
        } else {
            0.0
        };
        (
            "no_contact".to_owned(),
            observed,
            format!("obstacles={}", world.obstacles.len()),
        )
    }
}
