//! Some construction site gets finished.

use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

#[derive(Default)]
pub struct BuildProof {
    best_progress: f32,
}

impl BuildProof {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProofCriteria for BuildProof {
    fn name(&self) -> &'static str {
        "VillageBuildProof"
    }

    fn loop_id(&self) -> &'static str {
        "village_build"
    }

    fn expected_rule(&self) -> &'static str {
        "site.completed"
    }

    fn failure_exit_code(&self) -> i32 {
        5
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        let mut completed = 0;
        for (_, site) in world.sites.iter() {
            if site.completed {
                completed += 1;
            }
            if site.required_work > 0.0 {
                self.best_progress = self
                    .best_progress
                    .max((site.progress / site.required_work).min(1.0));
            }
        }
        if completed > 0 {
            Evaluation::pass(
                completed as f32,
                format!("sites={} buildings={}", world.sites.len(), world.buildings.len()),
            )
        } else {
            Evaluation::Pending
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let reason = if world.sites.is_empty() {
            "no_site"
        } else {
            "not_completed"
        };
        (
            reason.to_owned(),
            self.best_progress,
            format!("sites={} builders={}", world.sites.len(), world.builders.len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sim::components::{BuildingKind, ConstructionSite};

    #[test]
    fn completed_site_passes() {
        let mut world = World::default();
        let e = world.spawn();
        world.sites.insert(e, ConstructionSite::new(BuildingKind::House, 4.0));
        let mut proof = BuildProof::new();
        assert_eq!(proof.observe(&world), Evaluation::Pending);
        if let Some(site) = world.sites.get_mut(e) {
            site.progress = 2.0;
        }
        proof.observe(&world);
        assert_eq!(proof.timeout_diagnostics(&world).1, 0.5);
        if let Some(site) = world.sites.get_mut(e) {
            site.completed = true;
        }
        assert!(matches!(proof.observe(&world), Evaluation::Pass { .. }));
    }
}
