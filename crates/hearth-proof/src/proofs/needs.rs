//! A pressing need is noticed, pursued and relieved.
//!
//! Per villager: some seekable need rises above the high-water mark, the
//! villager's goal switches to the matching goal, and the need later falls
//! below the low-water mark. The first villager to complete the cycle
//! passes the proof.

use std::collections::BTreeMap;

use hearth_ecs::entity::EntityId;
use hearth_sim::components::{NeedKind, Needs};
use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Urgent,
    Pursued,
}

#[derive(Debug, Clone, Copy)]
struct Cycle {
    need: NeedKind,
    stage: Stage,
    peak: f32,
}

pub struct NeedsProof {
    high_water: f32,
    low_water: f32,
    cycles: BTreeMap<EntityId, Cycle>,
}

impl NeedsProof {
    pub fn new(high_water: f32, low_water: f32) -> Self {
        Self {
            high_water,
            low_water,
            cycles: BTreeMap::new(),
        }
    }

    fn urgent(&self, needs: &Needs) -> Option<(NeedKind, f32)> {
        let (need, value) = needs.most_urgent();
        (value > self.high_water).then_some((need, value))
    }
}

impl ProofCriteria for NeedsProof {
    fn name(&self) -> &'static str {
        "NeedsProof"
    }

    fn loop_id(&self) -> &'static str {
        "needs"
    }

    fn expected_rule(&self) -> &'static str {
        "urgency>high_water->goal->urgency<low_water"
    }

    fn failure_exit_code(&self) -> i32 {
        4
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        for (entity, needs) in world.needs.iter() {
            let goal = world.goals.get(entity).map(|g| g.current);
            match self.cycles.get(&entity).copied() {
                None => {
                    if let Some((need, peak)) = self.urgent(needs) {
                        self.cycles.insert(
                            entity,
                            Cycle {
                                need,
                                stage: Stage::Urgent,
                                peak,
                            },
                        );
                    }
                }
                Some(mut cycle) => {
                    let value = needs.get(cycle.need);
                    cycle.peak = cycle.peak.max(value);
                    if cycle.stage == Stage::Urgent && goal.is_some() && goal == cycle.need.goal() {
                        cycle.stage = Stage::Pursued;
                    }
                    if cycle.stage == Stage::Pursued && value < self.low_water {
                        return Evaluation::pass(
                            value,
                            format!(
                                "need={:?} peak={:.3} villager={entity}",
                                cycle.need, cycle.peak
                            ),
                        );
                    }
                    self.cycles.insert(entity, cycle);
                }
            }
        }
        Evaluation::Pending
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let pursued = self
            .cycles
            .values()
            .filter(|c| c.stage == Stage::Pursued)
            .count();
        let reason = if self.cycles.is_empty() {
            "never_urgent"
        } else if pursued == 0 {
            "goal_not_selected"
        } else {
            "not_relieved"
        };
        let peak = self.cycles.values().map(|c| c.peak).fold(0.0, f32::max);
        (
            reason.to_owned(),
            peak,
            format!(
                "villagers={} urgent={} pursued={pursued}",
                world.needs.len(),
                self.cycles.len()
            ),
        )
    }
}
