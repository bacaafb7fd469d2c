//! The duel engages and somebody loses.

use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

#[derive(Default)]
pub struct CombatProof {
    engaged_tick: Option<u32>,
    defeated_tick: Option<u32>,
}

impl CombatProof {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProofCriteria for CombatProof {
    fn name(&self) -> &'static str {
        "CombatProof"
    }

    fn loop_id(&self) -> &'static str {
        "combat"
    }

    fn expected_rule(&self) -> &'static str {
        "engaged&&defeated"
    }

    fn failure_exit_code(&self) -> i32 {
        5
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        let tick = world.clock().tick;
        let Some(duel) = world.duel else {
            return Evaluation::Pending;
        };
        if duel.engaged && self.engaged_tick.is_none() {
            self.engaged_tick = Some(duel.engaged_tick.unwrap_or(tick));
        }
        if duel.defeated.is_some() && self.defeated_tick.is_none() {
            self.defeated_tick = Some(tick);
        }
        match (self.engaged_tick, self.defeated_tick, duel.defeated) {
            (Some(engaged), Some(_), Some(loser)) => {
                let health = world
                    .combat
                    .get(loser)
                    .map_or(0.0, |s| s.current_health);
                Evaluation::pass(
                    health,
                    format!("engaged_tick={engaged} loser={loser}"),
                )
            }
            // Resolved without a loser: one side vanished mid-fight.
            _ if duel.resolved => Evaluation::fail(
                "resolved_without_defeat",
                0.0,
                format!("engaged={}", duel.engaged),
            ),
            _ => Evaluation::Pending,
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let reason = match (world.duel, self.engaged_tick) {
            (None, _) => "no_duel",
            (Some(_), None) => "never_engaged",
            (Some(_), Some(_)) => "no_defeat",
        };
        let min_health = world
            .combat
            .iter()
            .map(|(_, s)| s.current_health)
            .fold(f32::INFINITY, f32::min);
        let observed = if min_health.is_finite() { min_health } else { 0.0 };
        (reason.to_owned(), observed, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sim::resources::CombatDuel;

    fn duel(world: &mut World) -> CombatDuel {
        CombatDuel {
            attacker: world.spawn(),
            defender: world.spawn(),
            engaged: false,
            engaged_tick: None,
            resolved: false,
            defeated: None,
        }
    }

    #[test]
    fn needs_both_engagement_and_defeat() {
        let mut world = World::default();
        let mut d = duel(&mut world);
        let mut proof = CombatProof::new();
        world.duel = Some(d);
        assert_eq!(proof.observe(&world), Evaluation::Pending);

        d.engaged = true;
        d.engaged_tick = Some(3);
        world.duel = Some(d);
        assert_eq!(proof.observe(&world), Evaluation::Pending);

        d.resolved = true;
        d.defeated = Some(d.defender);
        world.duel = Some(d);
        assert!(matches!(proof.observe(&world), Evaluation::Pass { .. }));
    }

    #[test]
    fn resolution_without_loser_fails() {
        let mut world = World::default();
        let mut d = duel(&mut world);
        d.resolved = true;
        world.duel = Some(d);
        let mut proof = CombatProof::new();
        assert!(matches!(
            proof.observe(&world),
            Evaluation::Fail { reason, .. } if reason == "resolved_without_defeat"
        ));
    }
}
