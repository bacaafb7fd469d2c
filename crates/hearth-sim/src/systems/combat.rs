//! Two-combatant duel: detect, engage, resolve.
//!
//! The first two entities with [`CombatStats`] form the duel. Until they are
//! in range the defender is pulled toward the attacker so the gap closes
//! within `force_engage_ticks`. Once engaged both sides take damage every
//! tick; the minimum dps is derived from the baseline health and
//! `resolve_seconds`, which bounds the fight's length whatever the attack
//! stats are.

use hearth_ecs::command::{CausalReason, CommandBuffer};
use hearth_ecs::entity::EntityId;
use hearth_ecs::EcsError;
use tracing::{debug, info};

use crate::clock::TickDelta;
use crate::components::{CombatStats, Threat};
use crate::config::CombatConfig;
use crate::movement::{step_toward, xz_distance};
use crate::resources::CombatDuel;
use crate::tick::System;
use crate::world::World;

const RANGE_EPSILON: f32 = 1e-4;

pub struct CombatSystem {
    config: CombatConfig,
    delta: TickDelta,
    started_tick: Option<u32>,
}

impl CombatSystem {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            delta: TickDelta::new(),
            started_tick: None,
        }
    }

    fn min_dps(&self, a: &CombatStats, b: &CombatStats) -> f32 {
        let baseline = self
            .config
            .baseline_health
            .unwrap_or_else(|| a.max_health.max(b.max_health));
        if self.config.resolve_seconds > 0.0 {
            baseline / self.config.resolve_seconds
        } else {
            0.0
        }
    }

    fn damage(&self, attacker: &CombatStats, min_dps: f32, dt: f32) -> f32 {
        (attacker.attack_damage * self.config.damage_scale).max(min_dps) * dt
    }

    fn start_duel(&mut self, world: &World, cmds: &mut CommandBuffer<World>) -> Option<CombatDuel> {
        let mut fighters = world.combat.entities().iter().copied();
        let attacker = fighters.next()?;
        let defender = fighters.next()?;
        self.started_tick = Some(world.clock().tick);
        info!(%attacker, %defender, tick = world.clock().tick, "duel selected");

        for (me, foe) in [(attacker, defender), (defender, attacker)] {
            cmds.push(
                Some(me),
                CausalReason::GameRule("duel_threat".to_owned()),
                move |w: &mut World| {
                    if !w.is_alive(me) {
                        return Err(EcsError::StaleEntity { entity: me });
                    }
                    w.threats.insert(
                        me,
                        Threat {
                            current_target: Some(foe),
                            urgency: 1.0,
                        },
                    );
                    Ok(())
                },
            );
        }
        Some(CombatDuel {
            attacker,
            defender,
            engaged: false,
            engaged_tick: None,
            resolved: false,
            defeated: None,
        })
    }

    /// Pull the defender toward the attacker. Returns whether they are in range.
    fn close_gap(&self, world: &mut World, duel: &CombatDuel) -> bool {
        let (Some(a), Some(d)) = (world.position(duel.attacker), world.position(duel.defender))
        else {
            return false;
        };
        let range = self.config.engage_distance;
        let dist = xz_distance(a, d);
        if dist <= range + RANGE_EPSILON {
            return true;
        }
        let elapsed = self
            .started_tick
            .map_or(0, |s| world.clock().tick.saturating_sub(s));
        let ticks_left = self.config.force_engage_ticks.saturating_sub(elapsed).max(1);
        let step = (dist - range) / ticks_left as f32;
        let moved = step_toward(d, a, step);
        if let Some(t) = world.transforms.get_mut(duel.defender) {
            t.position = moved;
        }
        xz_distance(a, moved) <= range + RANGE_EPSILON
    }

    fn clear_threats(world: &mut World, duel: &CombatDuel) {
        for e in [duel.attacker, duel.defender] {
            if let Some(threat) = world.threats.get_mut(e) {
                threat.current_target = None;
                threat.urgency = 0.0;
            }
        }
    }
}

/// Which side lost, preferring the one with lower health on a double knockout.
fn loser(duel: &CombatDuel, a: &CombatStats, d: &CombatStats) -> Option<EntityId> {
    match (a.is_defeated(), d.is_defeated()) {
        (false, false) => None,
        (true, false) => Some(duel.attacker),
        (false, true) => Some(duel.defender),
        (true, true) if a.current_health < d.current_health => Some(duel.attacker),
        (true, true) => Some(duel.defender),
    }
}

impl System for CombatSystem {
    fn name(&self) -> &str {
        "combat"
    }

    fn run(&mut self, world: &mut World, cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let dt = self.delta.step(world.clock());

        if world.duel.is_none() {
            world.duel = self.start_duel(world, cmds);
        }
        let Some(mut duel) = world.duel else {
            return;
        };
        if duel.resolved || dt <= 0.0 {
            return;
        }
        if !world.is_alive(duel.attacker) || !world.is_alive(duel.defender) {
            duel.resolved = true;
            Self::clear_threats(world, &duel);
            world.duel = Some(duel);
            return;
        }

        if !duel.engaged && self.close_gap(world, &duel) {
            duel.engaged = true;
            duel.engaged_tick = Some(world.clock().tick);
            info!(tick = world.clock().tick, "duel engaged");
        }

        if duel.engaged {
            let (Some(a), Some(d)) = (
                world.combat.get(duel.attacker).copied(),
                world.combat.get(duel.defender).copied(),
            ) else {
                world.duel = Some(duel);
                return;
            };
            let min_dps = self.min_dps(&a, &d);
            let to_defender = self.damage(&a, min_dps, dt);
            let to_attacker = self.damage(&d, min_dps, dt);
            let mut a_next = a;
            let mut d_next = d;
            a_next.current_health = (a.current_health - to_attacker).max(0.0);
            d_next.current_health = (d.current_health - to_defender).max(0.0);
            if let Some(s) = world.combat.get_mut(duel.attacker) {
                *s = a_next;
            }
            if let Some(s) = world.combat.get_mut(duel.defender) {
                *s = d_next;
            }
            debug!(
                attacker_hp = a_next.current_health,
                defender_hp = d_next.current_health,
                "duel exchange"
            );

            if let Some(defeated) = loser(&duel, &a_next, &d_next) {
                duel.resolved = true;
                duel.defeated = Some(defeated);
                Self::clear_threats(world, &duel);
                info!(%defeated, tick = world.clock().tick, "duel resolved");
            }
        }
        world.duel = Some(duel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Transform;

    fn fighter(world: &mut World, x: f32, hp: f32, attack: f32) -> EntityId {
        let e = world.spawn();
        world.transforms.insert(e, Transform::at(x, 0.0, 0.0));
        world.combat.insert(e, CombatStats::new(hp, attack));
        e
    }

    fn run_ticks(world: &mut World, system: &mut CombatSystem, ticks: u32) {
        let mut cmds = CommandBuffer::new();
        for _ in 0..ticks {
            system.run(world, &mut cmds);
            cmds.apply(world);
            world.clock_mut().tick += 1;
        }
    }

    #[test]
    fn distant_duel_engages_within_force_window() {
        let mut world = World::new(1.0 / 60.0);
        fighter(&mut world, 0.0, 100.0, 10.0);
        fighter(&mut world, 40.0, 100.0, 10.0);
        let config = CombatConfig::default();
        let window = config.force_engage_ticks;
        let mut system = CombatSystem::new(config);
        run_ticks(&mut world, &mut system, window + 1);
        let duel = world.duel.unwrap();
        assert!(duel.engaged);
        assert!(duel.engaged_tick.unwrap() <= window);
    }

    #[test]
    fn weak_attacks_still_resolve_in_bounded_time() {
        let mut world = World::new(1.0 / 60.0);
        let a = fighter(&mut world, 0.0, 100.0, 0.0);
        let d = fighter(&mut world, 1.0, 100.0, 0.0);
        let mut system = CombatSystem::new(CombatConfig::default());
        // 8 seconds at 60 Hz plus slack.
        run_ticks(&mut world, &mut system, 8 * 60 + 5);
        let duel = world.duel.unwrap();
        assert!(duel.resolved);
        assert!(duel.defeated.is_some());
        for e in [a, d] {
            let threat = world.threats.get(e).unwrap();
            assert_eq!(threat.current_target, None);
            assert_eq!(threat.urgency, 0.0);
            assert!(world.combat.get(e).unwrap().current_health >= 0.0);
        }
    }

    #[test]
    fn stronger_side_wins() {
        let mut world = World::new(1.0 / 60.0);
        fighter(&mut world, 0.0, 100.0, 60.0);
        let weak = fighter(&mut world, 1.0, 100.0, 5.0);
        let mut system = CombatSystem::new(CombatConfig::default());
        run_ticks(&mut world, &mut system, 600);
        assert_eq!(world.duel.unwrap().defeated, Some(weak));
    }

    #[test]
    fn single_combatant_never_starts_a_duel() {
        let mut world = World::new(1.0 / 60.0);
        fighter(&mut world, 0.0, 100.0, 10.0);
        let mut system = CombatSystem::new(CombatConfig::default());
        run_ticks(&mut world, &mut system, 10);
        assert!(world.duel.is_none());
    }
}
