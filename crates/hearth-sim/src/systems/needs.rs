//! Needs growth and satisfaction.
//!
//! Every tick each need's urgency grows at its configured rate. A villager
//! whose goal maps to a need walks to a building that satisfies it. On the
//! way the need is reduced at `en_route_scale` of the satisfaction rate; on
//! arrival at the full rate, after which it is clamped to the arrival
//! residual so it does not immediately re-trigger.
//!
//! Target buildings are resolved in priority order:
//!
//! 1. the settlement's direct reference for the goal's building kind,
//! 2. the settlement's references for the fallback kinds,
//! 3. the nearest registered building of the goal's kind,
//! 4. a scan over all components that can serve the goal.

use std::collections::BTreeMap;

use glam::Vec3;
use hearth_ecs::command::CommandBuffer;
use hearth_ecs::entity::EntityId;
use tracing::warn;

use crate::clock::TickDelta;
use crate::components::{BuildingKind, GoalKind, JobPhase, JobType, NeedKind, Needs};
use crate::config::{NeedRates, NeedsConfig};
use crate::movement::{arrived, step_toward, xz_distance_sq};
use crate::systems::publish_job;
use crate::tick::System;
use crate::world::World;

/// Building kind that satisfies a goal.
pub fn goal_building(goal: GoalKind) -> Option<BuildingKind> {
    match goal {
        GoalKind::Eat => Some(BuildingKind::Storehouse),
        GoalKind::Sleep => Some(BuildingKind::House),
        GoalKind::Pray => Some(BuildingKind::Temple),
        GoalKind::SeekShelter => Some(BuildingKind::Shelter),
        GoalKind::Socialize => Some(BuildingKind::Tavern),
        _ => None,
    }
}

/// Alternate kinds tried, in order, when the settlement has none of the
/// primary kind.
pub fn fallback_buildings(goal: GoalKind) -> &'static [BuildingKind] {
    match goal {
        GoalKind::Eat => &[BuildingKind::Tavern],
        GoalKind::Sleep => &[BuildingKind::Shelter],
        GoalKind::SeekShelter => &[BuildingKind::House, BuildingKind::Temple],
        GoalKind::Socialize => &[BuildingKind::Temple, BuildingKind::Storehouse],
        _ => &[],
    }
}

fn growth_rate(rates: &NeedRates, kind: NeedKind) -> f32 {
    match kind {
        NeedKind::Hunger => rates.hunger,
        NeedKind::Rest => rates.rest,
        NeedKind::Faith => rates.faith,
        NeedKind::Safety => rates.safety,
        NeedKind::Social => rates.social,
        NeedKind::Work => rates.work,
    }
}

fn usable(world: &World, entity: EntityId) -> bool {
    world.is_alive(entity) && world.transforms.contains(entity)
}

/// Resolve the building a villager at `from` should walk to for `goal`.
pub fn resolve_target(world: &World, goal: GoalKind, from: Vec3) -> Option<EntityId> {
    let kind = goal_building(goal)?;

    if let Some(e) = world.settlement.building(kind).filter(|&e| usable(world, e)) {
        return Some(e);
    }
    for &alt in fallback_buildings(goal) {
        if let Some(e) = world.settlement.building(alt).filter(|&e| usable(world, e)) {
            return Some(e);
        }
    }
    if let Some(e) = world.registry.nearest(kind, from, |e| usable(world, e)) {
        return Some(e);
    }

    // Storehouse-like depots may not carry a `Building` tag.
    let scan: Vec<EntityId> = if kind == BuildingKind::Storehouse {
        world.storehouses.entities().to_vec()
    } else {
        world
            .buildings
            .iter()
            .filter(|(_, b)| b.kind == kind)
            .map(|(e, _)| e)
            .collect()
    };
    scan.into_iter()
        .filter_map(|e| world.position(e).map(|p| (e, xz_distance_sq(from, p))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

pub struct NeedsSystem {
    config: NeedsConfig,
    delta: TickDelta,
    /// Need each villager has started walking for.
    seeking: BTreeMap<EntityId, NeedKind>,
}

impl NeedsSystem {
    pub fn new(config: NeedsConfig) -> Self {
        Self {
            config,
            delta: TickDelta::new(),
            seeking: BTreeMap::new(),
        }
    }

    fn grow(&self, needs: &mut Needs, goal: GoalKind, dt: f32) {
        let rates = &self.config.growth;
        for kind in NeedKind::SEEKABLE {
            let value = needs.get_mut(kind);
            *value = (*value + growth_rate(rates, kind) * dt).min(1.0);
        }
        let work = needs.get_mut(NeedKind::Work);
        if goal == GoalKind::Work {
            *work = (*work - rates.work * dt).max(0.0);
        } else {
            *work = (*work + rates.work * dt).min(1.0);
        }
    }

    fn satisfy_rate(&self, kind: NeedKind) -> f32 {
        self.config
            .satisfy_rate
            .max(growth_rate(&self.config.growth, kind) * self.config.safety_multiplier)
    }

    fn satisfy(&mut self, world: &mut World, entity: EntityId, goal: GoalKind, dt: f32) {
        let Some(kind) = goal.need() else {
            self.seeking.remove(&entity);
            return;
        };
        let Some(urgency) = world.needs.get(entity).map(|n| n.get(kind)) else {
            return;
        };
        let committed = self.seeking.get(&entity) == Some(&kind);
        if urgency < self.config.seek_threshold && !committed {
            return;
        }
        let Some(pos) = world.position(entity) else {
            return;
        };
        let Some(target) = resolve_target(world, goal, pos) else {
            if world.run.first_time(&format!("needs.no_target.{goal:?}")) {
                warn!(%entity, ?goal, "no building can satisfy goal, villager waits");
            }
            return;
        };
        let Some(target_pos) = world.position(target) else {
            return;
        };
        self.seeking.insert(entity, kind);

        let next = step_toward(pos, target_pos, self.config.move_speed * dt);
        if let Some(t) = world.transforms.get_mut(entity) {
            t.position = next;
        }
        let at_target = arrived(next, target_pos, self.config.arrival_threshold);
        let rate = self.satisfy_rate(kind);
        if let Some(needs) = world.needs.get_mut(entity) {
            let value = needs.get_mut(kind);
            if at_target {
                *value = (*value - rate * dt).min(self.config.arrival_residual);
            } else {
                *value -= self.config.en_route_scale * rate * dt;
            }
            *value = value.max(0.0);
        }
        if at_target {
            self.seeking.remove(&entity);
        }

        let job_type = world.jobs.get(entity).map(|j| j.job_type).unwrap_or(JobType::None);
        let phase = if at_target { JobPhase::Work } else { JobPhase::Seek };
        let carry = world.gatherers.get(entity).map_or(0.0, |g| g.carry);
        publish_job(world, entity, job_type, phase, Some(target), carry);
    }
}

impl System for NeedsSystem {
    fn name(&self) -> &str {
        "needs"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let dt = self.delta.step(world.clock());
        if dt <= 0.0 {
            return;
        }
        let villagers = world.needs.entities().to_vec();
        for entity in villagers {
            let goal = world.goals.get(entity).map(|g| g.current).unwrap_or_default();
            if let Some(needs) = world.needs.get_mut(entity) {
                self.grow(needs, goal, dt);
            }
            self.satisfy(world, entity, goal, dt);
        }
        self.seeking.retain(|&e, _| world.is_alive(e));
    }
}
