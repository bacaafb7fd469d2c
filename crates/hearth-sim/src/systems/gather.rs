//! Gather/deliver logistics loop.
//!
//! `Idle → ToResource → Harvest → ToDepot → Resting → Idle`.
//!
//! - `Idle` resolves a depot and a resource node. Without a depot the
//!   villager stalls in `Idle` with its timer at zero and retries next tick.
//! - `ToResource` and `ToDepot` end on arrival or when the phase timeout
//!   elapses. The timeout guarantees progress when navigation stalls.
//! - `Harvest` lasts a fixed duration and re-resolves the depot at the end.
//! - Arriving at the depot deposits the carry, clamped to free capacity.
//! - `Resting` lasts a duration drawn from the villager's own PRNG.
//!
//! Only villagers whose goal is `Work` (or who have no goal at all) are
//! advanced; a villager pursuing a need is frozen here.

use std::collections::BTreeMap;

use glam::Vec3;
use hearth_ecs::command::{CausalReason, CommandBuffer};
use hearth_ecs::entity::EntityId;
use hearth_ecs::EcsError;
use tracing::{debug, warn};

use crate::clock::TickDelta;
use crate::components::{
    CapacityEntry, GatherPhase, GatherState, GoalKind, Inventory, InventoryItem, JobPhase,
    JobType, ResourceKind,
};
use crate::config::GatherConfig;
use crate::movement::{arrived, step_toward, xz_distance_sq};
use crate::rng;
use crate::systems::publish_job;
use crate::tick::System;
use crate::world::World;

pub struct GatherSystem {
    config: GatherConfig,
    delta: TickDelta,
}

/// What the deposit step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposit {
    pub accepted: f32,
    pub refused: f32,
}

impl GatherSystem {
    pub fn new(config: GatherConfig) -> Self {
        Self {
            config,
            delta: TickDelta::new(),
        }
    }

    fn capacity_of(&self, total_capacity: f32) -> f32 {
        if total_capacity > 0.0 {
            total_capacity
        } else {
            self.config.default_capacity
        }
    }

    /// Move `amount` of `kind` into `depot`, clamped to its free capacity.
    ///
    /// A depot without an [`Inventory`] gets one through `cmds`, seeded with
    /// the bootstrap amount.
    pub fn deposit(
        &self,
        world: &mut World,
        cmds: &mut CommandBuffer<World>,
        depot: EntityId,
        kind: ResourceKind,
        amount: f32,
    ) -> Deposit {
        let Some(store) = world.storehouses.get_mut(depot) else {
            return Deposit {
                accepted: 0.0,
                refused: amount,
            };
        };
        let capacity = self.capacity_of(store.total_capacity);
        let space = (capacity - store.total_stored).max(0.0);
        let accepted = amount.clamp(0.0, space);
        store.total_stored += accepted;

        if let Some(inventory) = world.inventories.get_mut(depot) {
            inventory.add(kind, accepted);
        } else {
            let bootstrap = self.config.inventory_bootstrap;
            cmds.push(
                Some(depot),
                CausalReason::GameRule("inventory_bootstrap".to_owned()),
                move |w: &mut World| {
                    if !w.is_alive(depot) {
                        return Err(EcsError::StaleEntity { entity: depot });
                    }
                    match w.inventories.get_mut(depot) {
                        Some(inventory) => inventory.add(kind, accepted),
                        None => {
                            w.inventories.insert(
                                depot,
                                Inventory {
                                    items: vec![InventoryItem {
                                        kind,
                                        amount: bootstrap + accepted,
                                    }],
                                    capacities: vec![CapacityEntry { kind, capacity }],
                                },
                            );
                        }
                    }
                    Ok(())
                },
            );
        }

        Deposit {
            accepted,
            refused: amount - accepted,
        }
    }
}

fn nearest_depot(world: &World, from: Vec3) -> Option<EntityId> {
    world
        .storehouses
        .entities()
        .iter()
        .filter_map(|&e| world.position(e).map(|p| (e, xz_distance_sq(from, p))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

fn resolve_depot(world: &World, current: Option<EntityId>, from: Vec3) -> Option<EntityId> {
    current
        .filter(|&d| world.storehouses.contains(d) && world.transforms.contains(d))
        .or_else(|| nearest_depot(world, from))
}

fn node_available(world: &World, node: EntityId, claims: &BTreeMap<EntityId, u32>) -> bool {
    world.resource_nodes.get(node).is_some_and(|n| {
        n.remaining > 0.0
            && (n.max_harvesters == 0 || claims.get(&node).copied().unwrap_or(0) < n.max_harvesters)
    })
}

fn resolve_node(
    world: &World,
    current: Option<EntityId>,
    from: Vec3,
    claims: &BTreeMap<EntityId, u32>,
) -> Option<EntityId> {
    // Idle villagers hold no claim, so the previous node is checked against
    // the same limit as any other.
    if let Some(node) = current.filter(|&n| node_available(world, n, claims)) {
        return Some(node);
    }
    world
        .resource_nodes
        .entities()
        .iter()
        .filter(|&&e| node_available(world, e, claims))
        .filter_map(|&e| world.position(e).map(|p| (e, xz_distance_sq(from, p))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

/// Villagers currently holding a claim on each node.
fn claim_counts(world: &World) -> BTreeMap<EntityId, u32> {
    let mut claims = BTreeMap::new();
    for (_, state) in world.gatherers.iter() {
        if matches!(state.phase, GatherPhase::ToResource | GatherPhase::Harvest) {
            if let Some(node) = state.current_resource_node {
                *claims.entry(node).or_insert(0) += 1;
            }
        }
    }
    claims
}

impl System for GatherSystem {
    fn name(&self) -> &str {
        "gather"
    }

    fn run(&mut self, world: &mut World, cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let dt = self.delta.step(world.clock());
        if dt <= 0.0 {
            return;
        }

        let mut claims = claim_counts(world);
        let villagers = world.gatherers.entities().to_vec();
        for entity in villagers {
            if world
                .goals
                .get(entity)
                .is_some_and(|g| g.current != GoalKind::Work)
            {
                continue;
            }
            let (Some(mut state), Some(pos)) =
                (world.gatherers.get(entity).cloned(), world.position(entity))
            else {
                continue;
            };
            state.random_state = rng::advance(state.random_state);
            let from_phase = state.phase;
            let new_pos = self.step_villager(world, cmds, entity, &mut state, pos, dt, &mut claims);

            if state.phase != from_phase {
                debug!(%entity, from = from_phase.name(), to = state.phase.name(), "gather phase");
            }
            if let Some(t) = world.transforms.get_mut(entity) {
                t.position = new_pos;
            }
            let (phase, target) = match state.phase {
                GatherPhase::Idle => (JobPhase::Idle, None),
                GatherPhase::ToResource => (JobPhase::Seek, state.current_resource_node),
                GatherPhase::Harvest => (JobPhase::Harvest, state.current_resource_node),
                GatherPhase::ToDepot => (JobPhase::Deliver, state.current_depot),
                GatherPhase::Resting => (JobPhase::Rest, None),
            };
            publish_job(world, entity, JobType::Gather, phase, target, state.carry);
            if let Some(slot) = world.gatherers.get_mut(entity) {
                *slot = state;
            }
        }
    }
}

impl GatherSystem {
    /// Advance one villager by one tick. Returns its new position.
    #[allow(clippy::too_many_arguments)]
    fn step_villager(
        &self,
        world: &mut World,
        cmds: &mut CommandBuffer<World>,
        entity: EntityId,
        state: &mut GatherState,
        pos: Vec3,
        dt: f32,
        claims: &mut BTreeMap<EntityId, u32>,
    ) -> Vec3 {
        let cfg = &self.config;
        match state.phase {
            GatherPhase::Idle => {
                let depot = resolve_depot(world, state.current_depot, pos);
                let node = resolve_node(world, state.current_resource_node, pos, claims);
                match (depot, node) {
                    (Some(depot), Some(node)) => {
                        state.current_depot = Some(depot);
                        *claims.entry(node).or_insert(0) += 1;
                        state.current_resource_node = Some(node);
                        state.phase = GatherPhase::ToResource;
                        state.phase_timer = 0.0;
                    }
                    (None, _) => {
                        state.phase_timer = 0.0;
                        if world.run.first_time("gather.no_depot") {
                            warn!(%entity, "no depot resolvable, villager stalls in idle");
                        }
                    }
                    (Some(_), None) => {
                        state.phase_timer = 0.0;
                        if world.run.first_time("gather.no_resource") {
                            warn!(%entity, "no resource node available, villager stalls in idle");
                        }
                    }
                }
                pos
            }

            GatherPhase::ToResource => {
                let Some(target) = state.current_resource_node.and_then(|n| world.position(n))
                else {
                    state.phase = GatherPhase::Idle;
                    state.phase_timer = 0.0;
                    state.current_resource_node = None;
                    return pos;
                };
                state.phase_timer += dt;
                let next = step_toward(pos, target, cfg.move_speed * dt);
                if arrived(next, target, cfg.arrival_threshold)
                    || state.phase_timer >= cfg.to_resource_timeout
                {
                    state.phase = GatherPhase::Harvest;
                    state.phase_timer = 0.0;
                }
                next
            }

            GatherPhase::Harvest => {
                state.phase_timer += dt;
                if state.phase_timer < cfg.harvest_seconds {
                    return pos;
                }
                let taken = state
                    .current_resource_node
                    .and_then(|n| world.resource_nodes.get_mut(n))
                    .map(|node| {
                        let take = cfg.harvest_amount.min(node.remaining).max(0.0);
                        node.remaining -= take;
                        (node.kind, take)
                    });
                state.phase_timer = 0.0;
                match taken {
                    Some((kind, take)) if take > 0.0 => {
                        state.carry += take;
                        state.carry_kind = Some(kind);
                        state.current_depot = resolve_depot(world, state.current_depot, pos);
                        state.phase = GatherPhase::ToDepot;
                    }
                    _ => {
                        state.current_resource_node = None;
                        state.phase = GatherPhase::Idle;
                    }
                }
                pos
            }

            GatherPhase::ToDepot => {
                let depot = resolve_depot(world, state.current_depot, pos);
                state.current_depot = depot;
                let Some((depot, target)) = depot.and_then(|d| world.position(d).map(|p| (d, p)))
                else {
                    state.phase_timer = 0.0;
                    return pos;
                };
                state.phase_timer += dt;
                let next = step_toward(pos, target, cfg.move_speed * dt);
                if arrived(next, target, cfg.arrival_threshold)
                    || state.phase_timer >= cfg.to_depot_timeout
                {
                    let kind = state.carry_kind.unwrap_or(ResourceKind::Food);
                    let deposit = self.deposit(world, cmds, depot, kind, state.carry);
                    if deposit.refused > 0.0 && world.run.first_time("gather.depot_full") {
                        warn!(%entity, %depot, refused = deposit.refused, "depot full, carry kept");
                    }
                    state.carry = deposit.refused;
                    if state.carry <= 0.0 {
                        state.carry_kind = None;
                    }
                    let (next_state, rest) =
                        rng::uniform(state.random_state, cfg.rest_min, cfg.rest_max);
                    state.random_state = next_state;
                    state.phase = GatherPhase::Resting;
                    state.phase_timer = rest;
                }
                next
            }

            GatherPhase::Resting => {
                state.phase_timer -= dt;
                if state.phase_timer <= 0.0 {
                    state.phase = GatherPhase::Idle;
                    state.phase_timer = 0.0;
                }
                pos
            }
        }
    }
}
