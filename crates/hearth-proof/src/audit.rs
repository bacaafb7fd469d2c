//! Invariant audit.
//!
//! Violations here mean a logic bug upstream, not a failed proof. Each kind
//! is reported once per run as one structured line:
//!
//! ```text
//! [Audit] VIOLATION kind=negative_stored observed=-2.5 expected=>=0 count=1 samples=[3v0]
//! ```
//!
//! Every occurrence is still counted into the shared [`AuditSummary`], whose
//! severity decides the exit code when no proof asked for one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use hearth_ecs::command::CommandBuffer;
use hearth_ecs::entity::EntityId;
use hearth_sim::components::{GatherPhase, NeedKind};
use hearth_sim::config::AuditConfig;
use hearth_sim::tick::System;
use hearth_sim::world::World;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Slack allowed on capacity comparisons.
const CAPACITY_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Clean,
    Warning,
    Fatal,
}

impl Severity {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Warning => 3,
            Self::Fatal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    NegativeStored,
    NegativeInventory,
    OverCapacity,
    NonFiniteTransform,
    NonFiniteTimer,
    NonFiniteHealth,
    NeedOutOfRange,
    DanglingReference,
    DoubleClaim,
    StuckTicket,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NegativeStored => "negative_stored",
            Self::NegativeInventory => "negative_inventory",
            Self::OverCapacity => "over_capacity",
            Self::NonFiniteTransform => "non_finite_transform",
            Self::NonFiniteTimer => "non_finite_timer",
            Self::NonFiniteHealth => "non_finite_health",
            Self::NeedOutOfRange => "need_out_of_range",
            Self::DanglingReference => "dangling_reference",
            Self::DoubleClaim => "double_claim",
            Self::StuckTicket => "stuck_ticket",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::OverCapacity | Self::NeedOutOfRange | Self::DoubleClaim | Self::StuckTicket => {
                Severity::Warning
            }
            _ => Severity::Fatal,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Self::NegativeStored | Self::NegativeInventory => ">=0",
            Self::OverCapacity => "<=capacity",
            Self::NonFiniteTransform | Self::NonFiniteTimer | Self::NonFiniteHealth => "finite",
            Self::NeedOutOfRange => "[0,1]",
            Self::DanglingReference => "alive",
            Self::DoubleClaim => "<=max_harvesters",
            Self::StuckTicket => "<stuck_ticket_ticks",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offending entity and the value that gave it away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Finding {
    pub kind: ViolationKind,
    pub entity: EntityId,
    pub observed: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Occurrences per kind, summed over every audited tick.
    pub counts: BTreeMap<ViolationKind, u64>,
}

impl AuditSummary {
    pub fn record(&mut self, kind: ViolationKind, count: u64) {
        *self.counts.entry(kind).or_insert(0) += count;
    }

    pub fn severity(&self) -> Severity {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, _)| k.severity())
            .max()
            .unwrap_or(Severity::Clean)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Shared view of the summary for whoever decides the final exit code.
#[derive(Debug, Clone, Default)]
pub struct AuditHandle(Arc<Mutex<AuditSummary>>);

impl AuditHandle {
    pub fn snapshot(&self) -> AuditSummary {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut AuditSummary)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_stores(world: &World, out: &mut Vec<Finding>) {
    for (e, store) in world.storehouses.iter() {
        if !store.total_stored.is_finite() || store.total_stored < 0.0 {
            out.push(Finding {
                kind: ViolationKind::NegativeStored,
                entity: e,
                observed: store.total_stored,
            });
        } else if store.total_capacity > 0.0
            && store.total_stored > store.total_capacity + CAPACITY_EPSILON
        {
            out.push(Finding {
                kind: ViolationKind::OverCapacity,
                entity: e,
                observed: store.total_stored,
            });
        }
    }
    for (e, inventory) in world.inventories.iter() {
        let bad = inventory
            .items
            .iter()
            .find(|i| !i.amount.is_finite() || i.amount < 0.0);
        if let Some(item) = bad {
            out.push(Finding {
                kind: ViolationKind::NegativeInventory,
                entity: e,
                observed: item.amount,
            });
        }
        for cap in &inventory.capacities {
            let amount = inventory.amount(cap.kind);
            if cap.capacity > 0.0 && amount > cap.capacity + CAPACITY_EPSILON {
                out.push(Finding {
                    kind: ViolationKind::OverCapacity,
                    entity: e,
                    observed: amount,
                });
            }
        }
    }
}

fn check_finite(world: &World, out: &mut Vec<Finding>) {
    for (e, t) in world.transforms.iter() {
        if !t.position.is_finite() {
            out.push(Finding {
                kind: ViolationKind::NonFiniteTransform,
                entity: e,
                observed: f32::NAN,
            });
        }
    }
    for (e, g) in world.gatherers.iter() {
        if let Some(bad) = [g.phase_timer, g.carry].into_iter().find(|v| !v.is_finite()) {
            out.push(Finding {
                kind: ViolationKind::NonFiniteTimer,
                entity: e,
                observed: bad,
            });
        }
    }
    for (e, s) in world.combat.iter() {
        if !s.current_health.is_finite() {
            out.push(Finding {
                kind: ViolationKind::NonFiniteHealth,
                entity: e,
                observed: s.current_health,
            });
        }
    }
    for (e, n) in world.sites.iter() {
        if !n.progress.is_finite() {
            out.push(Finding {
                kind: ViolationKind::NonFiniteTimer,
                entity: e,
                observed: n.progress,
            });
        }
    }
}

fn check_needs(world: &World, out: &mut Vec<Finding>) {
    for (e, needs) in world.needs.iter() {
        let kinds = NeedKind::SEEKABLE.into_iter().chain([NeedKind::Work]);
        if let Some(bad) = kinds.map(|k| needs.get(k)).find(|v| !(0.0..=1.0).contains(v)) {
            out.push(Finding {
                kind: ViolationKind::NeedOutOfRange,
                entity: e,
                observed: bad,
            });
        }
    }
}

fn check_references(world: &World, out: &mut Vec<Finding>) {
    let mut dangling = |entity: EntityId, target: Option<EntityId>| {
        if let Some(t) = target {
            if !world.is_alive(t) {
                out.push(Finding {
                    kind: ViolationKind::DanglingReference,
                    entity,
                    observed: t.index() as f32,
                });
            }
        }
    };
    for (e, g) in world.gatherers.iter() {
        dangling(e, g.current_depot);
        dangling(e, g.current_resource_node);
    }
    for (e, job) in world.jobs.iter() {
        dangling(e, job.target);
    }
    for (e, threat) in world.threats.iter() {
        dangling(e, threat.current_target);
    }
    for (e, b) in world.builders.iter() {
        dangling(e, Some(b.site));
    }
}

// ---------------------------------------------------------------------------
// Claim tracking
// ---------------------------------------------------------------------------

/// A villager's hold on a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    node: EntityId,
    phase: GatherPhase,
    since: u32,
}

fn current_claims(world: &World) -> BTreeMap<EntityId, (EntityId, GatherPhase)> {
    world
        .gatherers
        .iter()
        .filter(|(_, g)| matches!(g.phase, GatherPhase::ToResource | GatherPhase::Harvest))
        .filter_map(|(e, g)| g.current_resource_node.map(|node| (e, (node, g.phase))))
        .collect()
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub struct AuditSystem {
    config: AuditConfig,
    tickets: BTreeMap<EntityId, Ticket>,
    summary: AuditHandle,
}

impl AuditSystem {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            tickets: BTreeMap::new(),
            summary: AuditHandle::default(),
        }
    }

    /// Handle onto the running summary.
    pub fn handle(&self) -> AuditHandle {
        self.summary.clone()
    }

    /// Diff this tick's claims against the last tick's tickets.
    fn check_claims(&mut self, world: &World, out: &mut Vec<Finding>) {
        let tick = world.clock().tick;
        let claims = current_claims(world);

        let mut next = BTreeMap::new();
        let mut per_node: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
        for (&villager, &(node, phase)) in &claims {
            let since = match self.tickets.get(&villager) {
                Some(t) if t.node == node && t.phase == phase => t.since,
                _ => tick,
            };
            next.insert(villager, Ticket { node, phase, since });
            per_node.entry(node).or_default().push(villager);

            let held = tick.saturating_sub(since);
            if held >= self.config.stuck_ticket_ticks {
                out.push(Finding {
                    kind: ViolationKind::StuckTicket,
                    entity: villager,
                    observed: held as f32,
                });
            }
        }

        for (node, holders) in per_node {
            let Some(limit) = world.resource_nodes.get(node).map(|n| n.max_harvesters) else {
                continue;
            };
            let fresh = holders.iter().any(|v| {
                self.tickets.get(v).map(|t| t.node) != Some(node)
            });
            if limit > 0 && holders.len() as u32 > limit && fresh {
                out.push(Finding {
                    kind: ViolationKind::DoubleClaim,
                    entity: node,
                    observed: holders.len() as f32,
                });
            }
        }
        self.tickets = next;
    }

    pub fn audit(&mut self, world: &World) -> Vec<Finding> {
        let mut findings = Vec::new();
        check_stores(world, &mut findings);
        check_finite(world, &mut findings);
        check_needs(world, &mut findings);
        check_references(world, &mut findings);
        self.check_claims(world, &mut findings);
        findings
    }

    fn report(&self, world: &mut World, findings: &[Finding]) {
        let mut by_kind: BTreeMap<ViolationKind, Vec<&Finding>> = BTreeMap::new();
        for f in findings {
            by_kind.entry(f.kind).or_default().push(f);
        }
        self.summary.update(|s| {
            for (&kind, list) in &by_kind {
                s.record(kind, list.len() as u64);
            }
        });

        for (kind, list) in by_kind {
            if !world.run.first_time(&format!("audit:{kind}")) {
                continue;
            }
            let samples = list
                .iter()
                .take(self.config.sample_limit)
                .map(|f| f.entity.to_string())
                .collect::<Vec<_>>()
                .join(",");
            warn!(
                kind = kind.as_str(),
                count = list.len(),
                severity = ?kind.severity(),
                "invariant violation"
            );
            world.proof_log.push(format!(
                "[Audit] VIOLATION kind={kind} observed={} expected={} count={} samples=[{samples}] tick={}",
                list[0].observed,
                kind.expected(),
                list.len(),
                world.clock().tick,
            ));
        }
    }
}

impl System for AuditSystem {
    fn name(&self) -> &str {
        "audit"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let findings = self.audit(world);
        if !findings.is_empty() {
            self.report(world, &findings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sim::components::{GatherState, ResourceKind, ResourceNode, Storehouse, Transform};

    fn run(system: &mut AuditSystem, world: &mut World) {
        system.run(world, &mut CommandBuffer::new());
        world.clock_mut().tick += 1;
    }

    #[test]
    fn clean_world_is_clean() {
        let mut world = World::default();
        let e = world.spawn();
        world.transforms.insert(e, Transform::at(1.0, 0.0, 1.0));
        let mut audit = AuditSystem::new(AuditConfig::default());
        run(&mut audit, &mut world);
        assert_eq!(audit.handle().snapshot().severity(), Severity::Clean);
        assert!(world.proof_log.lines().is_empty());
    }

    #[test]
    fn each_kind_is_reported_once_but_counted_every_tick() {
        let mut world = World::default();
        let depot = world.spawn();
        world.storehouses.insert(
            depot,
            Storehouse {
                total_stored: -2.5,
                total_capacity: 10.0,
            },
        );
        let mut audit = AuditSystem::new(AuditConfig::default());
        let handle = audit.handle();
        for _ in 0..3 {
            run(&mut audit, &mut world);
        }
        assert_eq!(world.proof_log.count_prefixed("[Audit] VIOLATION kind=negative_stored"), 1);
        let summary = handle.snapshot();
        assert_eq!(summary.counts.get(&ViolationKind::NegativeStored), Some(&3));
        assert_eq!(summary.severity(), Severity::Fatal);
        assert_eq!(summary.severity().exit_code(), 2);
    }

    #[test]
    fn dangling_depot_reference_is_fatal() {
        let mut world = World::default();
        let depot = world.spawn();
        let villager = world.spawn();
        let mut state = GatherState::seeded(1);
        state.current_depot = Some(depot);
        world.gatherers.insert(villager, state);
        world.despawn(depot).unwrap();
        let mut audit = AuditSystem::new(AuditConfig::default());
        let findings = audit.audit(&world);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ViolationKind::DanglingReference);
        assert_eq!(findings[0].entity, villager);
    }

    fn claimant(world: &mut World, node: EntityId) -> EntityId {
        let v = world.spawn();
        let mut state = GatherState::seeded(1);
        state.phase = GatherPhase::Harvest;
        state.current_resource_node = Some(node);
        world.gatherers.insert(v, state);
        v
    }

    #[test]
    fn double_claim_is_a_warning() {
        let mut world = World::default();
        let node = world.spawn();
        world.resource_nodes.insert(
            node,
            ResourceNode {
                kind: ResourceKind::Wood,
                remaining: 10.0,
                max_harvesters: 1,
            },
        );
        claimant(&mut world, node);
        claimant(&mut world, node);
        let mut audit = AuditSystem::new(AuditConfig::default());
        run(&mut audit, &mut world);
        let summary = audit.handle().snapshot();
        assert_eq!(summary.counts.get(&ViolationKind::DoubleClaim), Some(&1));
        assert_eq!(summary.severity().exit_code(), 3);

        // Same holders next tick: nothing new was claimed.
        run(&mut audit, &mut world);
        assert_eq!(audit.handle().snapshot().counts.get(&ViolationKind::DoubleClaim), Some(&1));
    }

    #[test]
    fn long_held_ticket_is_stuck() {
        let mut world = World::default();
        let node = world.spawn();
        world.resource_nodes.insert(
            node,
            ResourceNode {
                kind: ResourceKind::Stone,
                remaining: 10.0,
                max_harvesters: 0,
            },
        );
        claimant(&mut world, node);
        let mut audit = AuditSystem::new(AuditConfig {
            stuck_ticket_ticks: 5,
            ..AuditConfig::default()
        });
        for _ in 0..5 {
            run(&mut audit, &mut world);
        }
        assert!(audit.handle().snapshot().counts.get(&ViolationKind::StuckTicket).is_none());
        run(&mut audit, &mut world);
        assert_eq!(world.proof_log.count_prefixed("[Audit] VIOLATION kind=stuck_ticket"), 1);
    }
}
