//! The simulation world: entity allocator, one sparse set per component, and
//! the world-level singletons.
//!
//! Component sets are public fields. Systems borrow disjoint sets directly,
//! which is what lets one system write `gatherers` while reading
//! `transforms` and `storehouses` without any runtime borrow tracking.

use hearth_ecs::entity::{EntityAllocator, EntityId};
use hearth_ecs::sparse::SparseSet;
use hearth_ecs::EcsError;
use tracing::debug;

use crate::clock::TickClock;
use crate::components::{
    AgentJob, BuildAssignment, Building, CombatStats, ConstructionSite, GatherState, Goal,
    Inventory, MoveTarget, Needs, Obstacle, ResourceNode, Storehouse, Threat, Transform,
};
use crate::nav::{NavGraph, RouteProbe};
use crate::resources::{
    BuildingRegistry, CombatDuel, ExitRequest, ProofLog, RunContext, Settlement, TelemetryBuffer,
};

pub struct World {
    entities: EntityAllocator,
    clock: TickClock,

    // -- components ---------------------------------------------------------
    pub transforms: SparseSet<Transform>,
    pub gatherers: SparseSet<GatherState>,
    pub jobs: SparseSet<AgentJob>,
    pub needs: SparseSet<Needs>,
    pub goals: SparseSet<Goal>,
    pub combat: SparseSet<CombatStats>,
    pub threats: SparseSet<Threat>,
    pub storehouses: SparseSet<Storehouse>,
    pub inventories: SparseSet<Inventory>,
    pub resource_nodes: SparseSet<ResourceNode>,
    pub buildings: SparseSet<Building>,
    pub sites: SparseSet<ConstructionSite>,
    pub builders: SparseSet<BuildAssignment>,
    pub obstacles: SparseSet<Obstacle>,
    pub move_targets: SparseSet<MoveTarget>,

    // -- singletons ---------------------------------------------------------
    pub settlement: Settlement,
    pub registry: BuildingRegistry,
    pub nav: Option<NavGraph>,
    pub route_probe: Option<RouteProbe>,
    pub duel: Option<CombatDuel>,
    pub telemetry: TelemetryBuffer,
    pub proof_log: ProofLog,
    pub exit_request: Option<ExitRequest>,
    /// Armed proofs that will request an exit but have no verdict yet. A
    /// zero exit code waits until this drops to zero.
    pub pending_proofs: u32,
    pub run: RunContext,
}

impl World {
    pub fn new(fixed_delta_time: f32) -> Self {
        Self {
            entities: EntityAllocator::new(),
            clock: TickClock::new(fixed_delta_time),
            transforms: SparseSet::new(),
            gatherers: SparseSet::new(),
            jobs: SparseSet::new(),
            needs: SparseSet::new(),
            goals: SparseSet::new(),
            combat: SparseSet::new(),
            threats: SparseSet::new(),
            storehouses: SparseSet::new(),
            inventories: SparseSet::new(),
            resource_nodes: SparseSet::new(),
            buildings: SparseSet::new(),
            sites: SparseSet::new(),
            builders: SparseSet::new(),
            obstacles: SparseSet::new(),
            move_targets: SparseSet::new(),
            settlement: Settlement::default(),
            registry: BuildingRegistry::default(),
            nav: None,
            route_probe: None,
            duel: None,
            telemetry: TelemetryBuffer::default(),
            proof_log: ProofLog::default(),
            exit_request: None,
            pending_proofs: 0,
            run: RunContext::default(),
        }
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Host-side clock control (pause, playback). Systems must not call this.
    pub fn clock_mut(&mut self) -> &mut TickClock {
        &mut self.clock
    }

    pub fn spawn(&mut self) -> EntityId {
        self.entities.allocate()
    }

    /// Free the handle and drop every component it holds.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.entities.free(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        self.transforms.remove(entity);
        self.gatherers.remove(entity);
        self.jobs.remove(entity);
        self.needs.remove(entity);
        self.goals.remove(entity);
        self.combat.remove(entity);
        self.threats.remove(entity);
        self.storehouses.remove(entity);
        self.inventories.remove(entity);
        self.resource_nodes.remove(entity);
        self.buildings.remove(entity);
        self.sites.remove(entity);
        self.builders.remove(entity);
        self.obstacles.remove(entity);
        self.move_targets.remove(entity);
        debug!(%entity, "despawned");
        Ok(())
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    pub fn iter_alive(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter_alive()
    }

    /// Sum of `total_stored` over every storehouse.
    pub fn total_stored(&self) -> f32 {
        self.storehouses.iter().map(|(_, s)| s.total_stored).sum()
    }

    pub fn position(&self, entity: EntityId) -> Option<glam::Vec3> {
        self.transforms.get(entity).map(|t| t.position)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(TickClock::default().fixed_delta_time)
    }
}
