//! Named scenarios and the builder used to populate them.
//!
//! A scenario is selected by path: `scenarios/combat_duel.json`,
//! `combat_duel` and `COMBAT_DUEL.JSON` all select [`ScenarioKind::CombatDuel`].
//! Populating a world is programmatic; there is no file parsing here.

use glam::Vec3;
use hearth_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::{
    AgentJob, BuildAssignment, Building, BuildingKind, CombatStats, ConstructionSite,
    GatherState, Goal, GoalKind, MoveTarget, Needs, Obstacle, ResourceKind, ResourceNode,
    Storehouse, Transform,
};
use crate::config::HarnessConfig;
use crate::nav::{NavGraph, RouteProbe};
use crate::world::World;
use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioKind {
    VillagerLoop,
    MovementProbe,
    CollisionProbe,
    CombatDuel,
    NeedsCycle,
    VillageBuild,
    NavPreference,
    RepetitionLivelock,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 8] = [
        ScenarioKind::VillagerLoop,
        ScenarioKind::MovementProbe,
        ScenarioKind::CollisionProbe,
        ScenarioKind::CombatDuel,
        ScenarioKind::NeedsCycle,
        ScenarioKind::VillageBuild,
        ScenarioKind::NavPreference,
        ScenarioKind::RepetitionLivelock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::VillagerLoop => "villager_loop",
            Self::MovementProbe => "movement_probe",
            Self::CollisionProbe => "collision_probe",
            Self::CombatDuel => "combat_duel",
            Self::NeedsCycle => "needs_cycle",
            Self::VillageBuild => "village_build",
            Self::NavPreference => "nav_preference",
            Self::RepetitionLivelock => "repetition_livelock",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }

    /// Match a scenario path by file name, with or without `.json`.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.trim().to_ascii_lowercase();
        let stem = lower
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(lower.as_str())
            .trim_end_matches(".json");
        Self::ALL.into_iter().find(|k| k.name() == stem)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Spawns the entity archetypes scenarios are made of.
pub struct ScenarioBuilder {
    world: World,
    next_seed: u32,
}

impl ScenarioBuilder {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            world: World::new(config.tick.fixed_dt),
            next_seed: 0x9E37_79B9,
        }
    }

    fn seed(&mut self) -> u32 {
        self.next_seed = self.next_seed.wrapping_mul(0x0101_0101).wrapping_add(0x7F4A_7C15);
        self.next_seed
    }

    /// A storehouse that is also a registered `Storehouse` building.
    pub fn storehouse(&mut self, at: Vec3, stored: f32, capacity: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.storehouses.insert(
            e,
            Storehouse {
                total_stored: stored,
                total_capacity: capacity,
            },
        );
        self.tag_building(e, BuildingKind::Storehouse, at);
        e
    }

    pub fn building(&mut self, kind: BuildingKind, at: Vec3) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.tag_building(e, kind, at);
        e
    }

    fn tag_building(&mut self, e: EntityId, kind: BuildingKind, at: Vec3) {
        self.world.buildings.insert(e, Building { kind });
        self.world.registry.register(e, kind, at);
        if self.world.settlement.building(kind).is_none() {
            self.world.settlement.assign(kind, e);
        }
    }

    pub fn resource(&mut self, kind: ResourceKind, at: Vec3, remaining: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.resource_nodes.insert(
            e,
            ResourceNode {
                kind,
                remaining,
                max_harvesters: 0,
            },
        );
        e
    }

    /// A working villager: gather state, intent record, goal and needs.
    pub fn villager(&mut self, at: Vec3, needs: Needs) -> EntityId {
        let e = self.world.spawn();
        let seed = self.seed();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.gatherers.insert(e, GatherState::seeded(seed));
        self.world.jobs.insert(e, AgentJob::default());
        self.world.goals.insert(
            e,
            Goal {
                current: GoalKind::Work,
            },
        );
        self.world.needs.insert(e, needs);
        e
    }

    pub fn fighter(&mut self, at: Vec3, max_health: f32, attack: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.combat.insert(e, CombatStats::new(max_health, attack));
        self.world.goals.insert(e, Goal::default());
        e
    }

    pub fn site(&mut self, kind: BuildingKind, at: Vec3, required_work: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world
            .sites
            .insert(e, ConstructionSite::new(kind, required_work));
        e
    }

    pub fn builder(&mut self, at: Vec3, site: EntityId) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.builders.insert(e, BuildAssignment { site });
        self.world.jobs.insert(e, AgentJob::default());
        self.world.goals.insert(
            e,
            Goal {
                current: GoalKind::Build,
            },
        );
        e
    }

    pub fn probe(&mut self, at: Vec3, target: Vec3, speed: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.move_targets.insert(e, MoveTarget { target, speed });
        e
    }

    pub fn obstacle(&mut self, at: Vec3, radius: f32) -> EntityId {
        let e = self.world.spawn();
        self.world.transforms.insert(e, Transform { position: at });
        self.world.obstacles.insert(e, Obstacle { radius });
        e
    }

    pub fn nav(&mut self, graph: NavGraph, probe: RouteProbe) {
        self.world.nav = Some(graph);
        self.world.route_probe = Some(probe);
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn finish(mut self, name: &str) -> World {
        let tick = self.world.clock().tick;
        self.world.run.start(name, tick);
        info!(
            scenario = name,
            entities = self.world.entity_count(),
            "scenario populated"
        );
        self.world
    }
}

// ---------------------------------------------------------------------------
// Named scenarios
// ---------------------------------------------------------------------------

fn v(x: f32, z: f32) -> Vec3 {
    Vec3::new(x, 0.0, z)
}

fn calm() -> Needs {
    Needs {
        hunger: 0.1,
        rest: 0.1,
        faith: 0.05,
        safety: 0.0,
        social: 0.1,
        work: 0.3,
    }
}

/// Build the world for the scenario named by `config.scenario_path`.
pub fn build(config: &HarnessConfig) -> Result<(ScenarioKind, World), SimError> {
    let kind = ScenarioKind::from_path(&config.scenario_path).ok_or_else(|| {
        SimError::UnknownScenario {
            path: config.scenario_path.clone(),
        }
    })?;
    Ok((kind, populate(kind, config)))
}

pub fn populate(kind: ScenarioKind, config: &HarnessConfig) -> World {
    let mut b = ScenarioBuilder::new(config);
    match kind {
        ScenarioKind::VillagerLoop => {
            b.storehouse(v(0.0, 0.0), 0.0, 500.0);
            b.resource(ResourceKind::Wood, v(8.0, 3.0), 400.0);
            b.resource(ResourceKind::Stone, v(-6.0, 5.0), 400.0);
            for i in 0..4 {
                b.villager(v(1.0 + i as f32, -1.0), calm());
            }
        }
        ScenarioKind::MovementProbe => {
            b.probe(v(0.0, 0.0), v(10.0, 0.0), 2.0);
        }
        ScenarioKind::CollisionProbe => {
            b.obstacle(v(0.0, 0.0), 1.0);
            b.probe(v(-6.0, 0.0), v(6.0, 0.0), 2.0);
        }
        ScenarioKind::CombatDuel => {
            b.fighter(v(0.0, 0.0), 100.0, 10.0);
            b.fighter(v(20.0, 0.0), 100.0, 14.0);
        }
        ScenarioKind::NeedsCycle => {
            b.storehouse(v(10.0, 0.0), 50.0, 500.0);
            b.building(BuildingKind::House, v(-8.0, 4.0));
            b.building(BuildingKind::Temple, v(0.0, 12.0));
            b.building(BuildingKind::Tavern, v(6.0, -9.0));
            b.resource(ResourceKind::Food, v(4.0, 6.0), 400.0);
            b.villager(
                v(0.0, 0.0),
                Needs {
                    hunger: 0.75,
                    ..calm()
                },
            );
            b.villager(v(2.0, 1.0), calm());
        }
        ScenarioKind::VillageBuild => {
            b.storehouse(v(0.0, 0.0), 0.0, 500.0);
            let site = b.site(BuildingKind::House, v(6.0, 2.0), 10.0);
            b.builder(v(-2.0, 0.0), site);
            b.builder(v(-1.0, 2.0), site);
        }
        ScenarioKind::NavPreference => {
            let mut graph = NavGraph::new();
            let start = graph.add_node(v(0.0, 0.0), 0.0);
            let pass = graph.add_node(v(6.0, 0.0), 1.0);
            let ridge = graph.add_node(v(6.0, 5.0), 0.0);
            let goal = graph.add_node(v(12.0, 0.0), 0.0);
            graph.connect(start, pass);
            graph.connect(pass, goal);
            graph.connect(start, ridge);
            graph.connect(ridge, goal);
            b.nav(graph, RouteProbe::new(start, goal, 4.0).expecting(ridge, pass));
        }
        ScenarioKind::RepetitionLivelock => {
            b.storehouse(v(0.0, 0.0), 0.0, 1_000.0);
            b.resource(ResourceKind::Wood, v(7.0, 0.0), 600.0);
            b.resource(ResourceKind::Stone, v(-5.0, 6.0), 600.0);
            b.resource(ResourceKind::Food, v(3.0, -7.0), 600.0);
            for i in 0..6 {
                b.villager(v(i as f32 - 3.0, 1.0), calm());
            }
        }
    }
    b.finish(kind.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_matching() {
        assert_eq!(
            ScenarioKind::from_path("assets/scenarios/Combat_Duel.json"),
            Some(ScenarioKind::CombatDuel)
        );
        assert_eq!(
            ScenarioKind::from_path("villager_loop"),
            Some(ScenarioKind::VillagerLoop)
        );
        assert_eq!(
            ScenarioKind::from_path("C:\\s\\needs_cycle.JSON"),
            Some(ScenarioKind::NeedsCycle)
        );
        assert_eq!(ScenarioKind::from_path("missing.json"), None);
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        let config = HarnessConfig {
            scenario_path: "nope.json".to_owned(),
            ..Default::default()
        };
        assert!(matches!(build(&config), Err(SimError::UnknownScenario { .. })));
    }

    #[test]
    fn every_scenario_populates() {
        let config = HarnessConfig::default();
        for kind in ScenarioKind::ALL {
            let world = populate(kind, &config);
            assert!(world.entity_count() > 0 || world.nav.is_some(), "{kind:?}");
            assert_eq!(world.run.scenario_name, kind.name());
        }
    }

    #[test]
    fn villagers_get_distinct_seeds() {
        let world = populate(ScenarioKind::VillagerLoop, &HarnessConfig::default());
        let seeds: std::collections::BTreeSet<u32> =
            world.gatherers.iter().map(|(_, g)| g.random_state).collect();
        assert_eq!(seeds.len(), 4);
    }
}
