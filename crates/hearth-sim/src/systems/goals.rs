//! Goal selection.
//!
//! Priority: an active combat threat selects `Fight`. Otherwise a need goal
//! already being pursued is kept until its urgency has been brought down to
//! the arrival residual. Otherwise the most urgent need at or above the seek
//! threshold selects its goal. Failing all that, gatherers `Work`, builders
//! `Build` and everyone else idles.

use hearth_ecs::command::CommandBuffer;
use hearth_ecs::entity::EntityId;
use tracing::debug;

use crate::components::{GoalKind, Needs};
use crate::config::NeedsConfig;
use crate::tick::System;
use crate::world::World;

pub struct GoalSelectionSystem {
    config: NeedsConfig,
}

impl GoalSelectionSystem {
    pub fn new(config: NeedsConfig) -> Self {
        Self { config }
    }

    fn select(&self, world: &World, entity: EntityId, current: GoalKind) -> GoalKind {
        if world
            .threats
            .get(entity)
            .is_some_and(|t| t.urgency > 0.0 && t.current_target.is_some())
        {
            return GoalKind::Fight;
        }

        if let Some(needs) = world.needs.get(entity) {
            if let Some(kind) = current.need() {
                if needs.get(kind) > self.config.arrival_residual {
                    return current;
                }
            }
            if let Some(goal) = urgent_goal(needs, self.config.seek_threshold) {
                return goal;
            }
        }

        if world.gatherers.contains(entity) {
            GoalKind::Work
        } else if world.builders.contains(entity) {
            GoalKind::Build
        } else {
            GoalKind::Idle
        }
    }
}

/// Goal of the most urgent need, if that need has reached `threshold`.
pub fn urgent_goal(needs: &Needs, threshold: f32) -> Option<GoalKind> {
    let (kind, urgency) = needs.most_urgent();
    if urgency >= threshold {
        kind.goal()
    } else {
        None
    }
}

impl System for GoalSelectionSystem {
    fn name(&self) -> &str {
        "goal_selection"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let entities = world.goals.entities().to_vec();
        for entity in entities {
            let Some(current) = world.goals.get(entity).map(|g| g.current) else {
                continue;
            };
            let next = self.select(world, entity, current);
            if next != current {
                debug!(%entity, from = ?current, to = ?next, "goal changed");
                if let Some(goal) = world.goals.get_mut(entity) {
                    goal.current = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{GatherState, Goal, Threat};

    fn villager(world: &mut World, needs: Needs) -> EntityId {
        let e = world.spawn();
        world.needs.insert(e, needs);
        world.goals.insert(e, Goal::default());
        world.gatherers.insert(e, GatherState::seeded(1));
        e
    }

    fn run_once(world: &mut World) {
        let mut system = GoalSelectionSystem::new(NeedsConfig::default());
        system.run(world, &mut CommandBuffer::new());
    }

    #[test]
    fn calm_gatherer_works() {
        let mut world = World::default();
        let e = villager(&mut world, Needs::default());
        run_once(&mut world);
        assert_eq!(world.goals.get(e).unwrap().current, GoalKind::Work);
    }

    #[test]
    fn most_urgent_need_over_threshold_wins() {
        let mut world = World::default();
        let e = villager(
            &mut world,
            Needs {
                hunger: 0.6,
                rest: 0.8,
                ..Default::default()
            },
        );
        run_once(&mut world);
        assert_eq!(world.goals.get(e).unwrap().current, GoalKind::Sleep);
    }

    #[test]
    fn pursued_need_is_kept_until_residual() {
        let mut world = World::default();
        let e = villager(
            &mut world,
            Needs {
                hunger: 0.4,
                ..Default::default()
            },
        );
        world.goals.get_mut(e).unwrap().current = GoalKind::Eat;
        run_once(&mut world);
        assert_eq!(world.goals.get(e).unwrap().current, GoalKind::Eat);

        world.needs.get_mut(e).unwrap().hunger = 0.2;
        run_once(&mut world);
        assert_eq!(world.goals.get(e).unwrap().current, GoalKind::Work);
    }

    #[test]
    fn threat_overrides_needs() {
        let mut world = World::default();
        let e = villager(
            &mut world,
            Needs {
                hunger: 1.0,
                ..Default::default()
            },
        );
        let foe = world.spawn();
        world.threats.insert(
            e,
            Threat {
                current_target: Some(foe),
                urgency: 1.0,
            },
        );
        run_once(&mut world);
        assert_eq!(world.goals.get(e).unwrap().current, GoalKind::Fight);
    }
}
