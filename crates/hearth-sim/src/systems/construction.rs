//! Construction: builders walk to their assigned site and put work into it.
//!
//! A site completes once its progress reaches `required_work`. Completion
//! turns the site into a [`Building`] of the site's kind, registers it and,
//! if the settlement has no reference for that kind yet, assigns it.

use hearth_ecs::command::{CausalReason, CommandBuffer};
use hearth_ecs::EcsError;
use tracing::info;

use crate::clock::TickDelta;
use crate::components::{Building, GoalKind, JobPhase, JobType};
use crate::config::BuildConfig;
use crate::movement::{arrived, step_toward};
use crate::systems::publish_job;
use crate::tick::System;
use crate::world::World;

pub struct ConstructionSystem {
    config: BuildConfig,
    delta: TickDelta,
}

impl ConstructionSystem {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            delta: TickDelta::new(),
        }
    }
}

impl System for ConstructionSystem {
    fn name(&self) -> &str {
        "construction"
    }

    fn run(&mut self, world: &mut World, cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let dt = self.delta.step(world.clock());
        if dt <= 0.0 {
            return;
        }
        let tick = world.clock().tick;

        let builders: Vec<_> = world.builders.iter().map(|(e, a)| (e, a.site)).collect();
        for (builder, site) in builders {
            if world
                .goals
                .get(builder)
                .is_some_and(|g| g.current != GoalKind::Build)
            {
                continue;
            }
            let (Some(pos), Some(site_pos)) = (world.position(builder), world.position(site))
            else {
                continue;
            };
            let Some(completed) = world.sites.get(site).map(|s| s.completed) else {
                continue;
            };
            if completed {
                publish_job(world, builder, JobType::Build, JobPhase::Idle, None, 0.0);
                continue;
            }

            let next = step_toward(pos, site_pos, self.config.move_speed * dt);
            if let Some(t) = world.transforms.get_mut(builder) {
                t.position = next;
            }
            if !arrived(next, site_pos, self.config.arrival_threshold) {
                publish_job(world, builder, JobType::Build, JobPhase::Seek, Some(site), 0.0);
                continue;
            }
            publish_job(world, builder, JobType::Build, JobPhase::Work, Some(site), 0.0);

            let Some(state) = world.sites.get_mut(site) else {
                continue;
            };
            state.progress =
                (state.progress + self.config.build_rate * dt).min(state.required_work);
            if state.progress < state.required_work {
                continue;
            }
            state.completed = true;
            let kind = state.kind;
            info!(%site, ?kind, tick, "construction completed");
            cmds.push(
                Some(site),
                CausalReason::StateTransition {
                    from: "site".to_owned(),
                    to: "building".to_owned(),
                },
                move |w: &mut World| {
                    let position = w
                        .position(site)
                        .ok_or(EcsError::StaleEntity { entity: site })?;
                    w.buildings.insert(site, Building { kind });
                    w.registry.register(site, kind, position);
                    if w.settlement.building(kind).is_none() {
                        w.settlement.assign(kind, site);
                    }
                    Ok(())
                },
            );
        }
    }
}
