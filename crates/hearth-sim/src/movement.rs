//! XZ-plane kinematics shared by every state machine.
//!
//! The simulation is flat: all movement happens on X/Z and the Y coordinate
//! is frozen at its spawn value. Distances used for arrival checks are
//! squared XZ distances.

use glam::{Vec2, Vec3};
use hearth_ecs::command::CommandBuffer;

use crate::clock::TickDelta;
use crate::tick::System;
use crate::world::World;

#[inline]
pub fn xz(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

#[inline]
pub fn xz_distance_sq(a: Vec3, b: Vec3) -> f32 {
    xz(a).distance_squared(xz(b))
}

#[inline]
pub fn xz_distance(a: Vec3, b: Vec3) -> f32 {
    xz_distance_sq(a, b).sqrt()
}

/// Whether `pos` is within `threshold` of `target` on the XZ plane.
#[inline]
pub fn arrived(pos: Vec3, target: Vec3, threshold: f32) -> bool {
    xz_distance_sq(pos, target) <= threshold * threshold
}

/// Move `pos` toward `target` by at most `max_step`, never overshooting.
/// Y is left untouched.
pub fn step_toward(pos: Vec3, target: Vec3, max_step: f32) -> Vec3 {
    if max_step <= 0.0 {
        return pos;
    }
    let delta = xz(target) - xz(pos);
    let dist = delta.length();
    if dist <= max_step || dist <= f32::EPSILON {
        return Vec3::new(target.x, pos.y, target.z);
    }
    let step = delta / dist * max_step;
    Vec3::new(pos.x + step.x, pos.y, pos.z + step.y)
}

/// Push `pos` out of every obstacle circle it overlaps, keeping `body_radius`
/// clearance. Returns the corrected position and whether any contact occurred.
pub fn resolve_obstacles(
    pos: Vec3,
    body_radius: f32,
    obstacles: impl IntoIterator<Item = (Vec3, f32)>,
) -> (Vec3, bool) {
    let mut out = pos;
    let mut contact = false;
    for (center, radius) in obstacles {
        let min_dist = radius + body_radius;
        let offset = xz(out) - xz(center);
        let dist = offset.length();
        if dist >= min_dist {
            continue;
        }
        contact = true;
        // Coincident centers push along +X.
        let dir = if dist > f32::EPSILON {
            offset / dist
        } else {
            Vec2::X
        };
        let fixed = xz(center) + dir * min_dist;
        out = Vec3::new(fixed.x, out.y, fixed.y);
    }
    (out, contact)
}

// ---------------------------------------------------------------------------
// Probe movement
// ---------------------------------------------------------------------------

/// Body radius the probe mover uses against obstacles.
pub const PROBE_BODY_RADIUS: f32 = 0.5;

/// Straight-line mover for entities with a [`MoveTarget`](crate::components::MoveTarget).
///
/// Used by the movement and collision probes. Obstacles are resolved after
/// the step, so a probe aimed through an obstacle slides to its rim and
/// stays in contact.
#[derive(Default)]
pub struct ProbeMovementSystem {
    delta: TickDelta,
}

impl ProbeMovementSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for ProbeMovementSystem {
    fn name(&self) -> &str {
        "probe_movement"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let dt = self.delta.step(world.clock());
        if dt <= 0.0 {
            return;
        }

        let obstacles: Vec<(Vec3, f32)> = world
            .obstacles
            .iter()
            .filter_map(|(e, o)| world.transforms.get(e).map(|t| (t.position, o.radius)))
            .collect();

        let World {
            transforms,
            move_targets,
            ..
        } = world;
        for (entity, mover) in move_targets.iter() {
            let Some(transform) = transforms.get_mut(entity) else {
                continue;
            };
            let stepped = step_toward(transform.position, mover.target, mover.speed * dt);
            let (resolved, _) =
                resolve_obstacles(stepped, PROBE_BODY_RADIUS, obstacles.iter().copied());
            transform.position = resolved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{MoveTarget, Obstacle, Transform};

    #[test]
    fn step_never_overshoots_and_keeps_y() {
        let pos = Vec3::new(0.0, 2.0, 0.0);
        let target = Vec3::new(3.0, 9.0, 4.0);
        let half = step_toward(pos, target, 2.5);
        assert!((xz_distance(pos, half) - 2.5).abs() < 1e-5);
        assert_eq!(half.y, 2.0);
        let done = step_toward(half, target, 100.0);
        assert_eq!(done, Vec3::new(3.0, 2.0, 4.0));
    }

    #[test]
    fn zero_step_is_a_no_op() {
        let pos = Vec3::new(1.0, 0.0, 1.0);
        assert_eq!(step_toward(pos, Vec3::ZERO, 0.0), pos);
    }

    #[test]
    fn obstacle_pushes_out_to_rim() {
        let (pos, contact) =
            resolve_obstacles(Vec3::new(0.5, 0.0, 0.0), 0.5, [(Vec3::ZERO, 1.0)]);
        assert!(contact);
        assert!((xz_distance(pos, Vec3::ZERO) - 1.5).abs() < 1e-5);

        let (_, contact) = resolve_obstacles(Vec3::new(5.0, 0.0, 0.0), 0.5, [(Vec3::ZERO, 1.0)]);
        assert!(!contact);
    }

    #[test]
    fn probe_stops_at_obstacle_rim() {
        let mut world = World::new(0.1);
        let probe = world.spawn();
        world.transforms.insert(probe, Transform::at(-5.0, 0.0, 0.0));
        world.move_targets.insert(
            probe,
            MoveTarget {
                target: Vec3::new(5.0, 0.0, 0.0),
                speed: 4.0,
            },
        );
        let rock = world.spawn();
        world.transforms.insert(rock, Transform::at(0.0, 0.0, 0.0));
        world.obstacles.insert(rock, Obstacle { radius: 1.0 });

        let mut system = ProbeMovementSystem::new();
        let mut cmds = CommandBuffer::new();
        for tick in 0..60 {
            world.clock_mut().tick = tick;
            system.run(&mut world, &mut cmds);
        }
        let p = world.position(probe).unwrap();
        assert!(p.x < 0.0);
        assert!(xz_distance(p, Vec3::ZERO) >= 1.5 - 1e-4);
    }
}
