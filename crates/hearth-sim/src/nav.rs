//! Risk-weighted navigation graph.
//!
//! Nodes carry a risk factor in `[0, 1]`. An edge's cost is its XZ length
//! scaled by `1 + risk_weight * risk(destination)`, so a weight of zero gives
//! the shortest path and a large weight steers around risky nodes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use glam::Vec3;
use hearth_ecs::command::CommandBuffer;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::movement::xz_distance;
use crate::tick::System;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavNode {
    pub position: Vec3,
    pub risk: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavGraph {
    nodes: Vec<NavNode>,
    adjacency: Vec<Vec<usize>>,
}

impl NavGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, position: Vec3, risk: f32) -> usize {
        self.nodes.push(NavNode {
            position,
            risk: risk.clamp(0.0, 1.0),
        });
        self.adjacency.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Undirected edge. Out-of-range indices are ignored.
    pub fn connect(&mut self, a: usize, b: usize) {
        if a >= self.nodes.len() || b >= self.nodes.len() || a == b {
            return;
        }
        if !self.adjacency[a].contains(&b) {
            self.adjacency[a].push(b);
        }
        if !self.adjacency[b].contains(&a) {
            self.adjacency[b].push(a);
        }
    }

    pub fn node(&self, index: usize) -> Option<&NavNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn edge_cost(&self, from: usize, to: usize, risk_weight: f32) -> f32 {
        let a = &self.nodes[from];
        let b = &self.nodes[to];
        xz_distance(a.position, b.position) * (1.0 + risk_weight * b.risk)
    }

    /// Cheapest path from `from` to `to`, inclusive of both ends.
    ///
    /// Ties are broken toward the lower node index, so the result is
    /// deterministic.
    pub fn route(&self, from: usize, to: usize, risk_weight: f32) -> Option<Vec<usize>> {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return None;
        }
        let n = self.nodes.len();
        let mut best = vec![f32::INFINITY; n];
        let mut prev: Vec<Option<usize>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        best[from] = 0.0;
        heap.push(Reverse((OrderedFloat(0.0f32), from)));

        while let Some(Reverse((OrderedFloat(cost), node))) = heap.pop() {
            if node == to {
                break;
            }
            if cost > best[node] {
                continue;
            }
            for &next in &self.adjacency[node] {
                let candidate = cost + self.edge_cost(node, next, risk_weight);
                if candidate < best[next] {
                    best[next] = candidate;
                    prev[next] = Some(node);
                    heap.push(Reverse((OrderedFloat(candidate), next)));
                }
            }
        }

        if !best[to].is_finite() {
            return None;
        }
        let mut path = vec![to];
        let mut cursor = to;
        while let Some(p) = prev[cursor] {
            path.push(p);
            cursor = p;
        }
        path.reverse();
        Some(path)
    }

    pub fn path_cost(&self, path: &[usize], risk_weight: f32) -> f32 {
        path.windows(2)
            .map(|w| self.edge_cost(w[0], w[1], risk_weight))
            .sum()
    }
}

/// The node in the middle of a path (`path[len / 2]`).
pub fn midpoint(path: &[usize]) -> Option<usize> {
    path.get(path.len() / 2).copied()
}

// ---------------------------------------------------------------------------
// Route probe
// ---------------------------------------------------------------------------

/// A pair of route queries between the same endpoints with opposite risk
/// weighting, and what their midpoints are expected to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProbe {
    pub from: usize,
    pub to: usize,
    pub safe_weight: f32,
    pub expected_safe_midpoint: Option<usize>,
    pub expected_direct_midpoint: Option<usize>,
    pub safe_path: Option<Vec<usize>>,
    pub direct_path: Option<Vec<usize>>,
    pub planned_tick: Option<u32>,
}

impl RouteProbe {
    pub fn new(from: usize, to: usize, safe_weight: f32) -> Self {
        Self {
            from,
            to,
            safe_weight,
            expected_safe_midpoint: None,
            expected_direct_midpoint: None,
            safe_path: None,
            direct_path: None,
            planned_tick: None,
        }
    }

    pub fn expecting(mut self, safe_midpoint: usize, direct_midpoint: usize) -> Self {
        self.expected_safe_midpoint = Some(safe_midpoint);
        self.expected_direct_midpoint = Some(direct_midpoint);
        self
    }
}

/// Plans both probe routes once, the first live tick a graph and probe exist.
#[derive(Default)]
pub struct RoutePlannerSystem;

impl RoutePlannerSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for RoutePlannerSystem {
    fn name(&self) -> &str {
        "route_planner"
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !world.clock().is_live() {
            return;
        }
        let tick = world.clock().tick;
        let World {
            nav, route_probe, ..
        } = world;
        let (Some(graph), Some(probe)) = (nav.as_ref(), route_probe.as_mut()) else {
            return;
        };
        if probe.planned_tick.is_some() {
            return;
        }
        probe.safe_path = graph.route(probe.from, probe.to, probe.safe_weight);
        probe.direct_path = graph.route(probe.from, probe.to, 0.0);
        probe.planned_tick = Some(tick);
        debug!(
            tick,
            safe = ?probe.safe_path,
            direct = ?probe.direct_path,
            "probe routes planned"
        );
    }
}
