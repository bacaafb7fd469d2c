//! Risk weighting changes the chosen route.
//!
//! The safe-weighted and direct plans between the same endpoints must have
//! different midpoints, each matching the scenario's expectation when one
//! is given.

use hearth_sim::nav::{midpoint, RouteProbe};
use hearth_sim::world::World;

use crate::verdict::{Evaluation, ProofCriteria};

#[derive(Default)]
pub struct NavPreferenceProof;

impl NavPreferenceProof {
    pub fn new() -> Self {
        Self
    }
}

fn matches_expectation(actual: Option<usize>, expected: Option<usize>) -> bool {
    expected.map_or(true, |e| actual == Some(e))
}

fn judge(probe: &RouteProbe) -> Evaluation {
    let (Some(safe), Some(direct)) = (probe.safe_path.as_deref(), probe.direct_path.as_deref())
    else {
        return Evaluation::fail("no_route", 0.0, format!("from={} to={}", probe.from, probe.to));
    };
    let safe_mid = midpoint(safe);
    let direct_mid = midpoint(direct);
    let detail = format!(
        "safe_mid={safe_mid:?} direct_mid={direct_mid:?} safe_len={} direct_len={}",
        safe.len(),
        direct.len()
    );
    let differ = safe_mid != direct_mid;
    if differ
        && matches_expectation(safe_mid, probe.expected_safe_midpoint)
        && matches_expectation(direct_mid, probe.expected_direct_midpoint)
    {
        Evaluation::pass(1.0, detail)
    } else {
        Evaluation::fail("midpoint_mismatch", if differ { 1.0 } else { 0.0 }, detail)
    }
}

impl ProofCriteria for NavPreferenceProof {
    fn name(&self) -> &'static str {
        "NavPreferenceProof"
    }

    fn loop_id(&self) -> &'static str {
        "nav_preference"
    }

    fn expected_rule(&self) -> &'static str {
        "safe_midpoint!=direct_midpoint"
    }

    fn failure_exit_code(&self) -> i32 {
        4
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        match &world.route_probe {
            Some(probe) if probe.planned_tick.is_some() => judge(probe),
            _ => Evaluation::Pending,
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        let reason = if world.route_probe.is_none() {
            "no_probe"
        } else {
            "not_planned"
        };
        (reason.to_owned(), 0.0, String::new())
    }
}
