//! The shared proof shape.
//!
//! Every proof is a [`ProofCriteria`] wrapped in a [`ProofSystem`]:
//!
//! ```text
//! Pending --[criteria met]--------------------> Pass
//! Pending --[criteria failed]-----------------> Fail
//! Pending --[tick >= start_tick + timeout]----> Fail
//! ```
//!
//! Both outcomes are terminal. On the verdict the system writes exactly one
//! log line and one telemetry record, and, when configured, records an exit
//! request. After that it never evaluates or emits again.

use hearth_ecs::command::CommandBuffer;
use hearth_sim::config::{HarnessConfig, ProofToggle};
use hearth_sim::tick::System;
use hearth_sim::world::World;
use tracing::debug;

use crate::exit::request_exit;
use crate::telemetry::{emit, Emit};

/// Result of one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Pending,
    Pass {
        observed: f32,
        detail: String,
    },
    Fail {
        reason: String,
        observed: f32,
        detail: String,
    },
}

impl Evaluation {
    pub fn pass(observed: f32, detail: impl Into<String>) -> Self {
        Self::Pass {
            observed,
            detail: detail.into(),
        }
    }

    pub fn fail(reason: impl Into<String>, observed: f32, detail: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
            observed,
            detail: detail.into(),
        }
    }
}

/// A terminal verdict as seen by the criteria's hook.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub pass: bool,
    pub tick: u32,
    pub reason: Option<String>,
    pub observed: f32,
}

/// What a particular proof checks.
pub trait ProofCriteria {
    /// Bracketed name used in log lines, e.g. `"CombatProof"`.
    fn name(&self) -> &'static str;

    /// Loop id in telemetry records.
    fn loop_id(&self) -> &'static str;

    fn expected_rule(&self) -> &'static str;

    /// Exit code requested on failure.
    fn failure_exit_code(&self) -> i32;

    /// Look at this tick's state. Called once per live tick until a verdict.
    fn observe(&mut self, world: &World) -> Evaluation;

    /// Reason, observed value and diagnostics for a timeout failure.
    fn timeout_diagnostics(&self, _world: &World) -> (String, f32, String) {
        ("timeout".to_owned(), 0.0, String::new())
    }

    /// Extra side effects once the verdict is in (bank markers, samples).
    fn on_verdict(&mut self, _world: &mut World, _verdict: &Verdict) {}
}

/// Per-instance verdict bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProofState {
    pub done: bool,
    pub start_tick: Option<u32>,
    pub timeout_tick: u32,
}

pub struct ProofSystem<C> {
    criteria: C,
    toggle: ProofToggle,
    active: bool,
    state: ProofState,
    system_name: String,
}

impl<C: ProofCriteria> ProofSystem<C> {
    /// A proof that is active when `toggle.enabled` says so or, if unset,
    /// when `active_by_default` is true.
    pub fn new(criteria: C, toggle: ProofToggle, active_by_default: bool) -> Self {
        let active = toggle.enabled.unwrap_or(active_by_default);
        let system_name = format!("proof:{}", criteria.loop_id());
        Self {
            criteria,
            toggle,
            active,
            state: ProofState::default(),
            system_name,
        }
    }

    /// Activation by scenario path suffix.
    pub fn for_scenario(
        criteria: C,
        toggle: ProofToggle,
        config: &HarnessConfig,
        suffixes: &[&str],
    ) -> Self {
        let matched = config.scenario_matches(suffixes);
        Self::new(criteria, toggle, matched)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> ProofState {
        self.state
    }

    pub fn criteria(&self) -> &C {
        &self.criteria
    }

    fn conclude(&mut self, world: &mut World, evaluation: Evaluation) {
        let tick = world.clock().tick;
        let name = self.criteria.name();
        let (pass, reason, observed, detail) = match evaluation {
            Evaluation::Pending => return,
            Evaluation::Pass { observed, detail } => (true, None, observed, detail),
            Evaluation::Fail {
                reason,
                observed,
                detail,
            } => (false, Some(reason), observed, detail),
        };
        self.state.done = true;

        let mut line = match &reason {
            None => format!("[{name}] PASS tick={tick} observed={observed}"),
            Some(r) => format!("[{name}] FAIL tick={tick} reason={r} observed={observed}"),
        };
        if !detail.is_empty() {
            line.push(' ');
            line.push_str(&detail);
        }
        world.proof_log.push(line);

        emit(
            world,
            Emit {
                loop_id: self.criteria.loop_id(),
                pass,
                observed_value: observed,
                expected_rule: self.criteria.expected_rule(),
                timeout_ticks: self.toggle.timeout_ticks,
                step: "verdict",
            },
        );

        let verdict = Verdict {
            pass,
            tick,
            reason,
            observed,
        };
        self.criteria.on_verdict(world, &verdict);

        if self.toggle.exit_on_result {
            world.pending_proofs = world.pending_proofs.saturating_sub(1);
            let code = if pass {
                0
            } else {
                self.criteria.failure_exit_code()
            };
            request_exit(&mut world.exit_request, tick, code);
        }
    }
}

impl<C: ProofCriteria> System for ProofSystem<C> {
    fn name(&self) -> &str {
        &self.system_name
    }

    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        if !self.active || self.state.done || !world.clock().is_live() {
            return;
        }
        let tick = world.clock().tick;
        if self.state.start_tick.is_none() {
            self.state.start_tick = Some(tick);
            self.state.timeout_tick = tick.saturating_add(self.toggle.timeout_ticks);
            if self.toggle.exit_on_result {
                world.pending_proofs += 1;
            }
            debug!(
                proof = self.criteria.name(),
                start = tick,
                timeout = self.state.timeout_tick,
                "proof armed"
            );
        }

        let evaluation = self.criteria.observe(world);
        let evaluation = match evaluation {
            Evaluation::Pending if tick >= self.state.timeout_tick => {
                let (reason, observed, detail) = self.criteria.timeout_diagnostics(world);
                Evaluation::Fail {
                    reason,
                    observed,
                    detail,
                }
            }
            other => other,
        };
        self.conclude(world, evaluation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Passes once the tick reaches `at`, if ever.
    struct PassAt(Option<u32>);

    impl ProofCriteria for PassAt {
        fn name(&self) -> &'static str {
            "TestProof"
        }
        fn loop_id(&self) -> &'static str {
            "test"
        }
        fn expected_rule(&self) -> &'static str {
            "tick>=at"
        }
        fn failure_exit_code(&self) -> i32 {
            4
        }
        fn observe(&mut self, world: &World) -> Evaluation {
            match self.0 {
                Some(at) if world.clock().tick >= at => Evaluation::pass(at as f32, ""),
                _ => Evaluation::Pending,
            }
        }
    }

    fn drive(system: &mut ProofSystem<PassAt>, world: &mut World, ticks: u32) {
        let mut cmds = CommandBuffer::new();
        for _ in 0..ticks {
            system.run(world, &mut cmds);
            world.clock_mut().tick += 1;
        }
    }

    #[test]
    fn pass_is_emitted_once() {
        let mut world = World::default();
        let mut system = ProofSystem::new(PassAt(Some(3)), ProofToggle::with_timeout(100), true);
        drive(&mut system, &mut world, 50);
        assert_eq!(world.proof_log.lines(), &["[TestProof] PASS tick=3 observed=3"]);
        assert_eq!(world.telemetry.appended_total(), 1);
        assert_eq!(world.exit_request.map(|r| r.exit_code), Some(0));
    }

    #[test]
    fn timeout_fails_with_proof_code() {
        let mut world = World::default();
        world.clock_mut().tick = 20;
        let mut system = ProofSystem::new(PassAt(None), ProofToggle::with_timeout(10), true);
        drive(&mut system, &mut world, 30);
        assert_eq!(
            world.proof_log.lines(),
            &["[TestProof] FAIL tick=30 reason=timeout observed=0"]
        );
        assert_eq!(world.exit_request.map(|r| r.exit_code), Some(4));
        assert!(system.state().done);
    }

    #[test]
    fn inactive_proof_stays_silent() {
        let mut world = World::default();
        let mut system = ProofSystem::new(PassAt(Some(0)), ProofToggle::with_timeout(5), false);
        drive(&mut system, &mut world, 10);
        assert!(world.proof_log.lines().is_empty());
        assert!(world.exit_request.is_none());
    }

    #[test]
    fn env_flag_overrides_scenario_match() {
        let toggle = ProofToggle {
            enabled: Some(false),
            ..ProofToggle::with_timeout(5)
        };
        let system = ProofSystem::new(PassAt(Some(0)), toggle, true);
        assert!(!system.is_active());
    }

    #[test]
    fn no_exit_request_when_disabled() {
        let mut world = World::default();
        let toggle = ProofToggle {
            exit_on_result: false,
            ..ProofToggle::with_timeout(5)
        };
        let mut system = ProofSystem::new(PassAt(Some(1)), toggle, true);
        drive(&mut system, &mut world, 5);
        assert_eq!(world.proof_log.lines().len(), 1);
        assert!(world.exit_request.is_none());
    }

    #[test]
    fn armed_proofs_are_counted_until_verdict() {
        let mut world = World::default();
        let mut early = ProofSystem::new(PassAt(Some(2)), ProofToggle::with_timeout(100), true);
        let mut late = ProofSystem::new(PassAt(Some(8)), ProofToggle::with_timeout(100), true);
        let mut cmds = CommandBuffer::new();
        for tick in 0..10 {
            early.run(&mut world, &mut cmds);
            late.run(&mut world, &mut cmds);
            let expected = match tick {
                0..=1 => 2,
                2..=7 => 1,
                _ => 0,
            };
            assert_eq!(world.pending_proofs, expected, "tick {tick}");
            world.clock_mut().tick += 1;
        }
    }

    #[test]
    fn paused_clock_defers_evaluation() {
        let mut world = World::default();
        world.clock_mut().is_paused = true;
        let mut system = ProofSystem::new(PassAt(Some(0)), ProofToggle::with_timeout(5), true);
        drive(&mut system, &mut world, 10);
        assert!(world.proof_log.lines().is_empty());
        assert_eq!(system.state().start_tick, None);
    }
}
