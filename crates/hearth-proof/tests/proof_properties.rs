//! Property tests for the proof machinery: one verdict per run, timeouts
//! always terminate, exit codes are sticky and detector windows stay
//! bounded.

use hearth_ecs::command::CommandBuffer;
use hearth_ecs::entity::EntityId;
use hearth_proof::exit::request_exit;
use hearth_proof::repetition::{classify, AgentTrace, CycleKind, IntentKey, TargetClass};
use hearth_proof::verdict::{Evaluation, ProofCriteria, ProofSystem};
use hearth_sim::components::{AgentJob, GoalKind, JobPhase, JobType};
use hearth_sim::config::ProofToggle;
use hearth_sim::tick::System;
use hearth_sim::world::World;
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Criteria that never succeed.
struct Never;

impl ProofCriteria for Never {
    fn name(&self) -> &'static str {
        "NeverProof"
    }
    fn loop_id(&self) -> &'static str {
        "never"
    }
    fn expected_rule(&self) -> &'static str {
        "unreachable"
    }
    fn failure_exit_code(&self) -> i32 {
        4
    }
    fn observe(&mut self, _world: &World) -> Evaluation {
        Evaluation::Pending
    }
}

/// Criteria that pass from a given tick on.
struct PassFrom(u32);

impl ProofCriteria for PassFrom {
    fn name(&self) -> &'static str {
        "FromProof"
    }
    fn loop_id(&self) -> &'static str {
        "from"
    }
    fn expected_rule(&self) -> &'static str {
        "tick>=n"
    }
    fn failure_exit_code(&self) -> i32 {
        5
    }
    fn observe(&mut self, world: &World) -> Evaluation {
        if world.clock().tick >= self.0 {
            Evaluation::pass(1.0, "")
        } else {
            Evaluation::Pending
        }
    }
}

/// Feed ticks `start..=end` to `system`.
fn feed<S: System>(system: &mut S, world: &mut World, start: u32, end: u32) {
    let mut cmds = CommandBuffer::new();
    for tick in start..=end {
        world.clock_mut().tick = tick;
        system.run(world, &mut cmds);
    }
}

fn key(phase: JobPhase) -> IntentKey {
    IntentKey::new(
        GoalKind::Work,
        &AgentJob {
            job_type: JobType::Gather,
            job_phase: phase,
            ..AgentJob::default()
        },
        TargetClass::None,
    )
}

fn phase_strategy() -> impl Strategy<Value = JobPhase> {
    prop_oneof![
        Just(JobPhase::Idle),
        Just(JobPhase::Seek),
        Just(JobPhase::Harvest),
        Just(JobPhase::Deliver),
        Just(JobPhase::Rest),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn timeout_yields_exactly_one_fail(start in 0u32..5_000, timeout in 0u32..300) {
        let mut world = World::default();
        let mut system = ProofSystem::new(Never, ProofToggle::with_timeout(timeout), true);
        feed(&mut system, &mut world, start, start + timeout);

        let lines = world.proof_log.lines();
        prop_assert_eq!(lines.len(), 1);
        prop_assert!(lines[0].starts_with("[NeverProof] FAIL"));
        prop_assert!(lines[0].contains("reason=timeout"));
        let tick: u32 = lines[0]
            .split_whitespace()
            .find_map(|kv| kv.strip_prefix("tick="))
            .and_then(|t| t.parse().ok())
            .unwrap();
        prop_assert!(tick <= start + timeout);
        prop_assert_eq!(world.exit_request.map(|r| r.exit_code), Some(4));
    }

    #[test]
    fn verdict_is_idempotent(pass_at in 0u32..100, extra in 1u32..500) {
        let mut world = World::default();
        let toggle = ProofToggle::with_timeout(1_000);
        let mut system = ProofSystem::new(PassFrom(pass_at), toggle, true);
        feed(&mut system, &mut world, 0, pass_at);
        let lines = world.proof_log.lines().len();
        let records = world.telemetry.appended_total();
        prop_assert_eq!(lines, 1);
        prop_assert_eq!(records, 1);

        feed(&mut system, &mut world, pass_at + 1, pass_at + extra);
        prop_assert_eq!(world.proof_log.lines().len(), lines);
        prop_assert_eq!(world.telemetry.appended_total(), records);
    }

    #[test]
    fn first_nonzero_exit_code_sticks(codes in prop::collection::vec(0i32..7, 1..20)) {
        let mut slot = None;
        for (tick, &code) in codes.iter().enumerate() {
            request_exit(&mut slot, tick as u32, code);
        }
        let expected = codes.iter().copied().find(|&c| c != 0).unwrap_or(0);
        prop_assert_eq!(slot.map(|r| r.exit_code), Some(expected));
    }

    #[test]
    fn trace_window_never_exceeds_capacity(
        phases in prop::collection::vec(phase_strategy(), 0..400),
        capacity in 1usize..40,
    ) {
        let mut trace = AgentTrace::new(EntityId::new(0, 0));
        for phase in phases {
            trace.observe(key(phase), phase, 0.0, capacity, 0.01);
            prop_assert!(trace.signatures.len() <= capacity);
            prop_assert_eq!(trace.signatures.len(), trace.reasons.len());
        }
    }

    #[test]
    fn alternating_pairs_classify_as_oscillation(pairs in 3usize..12) {
        let window: Vec<u32> = (0..pairs * 2).map(|i| if i % 2 == 0 { 1 } else { 2 }).collect();
        prop_assert_eq!(classify(&window, 3, 3), CycleKind::Oscillation);
    }
}

// ---------------------------------------------------------------------------
// Fixed cases
// ---------------------------------------------------------------------------

#[test]
fn success_then_failure_keeps_failure() {
    let mut slot = None;
    request_exit(&mut slot, 10, 5);
    request_exit(&mut slot, 11, 0);
    assert_eq!(slot.map(|r| r.exit_code), Some(5));
}

#[test]
fn delivery_after_identical_signatures_resets_window() {
    let mut trace = AgentTrace::new(EntityId::new(0, 0));
    for _ in 0..10 {
        trace.observe(key(JobPhase::Seek), JobPhase::Seek, 0.0, 24, 0.01);
    }
    trace.observe(key(JobPhase::Deliver), JobPhase::Deliver, 4.0, 24, 0.01);
    let before = trace.progress_events;
    trace.observe(key(JobPhase::Deliver), JobPhase::Deliver, 0.0, 24, 0.01);
    assert!(trace.signatures.is_empty());
    assert_eq!(trace.progress_events, before + 1);
}

#[test]
fn oscillation_threshold_is_respected() {
    let seq = [1, 2, 1, 2, 1, 2, 1, 2];
    assert_eq!(classify(&seq, 3, 99), CycleKind::Oscillation);
    assert_eq!(classify(&seq, 5, 99), CycleKind::None);
}
