//! Repetition and livelock detection over agent intent signatures.
//!
//! Every tick each agent's `(goal, job type|phase|intent|plan, target class)`
//! tuple is hashed into a 32-bit signature. Only changes are recorded, into
//! a bounded per-agent window. A delivery clears the agent's window: an
//! agent that is delivering is making progress, however repetitive it looks.
//!
//! At evaluation time each agent with enough samples is scored for Shannon
//! entropy and for 2-cycles (oscillation) and then 3-cycles (short cycles).
//! The run fails only when repetition is high *and* the village is in
//! livelock, meaning stored resources barely moved while agents kept
//! transitioning.

use std::collections::{BTreeMap, VecDeque};

use hearth_ecs::entity::EntityId;
use hearth_sim::components::{AgentJob, GoalKind, JobPhase};
use hearth_sim::config::DetectorConfig;
use hearth_sim::world::World;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::telemetry::{emit, Emit};
use crate::verdict::{Evaluation, ProofCriteria, Verdict};

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TargetClass {
    None = 0,
    Storehouse = 1,
    ResourceNode = 2,
    Other = 3,
}

impl TargetClass {
    pub fn of(world: &World, target: Option<EntityId>) -> Self {
        match target {
            None => Self::None,
            Some(e) if world.storehouses.contains(e) => Self::Storehouse,
            Some(e) if world.resource_nodes.contains(e) => Self::ResourceNode,
            Some(_) => Self::Other,
        }
    }
}

/// The unhashed tuple, kept so reasons can say what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentKey {
    pub goal: u8,
    pub job: [u8; 4],
    pub target: u8,
}

impl IntentKey {
    pub fn new(goal: GoalKind, job: &AgentJob, target: TargetClass) -> Self {
        Self {
            goal: goal.code(),
            job: [
                job.job_type as u8,
                job.job_phase as u8,
                job.move_intent as u8,
                job.move_plan as u8,
            ],
            target: target as u8,
        }
    }

    pub fn signature(&self) -> u32 {
        let bytes = [
            self.goal,
            self.job[0],
            self.job[1],
            self.job[2],
            self.job[3],
            self.target,
        ];
        let hash = blake3::hash(&bytes);
        let b = hash.as_bytes();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Bitmask of what differs from `prev`: 1 goal, 2 job, 4 target.
    pub fn reason_since(&self, prev: Option<&IntentKey>) -> u8 {
        let Some(prev) = prev else {
            return 0;
        };
        let mut reason = 0;
        if self.goal != prev.goal {
            reason |= 1;
        }
        if self.job != prev.job {
            reason |= 2;
        }
        if self.target != prev.target {
            reason |= 4;
        }
        reason
    }
}

// ---------------------------------------------------------------------------
// Per-agent trace
// ---------------------------------------------------------------------------

/// Bounded intent history of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTrace {
    /// The agent this trace belongs to.
    pub entity: EntityId,
    /// Distinct consecutive intent signatures, oldest first.
    pub signatures: VecDeque<u32>,
    /// Change bitmask per signature: 1 goal, 2 job, 4 target.
    pub reasons: VecDeque<u8>,
    /// Most recent signature, kept across window resets.
    pub last_signature: Option<u32>,
    last_key: Option<IntentKey>,
    /// Signature changes since the trace started.
    pub thrash_transitions: i32,
    /// Deliveries seen; each one cleared the window.
    pub progress_events: i32,
    last_phase: Option<JobPhase>,
    last_carry: f32,
}

impl AgentTrace {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            signatures: VecDeque::new(),
            reasons: VecDeque::new(),
            last_signature: None,
            last_key: None,
            thrash_transitions: 0,
            progress_events: 0,
            last_phase: None,
            last_carry: 0.0,
        }
    }

    /// Record one observation. Returns true if it was a delivery.
    pub fn observe(
        &mut self,
        key: IntentKey,
        phase: JobPhase,
        carry: f32,
        capacity: usize,
        carry_epsilon: f32,
    ) -> bool {
        let delivered = self.last_phase == Some(JobPhase::Deliver)
            && self.last_carry > carry_epsilon
            && carry <= carry_epsilon;
        self.last_phase = Some(phase);
        self.last_carry = carry;

        let signature = key.signature();
        if delivered {
            self.signatures.clear();
            self.reasons.clear();
            self.progress_events += 1;
        } else if self.last_signature != Some(signature) {
            if self.signatures.len() >= capacity.max(1) {
                self.signatures.pop_front();
                self.reasons.pop_front();
            }
            self.signatures.push_back(signature);
            self.reasons.push_back(key.reason_since(self.last_key.as_ref()));
            self.thrash_transitions += 1;
        }
        self.last_signature = Some(signature);
        self.last_key = Some(key);
        delivered
    }

    pub fn window(&self) -> Vec<u32> {
        self.signatures.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// Window statistics
// ---------------------------------------------------------------------------

/// Shannon entropy in bits of the value distribution.
pub fn shannon_entropy(window: &[u32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for &s in window {
        *counts.entry(s).or_insert(0) += 1;
    }
    let n = window.len() as f32;
    counts
        .values()
        .map(|&c| {
            let p = c as f32 / n;
            -p * p.log2()
        })
        .sum()
}

/// How many times a cycle of length `period` repeats at the end of `window`.
///
/// Counts the trailing run of positions matching the value `period` places
/// earlier; a run of `r` covers `(r + period) / period` periods.
pub fn cycle_repeats(window: &[u32], period: usize) -> usize {
    let n = window.len();
    if period == 0 || n < period * 2 {
        return 0;
    }
    let run = (0..n - period)
        .take_while(|&i| window[n - 1 - i] == window[n - 1 - i - period])
        .count();
    if run == 0 {
        0
    } else {
        (run + period) / period
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleKind {
    None,
    Oscillation,
    ShortCycle,
}

/// Oscillation is checked first; the first match wins.
pub fn classify(window: &[u32], osc_repeats: usize, short_repeats: usize) -> CycleKind {
    if cycle_repeats(window, 2) >= osc_repeats.max(1) {
        CycleKind::Oscillation
    } else if cycle_repeats(window, 3) >= short_repeats.max(1) {
        CycleKind::ShortCycle
    } else {
        CycleKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepetitionReason {
    Oscillation,
    ShortCycle,
    LowEntropy,
}

impl RepetitionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oscillation => "oscillation",
            Self::ShortCycle => "short_cycle",
            Self::LowEntropy => "low_entropy",
        }
    }
}

/// Window-level numbers the verdict is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Agents with a trace, the ratio denominator.
    pub traced_agents: usize,
    /// Agents with at least `min_samples` signatures.
    pub evaluated_agents: usize,
    /// Evaluated agents whose window is a 2-cycle.
    pub oscillation_count: usize,
    /// Evaluated agents whose window is a 3-cycle.
    pub short_cycle_count: usize,
    /// Median over evaluated agents; `None` when nobody was evaluated.
    pub median_entropy: Option<f32>,
    /// Stored total now minus the baseline taken at the first observation.
    pub stored_delta: f32,
    /// Mean `thrash_transitions` over traced agents.
    pub avg_transitions: f32,
}

/// Outcome of [`Aggregate::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub oscillation_ratio: f32,
    pub short_cycle_ratio: f32,
    /// First repetition rule that tripped, if any.
    pub repetition: Option<RepetitionReason>,
    /// Little was stored while agents kept switching intent.
    pub livelock: bool,
    /// False only when repetition and livelock hold together.
    pub pass: bool,
}

impl Aggregate {
    pub fn decide(&self, cfg: &DetectorConfig) -> Decision {
        let denom = self.traced_agents.max(1) as f32;
        let oscillation_ratio = self.oscillation_count as f32 / denom;
        let short_cycle_ratio = self.short_cycle_count as f32 / denom;
        let repetition = if oscillation_ratio > cfg.fail_percent {
            Some(RepetitionReason::Oscillation)
        } else if short_cycle_ratio > cfg.fail_percent {
            Some(RepetitionReason::ShortCycle)
        } else if self.median_entropy.is_some_and(|m| m < cfg.entropy_min) {
            Some(RepetitionReason::LowEntropy)
        } else {
            None
        };
        let livelock = self.stored_delta < cfg.livelock_min_stored
            && self.avg_transitions >= cfg.livelock_min_transitions;
        Decision {
            oscillation_ratio,
            short_cycle_ratio,
            repetition,
            livelock,
            pass: !(repetition.is_some() && livelock),
        }
    }
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by_key(|v| OrderedFloat(*v));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// One agent singled out in the report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlaggedAgent {
    pub entity: EntityId,
    pub kind: CycleKind,
    pub entropy: f32,
    pub samples: usize,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct RepetitionDetector {
    config: DetectorConfig,
    traces: BTreeMap<EntityId, AgentTrace>,
    baseline_stored: Option<f32>,
}

impl RepetitionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            traces: BTreeMap::new(),
            baseline_stored: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn trace(&self, entity: EntityId) -> Option<&AgentTrace> {
        self.traces.get(&entity)
    }

    pub fn traces(&self) -> impl Iterator<Item = &AgentTrace> {
        self.traces.values()
    }

    /// Fold one tick of world state into the traces.
    pub fn observe_world(&mut self, world: &World) {
        if self.baseline_stored.is_none() {
            self.baseline_stored = Some(world.total_stored());
        }
        for (entity, job) in world.jobs.iter() {
            let goal = world
                .goals
                .get(entity)
                .map(|g| g.current)
                .unwrap_or_default();
            let key = IntentKey::new(goal, job, TargetClass::of(world, job.target));
            self.traces
                .entry(entity)
                .or_insert_with(|| AgentTrace::new(entity))
                .observe(
                    key,
                    job.job_phase,
                    job.carry_count,
                    self.config.capacity,
                    self.config.carry_epsilon,
                );
        }
    }

    pub fn aggregate(&self, stored_now: f32) -> (Aggregate, Vec<FlaggedAgent>) {
        let cfg = &self.config;
        let mut entropies = Vec::new();
        let mut flagged = Vec::new();
        let mut oscillation_count = 0;
        let mut short_cycle_count = 0;
        let mut transitions: i64 = 0;

        for trace in self.traces.values() {
            transitions += trace.thrash_transitions as i64;
            if trace.signatures.len() < cfg.min_samples {
                continue;
            }
            let window = trace.window();
            let entropy = shannon_entropy(&window);
            entropies.push(entropy);
            let kind = classify(&window, cfg.osc_repeats, cfg.short_repeats);
            match kind {
                CycleKind::Oscillation => oscillation_count += 1,
                CycleKind::ShortCycle => short_cycle_count += 1,
                CycleKind::None => continue,
            }
            flagged.push(FlaggedAgent {
                entity: trace.entity,
                kind,
                entropy,
                samples: window.len(),
            });
        }

        let traced = self.traces.len();
        let aggregate = Aggregate {
            traced_agents: traced,
            evaluated_agents: entropies.len(),
            oscillation_count,
            short_cycle_count,
            median_entropy: median(&mut entropies),
            stored_delta: stored_now - self.baseline_stored.unwrap_or(stored_now),
            avg_transitions: if traced == 0 {
                0.0
            } else {
                transitions as f32 / traced as f32
            },
        };
        (aggregate, flagged)
    }
}

// ---------------------------------------------------------------------------
// Proof
// ---------------------------------------------------------------------------

/// Evaluates the detector once, `window_ticks` after scenario start.
pub struct RepetitionProof {
    detector: RepetitionDetector,
    flagged: Vec<FlaggedAgent>,
}

impl RepetitionProof {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            detector: RepetitionDetector::new(config),
            flagged: Vec::new(),
        }
    }

    pub fn detector(&self) -> &RepetitionDetector {
        &self.detector
    }
}

impl ProofCriteria for RepetitionProof {
    fn name(&self) -> &'static str {
        "RepetitionProof"
    }

    fn loop_id(&self) -> &'static str {
        "repetition"
    }

    fn expected_rule(&self) -> &'static str {
        "!(repetition_high && livelock)"
    }

    fn failure_exit_code(&self) -> i32 {
        6
    }

    fn observe(&mut self, world: &World) -> Evaluation {
        self.detector.observe_world(world);
        let tick = world.clock().tick;
        let window_end = world
            .run
            .scenario_start_tick
            .saturating_add(self.detector.config.window_ticks);
        if tick < window_end {
            return Evaluation::Pending;
        }

        let (aggregate, flagged) = self.detector.aggregate(world.total_stored());
        let decision = aggregate.decide(&self.detector.config);
        self.flagged = flagged;
        let detail = format!(
            "agents={} evaluated={} osc_ratio={:.3} short_ratio={:.3} median_entropy={} stored_delta={:.2} avg_transitions={:.2} livelock={}",
            aggregate.traced_agents,
            aggregate.evaluated_agents,
            decision.oscillation_ratio,
            decision.short_cycle_ratio,
            aggregate
                .median_entropy
                .map_or_else(|| "n/a".to_owned(), |m| format!("{m:.3}")),
            aggregate.stored_delta,
            aggregate.avg_transitions,
            decision.livelock,
        );
        let observed = decision.oscillation_ratio.max(decision.short_cycle_ratio);
        if decision.pass {
            Evaluation::pass(observed, detail)
        } else {
            let reason = decision
                .repetition
                .map_or("repetition", RepetitionReason::as_str);
            Evaluation::fail(format!("{reason}+livelock"), observed, detail)
        }
    }

    fn timeout_diagnostics(&self, world: &World) -> (String, f32, String) {
        (
            "window_not_evaluated".to_owned(),
            0.0,
            format!("agents={} stored={:.2}", self.detector.traces.len(), world.total_stored()),
        )
    }

    fn on_verdict(&mut self, world: &mut World, verdict: &Verdict) {
        let limit = self.detector.config.flagged_sample_limit;
        for agent in self.flagged.iter().take(limit) {
            emit(
                world,
                Emit {
                    loop_id: "repetition",
                    pass: verdict.pass,
                    observed_value: agent.entropy,
                    expected_rule: match agent.kind {
                        CycleKind::Oscillation => "flagged:oscillation",
                        CycleKind::ShortCycle => "flagged:short_cycle",
                        CycleKind::None => "flagged",
                    },
                    timeout_ticks: 0,
                    step: "flagged_agent",
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_sim::components::{JobType, MoveIntent, MovePlan};

    const A: u32 = 0xA;
    const B: u32 = 0xB;
    const C: u32 = 0xC;

    fn key(phase: JobPhase) -> IntentKey {
        IntentKey::new(
            GoalKind::Work,
            &AgentJob {
                job_type: JobType::Gather,
                job_phase: phase,
                move_intent: MoveIntent::Hold,
                move_plan: MovePlan::None,
                target: None,
                carry_count: 0.0,
            },
            TargetClass::None,
        )
    }

    #[test]
    fn delivery_clears_window_and_counts_progress() {
        let mut trace = AgentTrace::new(EntityId::new(0, 0));
        let cfg = DetectorConfig::default();
        for phase in [JobPhase::Seek, JobPhase::Harvest, JobPhase::Seek, JobPhase::Harvest] {
            trace.observe(key(phase), phase, 0.0, cfg.capacity, cfg.carry_epsilon);
        }
        let (cap, eps) = (cfg.capacity, cfg.carry_epsilon);
        trace.observe(key(JobPhase::Deliver), JobPhase::Deliver, 5.0, cap, eps);
        assert_eq!(trace.signatures.len(), 5);
        let delivered = trace.observe(key(JobPhase::Rest), JobPhase::Rest, 0.0, cap, eps);
        assert!(delivered);
        assert_eq!(trace.signatures.len(), 0);
        assert_eq!(trace.reasons.len(), 0);
        assert_eq!(trace.progress_events, 1);
    }

    #[test]
    fn need_detour_with_load_is_not_a_delivery() {
        use hearth_ecs::command::CommandBuffer;
        use hearth_sim::components::{
            GatherPhase, GatherState, Goal, Needs, Storehouse, Transform,
        };
        use hearth_sim::config::NeedsConfig;
        use hearth_sim::systems::NeedsSystem;
        use hearth_sim::tick::System;

        let mut world = World::new(1.0 / 60.0);
        let depot = world.spawn();
        world.transforms.insert(depot, Transform::at(40.0, 0.0, 0.0));
        world.storehouses.insert(
            depot,
            Storehouse {
                total_stored: 0.0,
                total_capacity: 100.0,
            },
        );
        let v = world.spawn();
        world.transforms.insert(v, Transform::at(0.0, 0.0, 0.0));
        world.needs.insert(
            v,
            Needs {
                hunger: 0.9,
                ..Default::default()
            },
        );
        world.goals.insert(
            v,
            Goal {
                current: GoalKind::Eat,
            },
        );
        let mut state = GatherState::seeded(3);
        state.phase = GatherPhase::ToDepot;
        state.carry = 5.0;
        world.gatherers.insert(v, state);
        world.jobs.insert(
            v,
            AgentJob {
                job_type: JobType::Gather,
                job_phase: JobPhase::Deliver,
                target: Some(depot),
                carry_count: 5.0,
                ..Default::default()
            },
        );

        let mut detector = RepetitionDetector::new(DetectorConfig::default());
        detector.observe_world(&world);
        NeedsSystem::new(NeedsConfig::default()).run(&mut world, &mut CommandBuffer::new());
        detector.observe_world(&world);

        let trace = detector.trace(v).unwrap();
        assert_eq!(trace.progress_events, 0);
        assert_eq!(trace.signatures.len(), 2);
        assert_eq!(world.total_stored(), 0.0);
    }

    #[test]
    fn repeated_signature_is_not_reappended() {
        let mut trace = AgentTrace::new(EntityId::new(0, 0));
        for _ in 0..10 {
            trace.observe(key(JobPhase::Idle), JobPhase::Idle, 0.0, 24, 0.01);
        }
        assert_eq!(trace.signatures.len(), 1);
        assert_eq!(trace.thrash_transitions, 1);
    }

    #[test]
    fn window_is_bounded() {
        let mut trace = AgentTrace::new(EntityId::new(0, 0));
        for i in 0..40 {
            let phase = if i % 2 == 0 { JobPhase::Seek } else { JobPhase::Harvest };
            trace.observe(key(phase), phase, 0.0, 8, 0.01);
        }
        assert_eq!(trace.signatures.len(), 8);
        assert_eq!(trace.reasons.len(), 8);
        assert_eq!(trace.thrash_transitions, 40);
    }

    #[test]
    fn oscillation_needs_enough_repeats() {
        let seq = [A, B, A, B, A, B, A, B];
        assert_eq!(cycle_repeats(&seq, 2), 4);
        assert_eq!(classify(&seq, 3, 3), CycleKind::Oscillation);
        assert_eq!(classify(&seq, 5, 99), CycleKind::None);
    }

    #[test]
    fn short_cycle_after_oscillation_check() {
        let seq = [A, B, C, A, B, C, A, B, C];
        assert_eq!(cycle_repeats(&seq, 2), 0);
        assert_eq!(cycle_repeats(&seq, 3), 3);
        assert_eq!(classify(&seq, 3, 3), CycleKind::ShortCycle);
    }

    #[test]
    fn entropy_of_uniform_and_constant() {
        assert_eq!(shannon_entropy(&[A, A, A]), 0.0);
        assert!((shannon_entropy(&[A, B, A, B]) - 1.0).abs() < 1e-6);
        assert!((shannon_entropy(&[A, B, C, 0xD]) - 2.0).abs() < 1e-6);
    }

    fn aggregate(stored_delta: f32, avg_transitions: f32) -> Aggregate {
        Aggregate {
            traced_agents: 4,
            evaluated_agents: 4,
            oscillation_count: 3,
            short_cycle_count: 0,
            median_entropy: Some(1.0),
            stored_delta,
            avg_transitions,
        }
    }

    #[test]
    fn repetition_alone_does_not_fail() {
        let cfg = DetectorConfig::default();
        let decision = aggregate(cfg.livelock_min_stored, 50.0).decide(&cfg);
        assert_eq!(decision.repetition, Some(RepetitionReason::Oscillation));
        assert!(!decision.livelock);
        assert!(decision.pass);
    }

    #[test]
    fn repetition_with_livelock_fails() {
        let cfg = DetectorConfig::default();
        let decision = aggregate(0.0, cfg.livelock_min_transitions).decide(&cfg);
        assert!(decision.livelock);
        assert!(!decision.pass);
    }

    #[test]
    fn low_entropy_is_the_last_resort_reason() {
        let cfg = DetectorConfig::default();
        let agg = Aggregate {
            oscillation_count: 0,
            median_entropy: Some(0.5),
            ..aggregate(0.0, 50.0)
        };
        assert_eq!(agg.decide(&cfg).repetition, Some(RepetitionReason::LowEntropy));
        let none_evaluated = Aggregate {
            evaluated_agents: 0,
            median_entropy: None,
            ..agg
        };
        assert_eq!(none_evaluated.decide(&cfg).repetition, None);
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn signature_depends_on_every_field() {
        let base = key(JobPhase::Seek);
        let mut other_target = base;
        other_target.target = TargetClass::Storehouse as u8;
        let mut other_goal = base;
        other_goal.goal = GoalKind::Eat.code();
        assert_ne!(base.signature(), other_target.signature());
        assert_ne!(base.signature(), other_goal.signature());
        assert_eq!(other_goal.reason_since(Some(&base)), 1);
        assert_eq!(other_target.reason_since(Some(&base)), 4);
    }
}
