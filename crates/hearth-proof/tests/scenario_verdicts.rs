//! End-to-end harness runs of every built-in scenario.

use hearth_proof::prelude::*;

fn config_for(kind: ScenarioKind, extra: &[(&str, &str)]) -> HarnessConfig {
    let path = format!("scenarios/{}", kind.file_name());
    let mut env = MapEnv::from_pairs(extra.iter().copied());
    env.set("HEARTH_SCENARIO", &path);
    HarnessConfig::from_env(&env)
}

fn run(kind: ScenarioKind, extra: &[(&str, &str)]) -> (RunOutcome, Vec<String>, MemorySink) {
    let config = config_for(kind, extra);
    let sink = MemorySink::new();
    let mut harness = Harness::assemble(&config, sink.clone()).unwrap();
    let outcome = harness.run(config.tick.max_ticks);
    let lines = harness.world().proof_log.lines().to_vec();
    (outcome, lines, sink)
}

fn verdict_lines<'a>(lines: &'a [String], name: &str) -> Vec<&'a String> {
    let prefix = format!("[{name}] ");
    lines.iter().filter(|l| l.starts_with(&prefix)).collect()
}

#[test]
fn every_scenario_passes_its_proof() {
    let expected = [
        (ScenarioKind::VillagerLoop, "VillagerGatherProof"),
        (ScenarioKind::MovementProbe, "MovementProof"),
        (ScenarioKind::CollisionProbe, "CollisionProof"),
        (ScenarioKind::CombatDuel, "CombatProof"),
        (ScenarioKind::NeedsCycle, "NeedsProof"),
        (ScenarioKind::VillageBuild, "VillageBuildProof"),
        (ScenarioKind::NavPreference, "NavPreferenceProof"),
        (ScenarioKind::RepetitionLivelock, "RepetitionProof"),
    ];
    for (kind, name) in expected {
        let (outcome, lines, _) = run(kind, &[]);
        let verdicts = verdict_lines(&lines, name);
        assert_eq!(verdicts.len(), 1, "{kind:?}: {lines:?}");
        assert!(verdicts[0].contains(" PASS tick="), "{kind:?}: {}", verdicts[0]);
        assert_eq!(outcome.quit_code, Some(0), "{kind:?}");
        assert_eq!(outcome.exit_code, 0, "{kind:?}: {:?}", outcome.audit);
        assert!(lines.iter().all(|l| !l.contains("FAIL")), "{kind:?}: {lines:?}");
    }
}

#[test]
fn gather_pass_writes_bank_marker_and_telemetry() {
    let (_, lines, sink) = run(ScenarioKind::VillagerLoop, &[]);
    let bank: Vec<_> = lines.iter().filter(|l| l.starts_with("BANK:")).collect();
    assert_eq!(bank.len(), 1);
    assert!(bank[0].starts_with("BANK:P0.VILLAGER_LOOP:PASS tickTime="));
    assert!(bank[0].contains(" scenarioTick="));

    let records = sink.records();
    let verdict: Vec<_> = records
        .iter()
        .filter(|r| r.loop_id == "villager_gather" && r.step == "verdict")
        .collect();
    assert_eq!(verdict.len(), 1);
    assert!(verdict[0].pass);
    assert_eq!(verdict[0].timeout_ticks, 1_800);
}

#[test]
fn gather_timeout_fails_with_code_three() {
    let (outcome, lines, _) = run(
        ScenarioKind::VillagerLoop,
        &[("HEARTH_GATHER_PROOF_TIMEOUT", "1")],
    );
    assert_eq!(outcome.exit_code, 3);
    assert!(lines
        .iter()
        .any(|l| l.starts_with("BANK:P0.VILLAGER_LOOP:FAIL reason=")));
}

#[test]
fn combat_timeout_fails_with_code_five() {
    let (outcome, lines, _) = run(
        ScenarioKind::CombatDuel,
        &[("HEARTH_COMBAT_PROOF_TIMEOUT", "5")],
    );
    assert_eq!(outcome.exit_code, 5);
    let verdicts = verdict_lines(&lines, "CombatProof");
    assert_eq!(verdicts.len(), 1);
    assert!(verdicts[0].starts_with("[CombatProof] FAIL tick=5 reason=never_engaged"));
}

#[test]
fn livelock_with_forced_thresholds_fails_with_code_six() {
    let (outcome, lines, sink) = run(
        ScenarioKind::RepetitionLivelock,
        &[
            ("HEARTH_REPETITION_WINDOW_TICKS", "300"),
            ("HEARTH_REPETITION_MIN_SAMPLES", "1"),
            ("HEARTH_REPETITION_ENTROPY_MIN", "100"),
            ("HEARTH_LIVELOCK_MIN_STORED", "1000000000"),
            ("HEARTH_LIVELOCK_MIN_TRANSITIONS", "0"),
        ],
    );
    assert_eq!(outcome.exit_code, 6);
    let verdicts = verdict_lines(&lines, "RepetitionProof");
    assert_eq!(verdicts.len(), 1);
    assert!(verdicts[0].starts_with("[RepetitionProof] FAIL tick=300 reason="));
    assert!(verdicts[0].contains("+livelock"));
    assert!(sink.records().iter().any(|r| r.loop_id == "repetition"));
}

#[test]
fn disabled_proof_runs_to_max_ticks() {
    let (outcome, lines, _) = run(
        ScenarioKind::MovementProbe,
        &[("HEARTH_MOVEMENT_PROOF", "0"), ("HEARTH_MAX_TICKS", "120")],
    );
    assert_eq!(outcome.ticks_run, 120);
    assert_eq!(outcome.quit_code, None);
    assert_eq!(outcome.exit_code, 0);
    assert!(lines.is_empty());
}

#[test]
fn forced_proof_on_other_scenario_times_out() {
    // The combat proof has no duel to watch in the movement scenario.
    let (outcome, lines, _) = run(
        ScenarioKind::MovementProbe,
        &[
            ("HEARTH_MOVEMENT_PROOF_EXIT", "0"),
            ("HEARTH_COMBAT_PROOF", "1"),
            ("HEARTH_COMBAT_PROOF_TIMEOUT", "50"),
        ],
    );
    assert_eq!(outcome.exit_code, 5);
    let combat = verdict_lines(&lines, "CombatProof");
    assert_eq!(combat.len(), 1);
    assert!(combat[0].contains("reason=no_duel"));
    assert_eq!(verdict_lines(&lines, "MovementProof").len(), 1);
}

#[test]
fn early_pass_waits_for_other_active_proofs() {
    let (outcome, lines, _) = run(
        ScenarioKind::MovementProbe,
        &[
            ("HEARTH_COMBAT_PROOF", "1"),
            ("HEARTH_COMBAT_PROOF_TIMEOUT", "50"),
        ],
    );
    let movement = verdict_lines(&lines, "MovementProof");
    assert_eq!(movement.len(), 1);
    assert!(movement[0].contains(" PASS tick="));
    let combat = verdict_lines(&lines, "CombatProof");
    assert_eq!(combat.len(), 1, "{lines:?}");
    assert!(combat[0].contains("reason=no_duel"));
    assert!(outcome.ticks_run >= 50);
    assert_eq!(outcome.exit_code, 5);
}

#[test]
fn identical_runs_produce_identical_logs() {
    let (a, lines_a, sink_a) = run(ScenarioKind::VillagerLoop, &[]);
    let (b, lines_b, sink_b) = run(ScenarioKind::VillagerLoop, &[]);
    assert_eq!(a, b);
    assert_eq!(lines_a, lines_b);
    assert_eq!(sink_a.records(), sink_b.records());
}

#[test]
fn json_lines_sink_receives_verdicts() {
    let path = std::env::temp_dir().join(format!("hearth-run-{}.jsonl", std::process::id()));
    let config = config_for(ScenarioKind::MovementProbe, &[]);
    let sink = JsonLinesSink::create(&path).unwrap();
    let mut harness = Harness::assemble(&config, sink).unwrap();
    let outcome = harness.run(config.tick.max_ticks);
    assert_eq!(outcome.exit_code, 0);
    drop(harness);

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<TelemetryRecord> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].loop_id, "movement");
    std::fs::remove_file(&path).ok();
}
