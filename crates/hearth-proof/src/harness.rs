//! Assembles a complete headless run.
//!
//! Stage layout:
//!
//! | Stage    | Systems                                             |
//! |----------|-----------------------------------------------------|
//! | Gameplay | combat, goal selection, needs, gather, construction, probes |
//! | Observe  | every proof, audit, heartbeat                       |
//! | Export   | telemetry export                                    |
//! | Exit     | exit                                                |

use hearth_sim::config::HarnessConfig;
use hearth_sim::scenario::{self, ScenarioKind};
use hearth_sim::systems::register_gameplay;
use hearth_sim::tick::{Stage, TickLoop};
use hearth_sim::world::World;
use hearth_sim::SimError;
use tracing::info;

use crate::audit::{AuditHandle, AuditSummary, AuditSystem};
use crate::exit::{ExitSystem, QuitSignal};
use crate::heartbeat::HeartbeatSystem;
use crate::proofs::register_all;
use crate::telemetry::{TelemetryExportSystem, TelemetrySink};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub scenario: ScenarioKind,
    pub ticks_run: u32,
    /// Code handed to the quit handle, if any proof asked for one.
    pub quit_code: Option<i32>,
    pub audit: AuditSummary,
    /// The process exit code.
    pub exit_code: i32,
}

/// Final exit code: a nonzero proof code wins over the audit severity.
pub fn resolve_exit_code(quit_code: Option<i32>, audit: &AuditSummary) -> i32 {
    match quit_code {
        Some(code) if code != 0 => code,
        _ => audit.severity().exit_code(),
    }
}

pub struct Harness {
    kind: ScenarioKind,
    tick_loop: TickLoop,
    quit: QuitSignal,
    audit: AuditHandle,
}

impl Harness {
    /// Populate the configured scenario and register every system.
    pub fn assemble(
        config: &HarnessConfig,
        sink: impl TelemetrySink + 'static,
    ) -> Result<Self, SimError> {
        let (kind, world) = scenario::build(config)?;
        Ok(Self::with_world(config, kind, world, sink))
    }

    /// Same as [`assemble`](Self::assemble) for an already populated world.
    pub fn with_world(
        config: &HarnessConfig,
        kind: ScenarioKind,
        world: World,
        sink: impl TelemetrySink + 'static,
    ) -> Self {
        let mut tick_loop = TickLoop::new(world);
        register_gameplay(&mut tick_loop, config);

        register_all(&mut tick_loop, config);
        let audit = AuditSystem::new(config.audit.clone());
        let handle = audit.handle();
        tick_loop.add_system(Stage::Observe, audit);
        tick_loop.add_system(
            Stage::Observe,
            HeartbeatSystem::new(config.tick.heartbeat_interval),
        );

        tick_loop.add_system(Stage::Export, TelemetryExportSystem::new(sink));

        let quit = QuitSignal::new();
        tick_loop.add_system_after(
            Stage::Exit,
            &["telemetry_export"],
            ExitSystem::new(quit.clone()),
        );

        info!(
            scenario = kind.name(),
            systems = tick_loop.system_count(),
            "harness assembled"
        );
        Self {
            kind,
            tick_loop,
            quit,
            audit: handle,
        }
    }

    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    pub fn tick_loop(&self) -> &TickLoop {
        &self.tick_loop
    }

    pub fn tick_loop_mut(&mut self) -> &mut TickLoop {
        &mut self.tick_loop
    }

    pub fn world(&self) -> &World {
        self.tick_loop.world()
    }

    pub fn quit_signal(&self) -> &QuitSignal {
        &self.quit
    }

    /// Tick until the quit signal fires or `max_ticks` have run.
    pub fn run(&mut self, max_ticks: u32) -> RunOutcome {
        let quit = self.quit.clone();
        let ticks_run = self
            .tick_loop
            .run_until(max_ticks, |_| quit.requested().is_some());
        let quit_code = quit.requested();
        let audit = self.audit.snapshot();
        let exit_code = resolve_exit_code(quit_code, &audit);
        info!(
            scenario = self.kind.name(),
            ticks_run,
            ?quit_code,
            audit_total = audit.total(),
            exit_code,
            "run finished"
        );
        RunOutcome {
            scenario: self.kind,
            ticks_run,
            quit_code,
            audit,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ViolationKind;

    #[test]
    fn proof_code_beats_audit() {
        let mut audit = AuditSummary::default();
        audit.record(ViolationKind::NegativeStored, 1);
        assert_eq!(resolve_exit_code(Some(5), &audit), 5);
        assert_eq!(resolve_exit_code(Some(0), &audit), 2);
        assert_eq!(resolve_exit_code(None, &AuditSummary::default()), 0);
    }

    #[test]
    fn exit_runs_last() {
        let config = HarnessConfig {
            scenario_path: "villager_loop".to_owned(),
            ..Default::default()
        };
        let harness = Harness::assemble(&config, crate::telemetry::MemorySink::new()).unwrap();
        let names = harness.tick_loop().system_names();
        assert_eq!(names.last(), Some(&"exit"));
        let export = names.iter().position(|n| *n == "telemetry_export");
        let first_proof = names.iter().position(|n| n.starts_with("proof:"));
        let gather = names.iter().position(|n| *n == "gather");
        assert!(gather < first_proof && first_proof < export);
    }

    #[test]
    fn zero_fixed_dt_falls_back_instead_of_panicking() {
        let env = hearth_sim::config::MapEnv::from_pairs([
            ("HEARTH_SCENARIO", "scenarios/movement_probe.json"),
            ("HEARTH_FIXED_DT", "0"),
        ]);
        let config = HarnessConfig::from_env(&env);
        let mut harness = Harness::assemble(&config, crate::telemetry::MemorySink::new()).unwrap();
        let outcome = harness.run(config.tick.max_ticks);
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let config = HarnessConfig {
            scenario_path: "scenarios/nowhere.json".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            Harness::assemble(&config, crate::telemetry::MemorySink::new()),
            Err(SimError::UnknownScenario { .. })
        ));
    }
}
