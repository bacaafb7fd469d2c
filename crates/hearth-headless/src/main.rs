//! Runs one scenario headless and exits with its verdict code.
//!
//! ```text
//! HEARTH_SCENARIO=scenarios/combat_duel.json hearth-headless
//! ```
//!
//! Exit codes: 0 pass, 1 scenario missing or run error, 2 fatal audit,
//! 3 audit warning or gather failure, 4 generic proof failure,
//! 5 combat/build failure, 6 repetition failure.

use anyhow::Context;
use hearth_proof::harness::Harness;
use hearth_proof::telemetry::{JsonLinesSink, MemorySink};
use hearth_sim::config::{HarnessConfig, ProcessEnv};
use hearth_sim::SimError;
use tracing::{error, info};

const EXIT_SCENARIO_ERROR: i32 = 1;

fn run(config: &HarnessConfig) -> anyhow::Result<i32> {
    let mut harness = match &config.telemetry_path {
        Some(path) => {
            let sink = JsonLinesSink::create(path)
                .with_context(|| format!("opening telemetry file {}", path.display()))?;
            Harness::assemble(config, sink)?
        }
        None => Harness::assemble(config, MemorySink::new())?,
    };
    let outcome = harness.run(config.tick.max_ticks);
    Ok(outcome.exit_code)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = HarnessConfig::from_env(&ProcessEnv);
    info!(
        scenario = %config.scenario_path,
        max_ticks = config.tick.max_ticks,
        fixed_dt = config.tick.fixed_dt,
        "starting headless run"
    );

    let code = match run(&config) {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<SimError>() {
                Some(SimError::UnknownScenario { path }) => {
                    error!(%path, "scenario not found");
                }
                _ => error!("run failed: {err:#}"),
            }
            EXIT_SCENARIO_ERROR
        }
    };
    info!(exit_code = code, "headless run complete");
    std::process::exit(code);
}
