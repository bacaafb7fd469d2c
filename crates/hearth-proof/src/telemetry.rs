//! Telemetry emission and export.
//!
//! Observers append [`TelemetryRecord`]s to the world's buffer through
//! [`emit`]. The [`TelemetryExportSystem`] drains the buffer into a
//! [`TelemetrySink`] during the export stage, which always runs before the
//! exit stage.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use hearth_ecs::command::CommandBuffer;
use hearth_sim::resources::TelemetryRecord;
use hearth_sim::tick::System;
use hearth_sim::world::World;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("telemetry record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fields of one record, minus the tick the helper fills in.
#[derive(Debug, Clone)]
pub struct Emit<'a> {
    pub loop_id: &'a str,
    pub pass: bool,
    pub observed_value: f32,
    pub expected_rule: &'a str,
    pub timeout_ticks: u32,
    pub step: &'a str,
}

/// Append one record stamped with the current tick.
pub fn emit(world: &mut World, record: Emit<'_>) {
    let tick = world.clock().tick;
    world.telemetry.append(TelemetryRecord {
        loop_id: record.loop_id.to_owned(),
        tick,
        pass: record.pass,
        observed_value: record.observed_value,
        expected_rule: record.expected_rule.to_owned(),
        timeout_ticks: record.timeout_ticks,
        step: record.step.to_owned(),
    });
}

/// Write a `BANK:` marker line to the proof log.
pub fn bank_marker(
    world: &mut World,
    test_id: &str,
    pass: bool,
    reason: Option<&str>,
    delta: i32,
) {
    let tick = world.clock().tick;
    let scenario_tick = world.run.scenario_tick(tick);
    let line = if pass {
        format!("BANK:{test_id}:PASS tickTime={tick} scenarioTick={scenario_tick} delta={delta}")
    } else {
        format!(
            "BANK:{test_id}:FAIL reason={} tickTime={tick} scenarioTick={scenario_tick} delta={delta}",
            reason.unwrap_or("unknown")
        )
    };
    world.proof_log.push(line);
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

pub trait TelemetrySink {
    fn write(&mut self, records: &[TelemetryRecord]) -> Result<(), TelemetryError>;

    fn flush(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TelemetrySink for MemorySink {
    fn write(&mut self, records: &[TelemetryRecord]) -> Result<(), TelemetryError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesSink {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| TelemetryError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    fn io(&self, source: std::io::Error) -> TelemetryError {
        TelemetryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TelemetrySink for JsonLinesSink {
    fn write(&mut self, records: &[TelemetryRecord]) -> Result<(), TelemetryError> {
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(self.out, "{line}").map_err(|e| self.io(e))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.out.flush().map_err(|e| self.io(e))
    }
}

// ---------------------------------------------------------------------------
// Export system
// ---------------------------------------------------------------------------

pub struct TelemetryExportSystem {
    sink: Box<dyn TelemetrySink>,
    exported: u64,
    failures: u64,
}

impl TelemetryExportSystem {
    pub fn new(sink: impl TelemetrySink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            exported: 0,
            failures: 0,
        }
    }

    pub fn exported(&self) -> u64 {
        self.exported
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl System for TelemetryExportSystem {
    fn name(&self) -> &str {
        "telemetry_export"
    }

    /// Runs in every clock mode so that nothing recorded is left behind.
    ///
    /// Records stay buffered when the write fails and are retried on the
    /// next tick. Once written they are drained even if the flush fails,
    /// since the sink already holds them.
    fn run(&mut self, world: &mut World, _cmds: &mut CommandBuffer<World>) {
        let count = world.telemetry.pending().len();
        if count == 0 {
            return;
        }
        if let Err(err) = self.sink.write(world.telemetry.pending()) {
            self.failures += 1;
            warn!(count, "telemetry write failed, records kept for retry: {err}");
            return;
        }
        world.telemetry.drain();
        self.exported += count as u64;
        match self.sink.flush() {
            Ok(()) => debug!(count, "telemetry exported"),
            Err(err) => {
                self.failures += 1;
                warn!(count, "telemetry flush failed: {err}");
            }
        }
    }
}
