//! World-level singletons.
//!
//! These are the shared records that are not attached to any entity: the
//! settlement's direct building references, the building registry, the
//! active combat duel, the telemetry append buffer, the verdict log, the exit
//! request slot and the per-run context that replaces process globals.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use hearth_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::BuildingKind;
use crate::movement::xz_distance_sq;

// ---------------------------------------------------------------------------
// Settlement and registry
// ---------------------------------------------------------------------------

/// Direct per-kind building references maintained by the settlement runtime.
#[derive(Debug, Clone, Default)]
pub struct Settlement {
    buildings: BTreeMap<BuildingKind, EntityId>,
}

impl Settlement {
    pub fn assign(&mut self, kind: BuildingKind, entity: EntityId) {
        self.buildings.insert(kind, entity);
    }

    pub fn building(&self, kind: BuildingKind) -> Option<EntityId> {
        self.buildings.get(&kind).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisteredBuilding {
    pub entity: EntityId,
    pub kind: BuildingKind,
    pub position: Vec3,
}

/// Flat list of known buildings, searched by distance.
#[derive(Debug, Clone, Default)]
pub struct BuildingRegistry {
    entries: Vec<RegisteredBuilding>,
}

impl BuildingRegistry {
    pub fn register(&mut self, entity: EntityId, kind: BuildingKind, position: Vec3) {
        self.entries.retain(|b| b.entity != entity);
        self.entries.push(RegisteredBuilding {
            entity,
            kind,
            position,
        });
    }

    pub fn entries(&self) -> &[RegisteredBuilding] {
        &self.entries
    }

    /// Nearest registered building of `kind` accepted by `alive`.
    pub fn nearest(
        &self,
        kind: BuildingKind,
        from: Vec3,
        alive: impl Fn(EntityId) -> bool,
    ) -> Option<EntityId> {
        self.entries
            .iter()
            .filter(|b| b.kind == kind && alive(b.entity))
            .min_by(|a, b| {
                xz_distance_sq(from, a.position).total_cmp(&xz_distance_sq(from, b.position))
            })
            .map(|b| b.entity)
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// The auto-selected pair of combatants and how their fight is going.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatDuel {
    pub attacker: EntityId,
    pub defender: EntityId,
    pub engaged: bool,
    pub engaged_tick: Option<u32>,
    pub resolved: bool,
    pub defeated: Option<EntityId>,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// One structured verdict or event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub loop_id: String,
    pub tick: u32,
    pub pass: bool,
    pub observed_value: f32,
    pub expected_rule: String,
    pub timeout_ticks: u32,
    pub step: String,
}

/// Append buffer drained by the export stage.
#[derive(Debug, Clone, Default)]
pub struct TelemetryBuffer {
    pending: Vec<TelemetryRecord>,
    appended: u64,
}

impl TelemetryBuffer {
    pub fn append(&mut self, record: TelemetryRecord) {
        self.appended += 1;
        self.pending.push(record);
    }

    pub fn pending(&self) -> &[TelemetryRecord] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<TelemetryRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Records appended over the whole run, drained or not.
    pub fn appended_total(&self) -> u64 {
        self.appended
    }
}

/// Verdict, bank and audit lines in emission order.
///
/// Every line is also forwarded to `tracing` at info level.
#[derive(Debug, Clone, Default)]
pub struct ProofLog {
    lines: Vec<String>,
}

impl ProofLog {
    pub fn push(&mut self, line: String) {
        info!(target: "hearth::proof", "{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.lines.iter().filter(|l| l.starts_with(prefix)).count()
    }
}

// ---------------------------------------------------------------------------
// Exit request
// ---------------------------------------------------------------------------

/// The single pending process-exit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRequest {
    pub exit_code: i32,
    pub requested_tick: u32,
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// Per-run bookkeeping with the lifetime of one scenario run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub scenario_name: String,
    pub scenario_start_tick: u32,
    warned: BTreeSet<String>,
}

impl RunContext {
    pub fn start(&mut self, scenario_name: &str, tick: u32) {
        self.scenario_name = scenario_name.to_owned();
        self.scenario_start_tick = tick;
        self.warned.clear();
    }

    /// True the first time `key` is seen this run.
    pub fn first_time(&mut self, key: &str) -> bool {
        self.warned.insert(key.to_owned())
    }

    pub fn scenario_tick(&self, tick: u32) -> u32 {
        tick.saturating_sub(self.scenario_start_tick)
    }
}
