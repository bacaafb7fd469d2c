//! Run configuration.
//!
//! Everything tunable is collected into one [`HarnessConfig`], assembled once
//! at scenario start from an [`EnvSource`] and passed by reference to every
//! system constructor. Reading the environment never fails: a missing or
//! unparsable variable falls back to the documented default.
//!
//! All variables are prefixed `HEARTH_`. Per-proof switches follow the
//! pattern `HEARTH_<NAME>_PROOF` (`1` forces on, `0` forces off, absent means
//! "activate on scenario match"), `HEARTH_<NAME>_PROOF_EXIT` and
//! `HEARTH_<NAME>_PROOF_TIMEOUT`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_PREFIX: &str = "HEARTH_";

// ---------------------------------------------------------------------------
// EnvSource
// ---------------------------------------------------------------------------

/// Where configuration values come from.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A fixed map of variables, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(BTreeMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        )
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), value.to_owned());
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

fn key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn read<T: FromStr + Copy + std::fmt::Debug>(env: &dyn EnvSource, name: &str, default: T) -> T {
    let key = key(name);
    match env.var(&key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                debug!(%key, %raw, ?default, "unparsable value, using default");
                default
            }
        },
    }
}

/// Like [`read`], but a parsed value failing `valid` also falls back.
fn read_valid<T: FromStr + Copy + std::fmt::Debug>(
    env: &dyn EnvSource,
    name: &str,
    default: T,
    valid: fn(T) -> bool,
) -> T {
    let value = read(env, name, default);
    if valid(value) {
        value
    } else {
        debug!(key = %key(name), ?value, ?default, "out-of-range value, using default");
        default
    }
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

fn nonzero_u32(v: u32) -> bool {
    v > 0
}

fn nonzero_usize(v: usize) -> bool {
    v > 0
}

/// `1/true/yes/on` or `0/false/no/off`; anything else is "unset".
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_flag(env: &dyn EnvSource, name: &str) -> Option<bool> {
    env.var(&key(name)).as_deref().and_then(parse_flag)
}

fn read_string(env: &dyn EnvSource, name: &str) -> Option<String> {
    env.var(&key(name))
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Seconds per tick.
    pub fixed_dt: f32,
    /// Hard stop for the headless runner.
    pub max_ticks: u32,
    /// Ticks between heartbeat lines; 0 disables them.
    pub heartbeat_interval: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_ticks: 6_000,
            heartbeat_interval: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherConfig {
    pub move_speed: f32,
    pub arrival_threshold: f32,
    pub harvest_seconds: f32,
    pub harvest_amount: f32,
    /// Forced advance out of `ToResource` after this many seconds.
    pub to_resource_timeout: f32,
    /// Forced advance out of `ToDepot` after this many seconds.
    pub to_depot_timeout: f32,
    pub rest_min: f32,
    pub rest_max: f32,
    /// Stored amount a lazily created depot inventory starts with.
    pub inventory_bootstrap: f32,
    /// Capacity used when a depot has no capacity of its own.
    pub default_capacity: f32,
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            arrival_threshold: 1.0,
            harvest_seconds: 2.0,
            harvest_amount: 5.0,
            to_resource_timeout: 20.0,
            to_depot_timeout: 20.0,
            rest_min: 0.5,
            rest_max: 1.5,
            inventory_bootstrap: 1.0,
            default_capacity: 500.0,
        }
    }
}

/// Urgency growth per second for each need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedRates {
    pub hunger: f32,
    pub rest: f32,
    pub faith: f32,
    pub safety: f32,
    pub social: f32,
    pub work: f32,
}

impl Default for NeedRates {
    fn default() -> Self {
        Self {
            hunger: 0.010,
            rest: 0.008,
            faith: 0.004,
            safety: 0.002,
            social: 0.006,
            work: 0.005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsConfig {
    /// Below this urgency a need is left alone.
    pub seek_threshold: f32,
    pub satisfy_rate: f32,
    /// Satisfaction never runs slower than growth times this.
    pub safety_multiplier: f32,
    pub arrival_threshold: f32,
    /// Ceiling applied to a need on arrival at its target.
    pub arrival_residual: f32,
    /// Fraction of the satisfaction rate applied while still walking.
    pub en_route_scale: f32,
    pub move_speed: f32,
    pub growth: NeedRates,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            seek_threshold: 0.5,
            satisfy_rate: 0.25,
            safety_multiplier: 1.5,
            arrival_threshold: 1.5,
            arrival_residual: 0.25,
            en_route_scale: 0.5,
            move_speed: 3.0,
            growth: NeedRates::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    pub engage_distance: f32,
    pub damage_scale: f32,
    /// Upper bound, in seconds, on how long a duel may last.
    pub resolve_seconds: f32,
    /// Ticks within which an out-of-range duel is forced into range.
    pub force_engage_ticks: u32,
    /// Health the minimum dps is derived from; `None` uses the larger max health.
    pub baseline_health: Option<f32>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            engage_distance: 2.0,
            damage_scale: 1.0,
            resolve_seconds: 8.0,
            force_engage_ticks: 30,
            baseline_health: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub move_speed: f32,
    pub arrival_threshold: f32,
    /// Work units contributed per builder per second.
    pub build_rate: f32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            arrival_threshold: 1.5,
            build_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// A claim held this long without the holder changing phase is stuck.
    pub stuck_ticket_ticks: u32,
    /// Entity ids listed per violation report.
    pub sample_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            stuck_ticket_ticks: 1_800,
            sample_limit: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Ticks after scenario start at which the window is evaluated.
    pub window_ticks: u32,
    /// Signatures kept per agent.
    pub capacity: usize,
    /// Agents with fewer signatures are not evaluated.
    pub min_samples: usize,
    pub osc_repeats: usize,
    pub short_repeats: usize,
    /// Ratio of cycling agents above which repetition is "high".
    pub fail_percent: f32,
    pub entropy_min: f32,
    pub livelock_min_stored: f32,
    pub livelock_min_transitions: f32,
    /// Carry at or below this counts as empty.
    pub carry_epsilon: f32,
    /// Flagged agents reported as telemetry records.
    pub flagged_sample_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_ticks: 900,
            capacity: 24,
            min_samples: 6,
            osc_repeats: 3,
            short_repeats: 3,
            fail_percent: 0.35,
            entropy_min: 0.9,
            livelock_min_stored: 1.0,
            livelock_min_transitions: 10.0,
            carry_epsilon: 0.01,
            flagged_sample_limit: 8,
        }
    }
}

/// Activation and exit behaviour for one proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofToggle {
    /// `Some(true)` forces the proof on, `Some(false)` off, `None` defers to
    /// the scenario match.
    pub enabled: Option<bool>,
    /// Request process exit once the verdict lands.
    pub exit_on_result: bool,
    pub timeout_ticks: u32,
}

impl ProofToggle {
    pub fn with_timeout(timeout_ticks: u32) -> Self {
        Self {
            enabled: None,
            exit_on_result: true,
            timeout_ticks,
        }
    }

    fn from_env(env: &dyn EnvSource, name: &str, default_timeout: u32) -> Self {
        Self {
            enabled: read_flag(env, &format!("{name}_PROOF")),
            exit_on_result: read_flag(env, &format!("{name}_PROOF_EXIT")).unwrap_or(true),
            timeout_ticks: read(env, &format!("{name}_PROOF_TIMEOUT"), default_timeout),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofToggles {
    pub movement: ProofToggle,
    pub gather: ProofToggle,
    pub combat: ProofToggle,
    pub needs: ProofToggle,
    pub build: ProofToggle,
    pub navpref: ProofToggle,
    pub collision: ProofToggle,
    /// Timeout here is the grace period past the detector window.
    pub repetition: ProofToggle,
}

impl Default for ProofToggles {
    fn default() -> Self {
        Self {
            movement: ProofToggle::with_timeout(600),
            gather: ProofToggle::with_timeout(1_800),
            combat: ProofToggle::with_timeout(1_200),
            needs: ProofToggle::with_timeout(2_400),
            build: ProofToggle::with_timeout(2_400),
            navpref: ProofToggle::with_timeout(300),
            collision: ProofToggle::with_timeout(900),
            repetition: ProofToggle::with_timeout(60),
        }
    }
}

/// Thresholds the individual proofs judge against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofTuning {
    pub movement_epsilon: f32,
    pub gather_min_distance: f32,
    pub needs_high_water: f32,
    pub needs_low_water: f32,
    pub collision_contact_epsilon: f32,
    pub collision_penetration_tolerance: f32,
    /// Test id used in `BANK:` marker lines.
    pub bank_test_id: String,
}

impl Default for ProofTuning {
    fn default() -> Self {
        Self {
            movement_epsilon: 0.5,
            gather_min_distance: 2.0,
            needs_high_water: 0.7,
            needs_low_water: 0.3,
            collision_contact_epsilon: 0.15,
            collision_penetration_tolerance: 0.05,
            bank_test_id: "P0.VILLAGER_LOOP".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// HarnessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Scenario path or name; proofs activate on its suffix.
    pub scenario_path: String,
    /// JSON-lines telemetry destination; `None` keeps records in memory.
    pub telemetry_path: Option<PathBuf>,
    pub tick: TickConfig,
    pub gather: GatherConfig,
    pub needs: NeedsConfig,
    pub combat: CombatConfig,
    pub build: BuildConfig,
    pub audit: AuditConfig,
    pub detector: DetectorConfig,
    pub proofs: ProofToggles,
    pub tuning: ProofTuning,
}

impl HarnessConfig {
    /// Assemble the config, falling back to defaults field by field.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let d = Self::default();

        let tick = TickConfig {
            fixed_dt: read_valid(env, "FIXED_DT", d.tick.fixed_dt, positive),
            max_ticks: read_valid(env, "MAX_TICKS", d.tick.max_ticks, nonzero_u32),
            heartbeat_interval: read(env, "HEARTBEAT_INTERVAL", d.tick.heartbeat_interval),
        };

        let needs = NeedsConfig {
            seek_threshold: read_valid(
                env,
                "NEEDS_SEEK_THRESHOLD",
                d.needs.seek_threshold,
                non_negative,
            ),
            satisfy_rate: read_valid(env, "NEEDS_SATISFY_RATE", d.needs.satisfy_rate, positive),
            safety_multiplier: read_valid(
                env,
                "NEEDS_SAFETY_MULTIPLIER",
                d.needs.safety_multiplier,
                positive,
            ),
            ..d.needs.clone()
        };

        let combat = CombatConfig {
            engage_distance: read_valid(
                env,
                "COMBAT_ENGAGE_DISTANCE",
                d.combat.engage_distance,
                positive,
            ),
            damage_scale: read_valid(env, "COMBAT_DAMAGE_SCALE", d.combat.damage_scale, positive),
            resolve_seconds: read_valid(
                env,
                "COMBAT_RESOLVE_SECONDS",
                d.combat.resolve_seconds,
                positive,
            ),
            ..d.combat.clone()
        };

        let dd = &d.detector;
        let detector = DetectorConfig {
            window_ticks: read_valid(env, "REPETITION_WINDOW_TICKS", dd.window_ticks, nonzero_u32),
            capacity: read(env, "REPETITION_CAPACITY", dd.capacity).max(4),
            min_samples: read(env, "REPETITION_MIN_SAMPLES", dd.min_samples),
            osc_repeats: read_valid(env, "REPETITION_OSC_REPEATS", dd.osc_repeats, nonzero_usize),
            short_repeats: read_valid(
                env,
                "REPETITION_SHORT_REPEATS",
                dd.short_repeats,
                nonzero_usize,
            ),
            fail_percent: read_valid(env, "REPETITION_FAIL_PERCENT", dd.fail_percent, non_negative),
            entropy_min: read_valid(env, "REPETITION_ENTROPY_MIN", dd.entropy_min, non_negative),
            livelock_min_stored: read_valid(
                env,
                "LIVELOCK_MIN_STORED",
                dd.livelock_min_stored,
                non_negative,
            ),
            livelock_min_transitions: read_valid(
                env,
                "LIVELOCK_MIN_TRANSITIONS",
                dd.livelock_min_transitions,
                non_negative,
            ),
            ..d.detector.clone()
        };

        let dp = &d.proofs;
        let proofs = ProofToggles {
            movement: ProofToggle::from_env(env, "MOVEMENT", dp.movement.timeout_ticks),
            gather: ProofToggle::from_env(env, "GATHER", dp.gather.timeout_ticks),
            combat: ProofToggle::from_env(env, "COMBAT", dp.combat.timeout_ticks),
            needs: ProofToggle::from_env(env, "NEEDS", dp.needs.timeout_ticks),
            build: ProofToggle::from_env(env, "BUILD", dp.build.timeout_ticks),
            navpref: ProofToggle::from_env(env, "NAVPREF", dp.navpref.timeout_ticks),
            collision: ProofToggle::from_env(env, "COLLISION", dp.collision.timeout_ticks),
            repetition: ProofToggle::from_env(env, "REPETITION", dp.repetition.timeout_ticks),
        };

        let tuning = ProofTuning {
            bank_test_id: read_string(env, "BANK_TEST_ID")
                .unwrap_or_else(|| d.tuning.bank_test_id.clone()),
            ..d.tuning.clone()
        };

        Self {
            scenario_path: read_string(env, "SCENARIO").unwrap_or_default(),
            telemetry_path: read_string(env, "TELEMETRY_PATH").map(PathBuf::from),
            tick,
            needs,
            combat,
            detector,
            proofs,
            tuning,
            ..d
        }
    }

    /// Whether the configured scenario path ends with any of `suffixes`.
    pub fn scenario_matches(&self, suffixes: &[&str]) -> bool {
        let path = self.scenario_path.to_ascii_lowercase();
        suffixes.iter().any(|s| path.ends_with(&s.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_env_yields_defaults() {
        let config = HarnessConfig::from_env(&MapEnv::new());
        assert_eq!(config.detector.capacity, 24);
        assert_eq!(config.proofs.combat.timeout_ticks, 1_200);
        assert!(config.proofs.combat.enabled.is_none());
        assert!(config.proofs.combat.exit_on_result);
        assert!(config.telemetry_path.is_none());
    }

    #[test]
    fn unparsable_values_fall_back_silently() {
        let env = MapEnv::from_pairs([
            ("HEARTH_COMBAT_DAMAGE_SCALE", "lots"),
            ("HEARTH_REPETITION_OSC_REPEATS", "-3"),
            ("HEARTH_NEEDS_PROOF", "maybe"),
        ]);
        let config = HarnessConfig::from_env(&env);
        assert_eq!(config.combat.damage_scale, 1.0);
        assert_eq!(config.detector.osc_repeats, 3);
        assert_eq!(config.proofs.needs.enabled, None);
    }

    #[test]
    fn out_of_range_values_fall_back() {
        let d = HarnessConfig::default();
        for raw in ["0", "-1", "NaN", "inf"] {
            let env = MapEnv::from_pairs([
                ("HEARTH_FIXED_DT", raw),
                ("HEARTH_NEEDS_SATISFY_RATE", raw),
                ("HEARTH_COMBAT_RESOLVE_SECONDS", raw),
            ]);
            let config = HarnessConfig::from_env(&env);
            assert_eq!(config.tick.fixed_dt, d.tick.fixed_dt, "{raw}");
            assert_eq!(config.needs.satisfy_rate, d.needs.satisfy_rate, "{raw}");
            assert_eq!(config.combat.resolve_seconds, d.combat.resolve_seconds, "{raw}");
        }
        let env = MapEnv::from_pairs([
            ("HEARTH_MAX_TICKS", "0"),
            ("HEARTH_REPETITION_WINDOW_TICKS", "0"),
            ("HEARTH_REPETITION_SHORT_REPEATS", "0"),
            ("HEARTH_LIVELOCK_MIN_STORED", "-2"),
        ]);
        let config = HarnessConfig::from_env(&env);
        assert_eq!(config.tick.max_ticks, d.tick.max_ticks);
        assert_eq!(config.detector.window_ticks, d.detector.window_ticks);
        assert_eq!(config.detector.short_repeats, d.detector.short_repeats);
        assert_eq!(config.detector.livelock_min_stored, d.detector.livelock_min_stored);

        let zero_ok = MapEnv::from_pairs([("HEARTH_LIVELOCK_MIN_TRANSITIONS", "0")]);
        assert_eq!(HarnessConfig::from_env(&zero_ok).detector.livelock_min_transitions, 0.0);
    }

    #[test]
    fn env_overrides_are_applied() {
        let env = MapEnv::from_pairs([
            ("HEARTH_SCENARIO", " scenarios/combat_duel.json "),
            ("HEARTH_COMBAT_PROOF", "1"),
            ("HEARTH_COMBAT_PROOF_EXIT", "0"),
            ("HEARTH_COMBAT_PROOF_TIMEOUT", "77"),
            ("HEARTH_REPETITION_FAIL_PERCENT", "0.5"),
            ("HEARTH_BANK_TEST_ID", "P1.LOOP"),
        ]);
        let config = HarnessConfig::from_env(&env);
        assert_eq!(config.scenario_path, "scenarios/combat_duel.json");
        assert_eq!(config.proofs.combat.enabled, Some(true));
        assert!(!config.proofs.combat.exit_on_result);
        assert_eq!(config.proofs.combat.timeout_ticks, 77);
        assert_eq!(config.detector.fail_percent, 0.5);
        assert_eq!(config.tuning.bank_test_id, "P1.LOOP");
    }

    #[test]
    fn scenario_suffix_match_is_case_insensitive() {
        let config = HarnessConfig {
            scenario_path: "Assets/Scenarios/Villager_Loop.JSON".to_owned(),
            ..Default::default()
        };
        assert!(config.scenario_matches(&["villager_loop.json"]));
        assert!(!config.scenario_matches(&["combat_duel.json"]));
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}
