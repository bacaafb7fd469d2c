//! Hearth proof harness -- headless acceptance tests for the village
//! simulation.
//!
//! Observers run in the [`Stage::Observe`](hearth_sim::tick::Stage) stage
//! after gameplay has mutated the world:
//!
//! - [`verdict`]: the shared timeout-bounded proof shape, one verdict per run.
//! - [`proofs`]: the built-in proofs, activated by scenario or env flag.
//! - [`repetition`]: per-agent intent signatures and the livelock verdict.
//! - [`audit`]: invariant checks that feed the exit severity.
//! - [`telemetry`]: the emit helper, sinks and the export stage.
//! - [`exit`]: sticky exit requests and the latched quit.
//!
//! [`harness::Harness`] puts all of it together:
//!
//! ```
//! use hearth_proof::prelude::*;
//!
//! let config = HarnessConfig {
//!     scenario_path: "scenarios/nav_preference.json".to_owned(),
//!     ..Default::default()
//! };
//! let mut harness = Harness::assemble(&config, MemorySink::new()).unwrap();
//! let outcome = harness.run(1_000);
//! assert_eq!(outcome.exit_code, 0);
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod exit;
pub mod harness;
pub mod heartbeat;
pub mod proofs;
pub mod repetition;
pub mod telemetry;
pub mod verdict;

pub mod prelude {
    pub use crate::audit::{AuditHandle, AuditSummary, AuditSystem, Severity, ViolationKind};
    pub use crate::exit::{request_exit, ExitSystem, QuitHandle, QuitSignal};
    pub use crate::harness::{resolve_exit_code, Harness, RunOutcome};
    pub use crate::heartbeat::HeartbeatSystem;
    pub use crate::proofs::register_all;
    pub use crate::repetition::{RepetitionDetector, RepetitionProof};
    pub use crate::telemetry::{
        emit, Emit, JsonLinesSink, MemorySink, TelemetryError, TelemetryExportSystem,
        TelemetrySink,
    };
    pub use crate::verdict::{Evaluation, ProofCriteria, ProofSystem, Verdict};
    pub use hearth_sim::prelude::*;
}
