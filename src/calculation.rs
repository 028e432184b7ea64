// Calculation boundary - the external program behind an async trait

//! # Calculation Boundary
//!
//! The external quantum-chemistry program is an opaque collaborator: it
//! takes structured parameters, a geometry and static resource limits, runs
//! for up to days, and eventually produces a parsed output record or one of
//! a fixed set of failure codes. This module defines that boundary.
//!
//! ## Async Design
//!
//! `submit` is async and resolves only when the external run has terminated.
//! That await is the restart engine's **only** suspension point, so one
//! in-flight calculation occupies a suspended task rather than a pinned
//! thread, and many can be in flight at once.
//!
//! ## Scripted Implementation
//!
//! [`ScriptedCalculation`] is the in-memory implementation used by tests and
//! development. It replays pre-programmed outcome queues (optionally keyed
//! by theory-level label, so fan-out siblings can be scripted independently)
//! and records every submission it receives for later assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::models::{ExitStatus, OutputRecord, ParameterRecord, StructureSnapshot};
use crate::Result;

/// Handle naming an installed external program
///
/// Analogous to a scheduler "code" entry: it identifies which executable a
/// submission should run on, without this crate knowing how it is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCode {
    /// Label of the installed program, e.g. "g16@cluster"
    pub label: String,
}

impl ExecutionCode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Static per-attempt resource limits
///
/// These are configuration constants, fixed when a submission is built and
/// never renegotiated across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Number of machines allocated to the run
    pub num_machines: u32,

    /// Total number of parallel workers across those machines
    pub num_mpiprocs: u32,

    /// Memory ceiling in kB
    pub max_memory_kb: u64,

    /// Wall-clock ceiling in seconds
    pub max_wallclock_seconds: u64,
}

impl Default for ResourceSpec {
    /// The workload's standard allocation: one machine, four workers, a
    /// 3.2 GB memory request padded by 25%, and a seven-day wall clock.
    fn default() -> Self {
        Self {
            num_machines: 1,
            num_mpiprocs: 4,
            max_memory_kb: (3200 * 5 / 4) * 1024, // int(3200 * 1.25) * 1024
            max_wallclock_seconds: 604_800,       // 7 days
        }
    }
}

/// Provenance tags carried on each submission
///
/// These never influence execution; they identify what a run was *for* so
/// results can be traced back (and so the scripted implementation can key
/// its outcome queues).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    /// Name of the molecule this run belongs to
    pub molecule_name: String,

    /// Theory-level label, e.g. "implicit_solvation"
    pub theory_level: String,
}

/// One attempt's full set of inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSubmission {
    /// Run configuration for the external program
    pub parameters: ParameterRecord,

    /// Geometry to start from
    pub structure: StructureSnapshot,

    /// Which installed program to run
    pub code: ExecutionCode,

    /// Static resource limits for this attempt
    pub resources: ResourceSpec,

    /// Provenance tags
    pub metadata: SubmissionMetadata,
}

/// What came back from one completed external run
///
/// A failed run may still carry a parsed output record - the structural
/// correction handler depends on reading the failed attempt's last computed
/// geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    /// How the run terminated
    pub status: ExitStatus,

    /// Whatever the parser extracted, present on success and sometimes on
    /// failure
    pub output: Option<OutputRecord>,
}

impl CalculationOutcome {
    /// A normally-terminated run with its parsed output
    pub fn success(output: OutputRecord) -> Self {
        Self {
            status: ExitStatus::Success,
            output: Some(output),
        }
    }

    /// A failed run that produced no usable output
    pub fn failed(code: crate::models::FailureCode) -> Self {
        Self {
            status: ExitStatus::Failed(code),
            output: None,
        }
    }

    /// A failed run whose output was still parsable
    pub fn failed_with_output(code: crate::models::FailureCode, output: OutputRecord) -> Self {
        Self {
            status: ExitStatus::Failed(code),
            output: Some(output),
        }
    }
}

/// Async boundary to the external program
///
/// Implementations submit the inputs to whatever actually runs the
/// calculation (a scheduler, a local process, a script) and resolve once it
/// has terminated. Infrastructure failures (as opposed to calculation
/// failures, which are [`ExitStatus::Failed`] outcomes) surface as errors.
#[async_trait::async_trait]
pub trait Calculation: Send + Sync {
    /// Run one attempt to completion
    async fn submit(&self, submission: CalculationSubmission) -> Result<CalculationOutcome>;
}

/// In-memory scripted calculation for development and testing
///
/// Outcomes are replayed from queues: `script_for` targets submissions with
/// a specific theory-level label, `script` feeds everything else. Every
/// submission is recorded and can be inspected afterwards, which is how
/// tests assert that a retry actually carried a corrected geometry.
///
/// ## Limitations
///
/// - **Not a scheduler**: resolves immediately, resource limits are ignored
/// - **Finite scripts**: an exhausted queue is an infrastructure error
#[derive(Default)]
pub struct ScriptedCalculation {
    /// Outcome queues keyed by theory-level label
    scripts: Mutex<HashMap<String, VecDeque<CalculationOutcome>>>,

    /// Outcome queue for submissions without a dedicated script
    fallback: Mutex<VecDeque<CalculationOutcome>>,

    /// Every submission received, in arrival order
    submissions: Mutex<Vec<CalculationSubmission>>,
}

impl ScriptedCalculation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for any submission without a dedicated script
    pub fn script(&self, outcome: CalculationOutcome) {
        self.fallback.lock().unwrap().push_back(outcome);
    }

    /// Queue an outcome for submissions tagged with this theory level
    pub fn script_for(&self, theory_level: &str, outcome: CalculationOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(theory_level.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Every submission received so far, in arrival order
    pub fn submissions(&self) -> Vec<CalculationSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Calculation for ScriptedCalculation {
    async fn submit(&self, submission: CalculationSubmission) -> Result<CalculationOutcome> {
        let theory_level = submission.metadata.theory_level.clone();
        self.submissions.lock().unwrap().push(submission);

        // A dedicated script for this theory level wins over the fallback
        if let Some(queue) = self.scripts.lock().unwrap().get_mut(&theory_level) {
            return queue.pop_front().ok_or_else(|| {
                anyhow!("scripted outcomes exhausted for theory level '{theory_level}'").into()
            });
        }

        self.fallback
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted outcomes exhausted").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureCode;
    use std::collections::HashMap as StdHashMap;

    fn submission(theory_level: &str) -> CalculationSubmission {
        CalculationSubmission {
            parameters: ParameterRecord::new("B3LYP", "6-31G(d)"),
            structure: StructureSnapshot::Text("O  0.0  0.0  0.0".to_string()),
            code: ExecutionCode::new("g16@localhost"),
            resources: ResourceSpec::default(),
            metadata: SubmissionMetadata {
                molecule_name: "water1".to_string(),
                theory_level: theory_level.to_string(),
            },
        }
    }

    fn output(free_energy: f64) -> OutputRecord {
        OutputRecord {
            symbols: vec!["O".to_string()],
            coordinate_frames: vec![vec![[0.0, 0.0, 0.0]]],
            free_energy,
            extra: StdHashMap::new(),
        }
    }

    #[test]
    fn test_default_resources_match_workload_constants() {
        let resources = ResourceSpec::default();
        assert_eq!(resources.num_machines, 1);
        assert_eq!(resources.num_mpiprocs, 4);
        assert_eq!(resources.max_memory_kb, 4_096_000);
        assert_eq!(resources.max_wallclock_seconds, 604_800);
    }

    #[tokio::test]
    async fn test_scripted_outcomes_replay_in_order() {
        let calculation = ScriptedCalculation::new();
        calculation.script(CalculationOutcome::failed(FailureCode::ErrorTermination));
        calculation.script(CalculationOutcome::success(output(-76.0)));

        let first = calculation.submit(submission("diffuse_functional")).await.unwrap();
        assert_eq!(first.status, ExitStatus::Failed(FailureCode::ErrorTermination));

        let second = calculation.submit(submission("diffuse_functional")).await.unwrap();
        assert_eq!(second.status, ExitStatus::Success);
    }

    #[tokio::test]
    async fn test_theory_level_scripts_take_precedence() {
        let calculation = ScriptedCalculation::new();
        calculation.script(CalculationOutcome::success(output(-1.0)));
        calculation.script_for(
            "implicit_solvation",
            CalculationOutcome::success(output(-2.0)),
        );

        let keyed = calculation.submit(submission("implicit_solvation")).await.unwrap();
        assert_eq!(keyed.output.unwrap().free_energy, -2.0);

        let fallback = calculation.submit(submission("diffuse_functional")).await.unwrap();
        assert_eq!(fallback.output.unwrap().free_energy, -1.0);
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let calculation = ScriptedCalculation::new();
        let result = calculation.submit(submission("diffuse_functional")).await;
        assert!(result.is_err());
        assert_eq!(calculation.submissions().len(), 1);
    }
}
