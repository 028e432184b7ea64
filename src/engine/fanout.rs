// Fan-out engine - three parameter variants, one keyed aggregate

//! # Fan-Out Engine
//!
//! [`FanOutEngine`] answers one question about a molecule: what do diffuse
//! functions, implicit solvation, and both together do to its optimized
//! geometry and free energy? It derives the three parameter variants from a
//! shared base configuration, runs an independent [`RestartEngine`] per
//! variant concurrently, joins all three, and merges their outputs with a
//! caller-supplied baseline into three keyed maps.
//!
//! ## Determinism
//!
//! The three runs share no mutable state and may complete in any order; the
//! merge is keyed by variant name, not arrival order, so the aggregate is
//! identical regardless of scheduling. Each map holds exactly four entries:
//! `"<molecule>_diffuse"`, `"<molecule>_implicit"`, `"<molecule>_hybrid"`,
//! and `"original"` (the baseline, copied verbatim for direct before/after
//! comparison).
//!
//! ## Failure Semantics
//!
//! Any sibling ending in a terminal failure fails the whole run; partial
//! results are discarded rather than partially reported. By default the
//! first failure also cancels the still-running siblings (their futures are
//! dropped at the join); set `cancel_siblings_on_failure(false)` to let all
//! three run to completion before the error propagates.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calculation::{
    Calculation, CalculationSubmission, ExecutionCode, ResourceSpec, SubmissionMetadata,
};
use crate::models::{OutputRecord, ParameterRecord, StructureSnapshot};
use crate::transforms;
use crate::Result;

use super::handlers::HandlerRegistry;
use super::restart::RestartEngine;

/// Default iteration budget for each variant's restart loop
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Solvent used when the caller does not name one
pub const DEFAULT_SOLVENT: &str = "water";

/// The three parameter variants derived from one base configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    /// Diffuse functions via a general basis
    Diffuse,

    /// Implicit solvation (IEFPCM)
    Implicit,

    /// Both at once
    Hybrid,
}

impl Variant {
    /// All variants, in the order they appear in the aggregate
    pub const ALL: [Variant; 3] = [Variant::Diffuse, Variant::Implicit, Variant::Hybrid];

    /// Short label used in aggregate keys (`"<molecule>_<label>"`)
    pub fn label(&self) -> &'static str {
        match self {
            Variant::Diffuse => "diffuse",
            Variant::Implicit => "implicit",
            Variant::Hybrid => "hybrid",
        }
    }

    /// Theory-level provenance tag carried on the submission
    pub fn theory_level(&self) -> &'static str {
        match self {
            Variant::Diffuse => "diffuse_functional",
            Variant::Implicit => "implicit_solvation",
            Variant::Hybrid => "diffuse_functional_and_implicit_solvation",
        }
    }
}

/// Everything the fan-out needs for one molecule
#[derive(Debug, Clone)]
pub struct FanOutInputs {
    /// Base run configuration the three variants are derived from
    pub base_parameters: ParameterRecord,

    /// Starting geometry shared by all three variants
    pub input_structure: StructureSnapshot,

    /// Molecule name, used as the key prefix in the aggregate
    pub molecule_name: String,

    /// Baseline output (no diffuse functions, no solvation) for comparison
    pub original_output: OutputRecord,

    /// Which installed program to run
    pub code: ExecutionCode,

    /// Free-form general-basis text requesting diffuse functions
    pub diffuse_basis: String,

    /// Solvent for the implicit-solvation variants; [`DEFAULT_SOLVENT`]
    /// when `None`
    pub solvent: Option<String>,
}

/// The three keyed result maps
///
/// Built once when all variants have finished; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Free energy per variant key, plus `"original"`
    pub free_energy: HashMap<String, f64>,

    /// Rendered geometry text per variant key, plus `"original"`
    pub geometry: HashMap<String, String>,

    /// Full output record per variant key, plus `"original"`
    pub output_records: HashMap<String, OutputRecord>,
}

/// Runs the three-variant fan-out and aggregates the results
pub struct FanOutEngine {
    /// The external collaborator shared (immutably) by all variants
    calculation: Arc<dyn Calculation>,

    /// Handler policy for every variant's restart loop
    handlers: Arc<HandlerRegistry>,

    /// Iteration budget per variant
    max_iterations: u32,

    /// Drop still-running siblings once one variant fails terminally
    cancel_siblings_on_failure: bool,
}

impl FanOutEngine {
    /// Create a fan-out engine with the default Gaussian handler policy
    pub fn new(calculation: Arc<dyn Calculation>) -> Self {
        Self::with_handlers(calculation, Arc::new(HandlerRegistry::gaussian_defaults()))
    }

    /// Create a fan-out engine with an explicit handler registry
    pub fn with_handlers(calculation: Arc<dyn Calculation>, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            calculation,
            handlers,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel_siblings_on_failure: true,
        }
    }

    /// Set the per-variant iteration budget
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Choose whether a sibling failure cancels the other variants
    pub fn cancel_siblings_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_siblings_on_failure = cancel;
        self
    }

    /// Run all three variants and merge the results with the baseline
    pub async fn run(&self, inputs: FanOutInputs) -> Result<AggregateResult> {
        let solvent = inputs
            .solvent
            .clone()
            .unwrap_or_else(|| DEFAULT_SOLVENT.to_string());

        info!(
            molecule = %inputs.molecule_name,
            solvent = %solvent,
            "launching diffuse/implicit/hybrid fan-out"
        );

        let engine = RestartEngine::new(self.calculation.clone(), self.handlers.clone());
        let diffuse = engine.run(
            self.submission(&inputs, Variant::Diffuse, &solvent),
            self.max_iterations,
        );
        let implicit = engine.run(
            self.submission(&inputs, Variant::Implicit, &solvent),
            self.max_iterations,
        );
        let hybrid = engine.run(
            self.submission(&inputs, Variant::Hybrid, &solvent),
            self.max_iterations,
        );

        // Join barrier: the merge never starts before all three are done.
        // With cancellation enabled the first terminal failure returns
        // immediately and the sibling futures are dropped mid-flight.
        let (diffuse, implicit, hybrid) = if self.cancel_siblings_on_failure {
            futures::try_join!(diffuse, implicit, hybrid)?
        } else {
            let (diffuse, implicit, hybrid) = futures::join!(diffuse, implicit, hybrid);
            (diffuse?, implicit?, hybrid?)
        };

        self.merge(inputs, [diffuse, implicit, hybrid])
    }

    /// Build one variant's submission from the shared base configuration
    fn submission(
        &self,
        inputs: &FanOutInputs,
        variant: Variant,
        solvent: &str,
    ) -> CalculationSubmission {
        let parameters = match variant {
            Variant::Diffuse => {
                transforms::with_diffuse_basis(&inputs.base_parameters, &inputs.diffuse_basis)
            }
            Variant::Implicit => {
                transforms::with_implicit_solvent(&inputs.base_parameters, solvent)
            }
            Variant::Hybrid => transforms::with_diffuse_and_solvent(
                &inputs.base_parameters,
                &inputs.diffuse_basis,
                solvent,
            ),
        };

        CalculationSubmission {
            parameters,
            structure: inputs.input_structure.clone(),
            code: inputs.code.clone(),
            resources: ResourceSpec::default(),
            metadata: SubmissionMetadata {
                molecule_name: inputs.molecule_name.clone(),
                theory_level: variant.theory_level().to_string(),
            },
        }
    }

    /// Deterministic keyed merge of the three outputs plus the baseline
    fn merge(&self, inputs: FanOutInputs, outputs: [OutputRecord; 3]) -> Result<AggregateResult> {
        let mut free_energy = HashMap::new();
        let mut geometry = HashMap::new();
        let mut output_records = HashMap::new();

        for (variant, output) in Variant::ALL.into_iter().zip(outputs) {
            let key = format!("{}_{}", inputs.molecule_name, variant.label());
            free_energy.insert(key.clone(), output.free_energy);
            geometry.insert(
                key.clone(),
                StructureSnapshot::from_last_frame(&output)?.to_input_text(),
            );
            output_records.insert(key, output);
        }

        // The baseline entry is copied verbatim - no re-derivation, so a
        // caller can diff before/after directly
        free_energy.insert("original".to_string(), inputs.original_output.free_energy);
        geometry.insert("original".to_string(), inputs.input_structure.to_input_text());
        output_records.insert("original".to_string(), inputs.original_output);

        info!(molecule = %inputs.molecule_name, "fan-out aggregate assembled");
        Ok(AggregateResult {
            free_energy,
            geometry,
            output_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::{CalculationOutcome, ScriptedCalculation};
    use crate::models::{FailureCode, GENERAL_BASIS};
    use crate::WorkchainError;
    use std::collections::HashMap as StdHashMap;

    // Opt-in log output for debugging test runs: RUST_LOG=workchain=debug
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn output(free_energy: f64) -> OutputRecord {
        OutputRecord {
            symbols: vec!["O".to_string(), "H".to_string()],
            coordinate_frames: vec![vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.96]]],
            free_energy,
            extra: StdHashMap::new(),
        }
    }

    fn inputs() -> FanOutInputs {
        FanOutInputs {
            base_parameters: ParameterRecord::new("B3LYP", "6-31G(d)"),
            input_structure: StructureSnapshot::Text(
                "O  0.000000    0.000000    0.000000".to_string(),
            ),
            molecule_name: "water1".to_string(),
            original_output: output(-76.00),
            code: ExecutionCode::new("g16@localhost"),
            diffuse_basis: "6-31+G(d)".to_string(),
            solvent: None,
        }
    }

    fn scripted_success() -> Arc<ScriptedCalculation> {
        let calculation = Arc::new(ScriptedCalculation::new());
        calculation.script_for(
            "diffuse_functional",
            CalculationOutcome::success(output(-76.01)),
        );
        calculation.script_for(
            "implicit_solvation",
            CalculationOutcome::success(output(-76.02)),
        );
        calculation.script_for(
            "diffuse_functional_and_implicit_solvation",
            CalculationOutcome::success(output(-76.03)),
        );
        calculation
    }

    #[tokio::test]
    async fn test_aggregate_keying() {
        init_tracing();
        let result = FanOutEngine::new(scripted_success())
            .run(inputs())
            .await
            .unwrap();

        // Exactly four entries per map, keyed by name_variant plus original
        assert_eq!(result.free_energy.len(), 4);
        assert_eq!(result.free_energy["water1_diffuse"], -76.01);
        assert_eq!(result.free_energy["water1_implicit"], -76.02);
        assert_eq!(result.free_energy["water1_hybrid"], -76.03);
        assert_eq!(result.free_energy["original"], -76.00);

        assert_eq!(result.geometry.len(), 4);
        assert_eq!(result.output_records.len(), 4);
    }

    #[tokio::test]
    async fn test_baseline_passes_through_verbatim() {
        let result = FanOutEngine::new(scripted_success())
            .run(inputs())
            .await
            .unwrap();

        // The original geometry is the caller's text, not re-rendered
        assert_eq!(
            result.geometry["original"],
            "O  0.000000    0.000000    0.000000"
        );
        assert_eq!(result.output_records["original"], output(-76.00));
        // Computed geometries come from each variant's final frame
        assert_eq!(
            result.geometry["water1_diffuse"],
            "O  0.000000    0.000000    0.000000\nH  0.000000    0.000000    0.960000"
        );
    }

    #[tokio::test]
    async fn test_variant_parameters_and_provenance() {
        let calculation = scripted_success();
        FanOutEngine::new(calculation.clone())
            .run(inputs())
            .await
            .unwrap();

        let submissions = calculation.submissions();
        assert_eq!(submissions.len(), 3);

        let by_level: StdHashMap<_, _> = submissions
            .iter()
            .map(|s| (s.metadata.theory_level.as_str(), s))
            .collect();

        // Diffuse: general basis mode, basis text in the input block
        let diffuse = by_level["diffuse_functional"];
        assert_eq!(diffuse.parameters.basis_set, GENERAL_BASIS);
        assert_eq!(diffuse.parameters.input_block.as_deref(), Some("6-31+G(d)"));
        assert!(diffuse.parameters.solvation().is_none());

        // Implicit: solvation set, defaulted solvent, base basis untouched
        let implicit = by_level["implicit_solvation"];
        assert_eq!(implicit.parameters.basis_set, "6-31G(d)");
        assert_eq!(
            implicit.parameters.solvation(),
            Some(&serde_json::json!({ "model": "iefpcm", "solvent": "water" }))
        );

        // Hybrid: both rules applied
        let hybrid = by_level["diffuse_functional_and_implicit_solvation"];
        assert_eq!(hybrid.parameters.basis_set, GENERAL_BASIS);
        assert!(hybrid.parameters.solvation().is_some());

        // All three share the molecule tag and the fixed resource spec
        for submission in &submissions {
            assert_eq!(submission.metadata.molecule_name, "water1");
            assert_eq!(submission.resources, ResourceSpec::default());
        }
    }

    #[tokio::test]
    async fn test_named_solvent_reaches_both_solvated_variants() {
        let calculation = scripted_success();
        let mut fan_inputs = inputs();
        fan_inputs.solvent = Some("acetone".to_string());

        FanOutEngine::new(calculation.clone())
            .run(fan_inputs)
            .await
            .unwrap();

        for submission in calculation.submissions() {
            if submission.metadata.theory_level != "diffuse_functional" {
                assert_eq!(
                    submission.parameters.solvation(),
                    Some(&serde_json::json!({ "model": "iefpcm", "solvent": "acetone" }))
                );
            }
        }
    }

    #[tokio::test]
    async fn test_sibling_failure_discards_partial_results() {
        let calculation = Arc::new(ScriptedCalculation::new());
        calculation.script_for(
            "diffuse_functional",
            CalculationOutcome::success(output(-76.01)),
        );
        calculation.script_for(
            "implicit_solvation",
            CalculationOutcome::failed(FailureCode::UnrecoverableScfFailure),
        );
        calculation.script_for(
            "diffuse_functional_and_implicit_solvation",
            CalculationOutcome::success(output(-76.03)),
        );

        let err = FanOutEngine::new(calculation)
            .run(inputs())
            .await
            .unwrap_err();
        match err {
            WorkchainError::UnrecoverableFailure { code, .. } => assert_eq!(code, 350),
            other => panic!("expected unrecoverable failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sibling_failure_without_cancellation_still_fails_overall() {
        let calculation = Arc::new(ScriptedCalculation::new());
        calculation.script_for(
            "diffuse_functional",
            CalculationOutcome::failed(FailureCode::UnrecoverableTermination),
        );
        calculation.script_for(
            "implicit_solvation",
            CalculationOutcome::success(output(-76.02)),
        );
        calculation.script_for(
            "diffuse_functional_and_implicit_solvation",
            CalculationOutcome::success(output(-76.03)),
        );

        let err = FanOutEngine::new(calculation.clone())
            .cancel_siblings_on_failure(false)
            .run(inputs())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(399));
        // Without cancellation all three variants ran to completion
        assert_eq!(calculation.submissions().len(), 3);
    }
}
