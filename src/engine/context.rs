// Engine context - the mutable state owned by one running restart loop

//! # Engine Context
//!
//! The restart loop threads its state through an explicit [`EngineContext`]
//! value owned solely by the running task: the current iteration, the
//! effective inputs (post-correction), the accumulated attempts, and the
//! finished/terminal flags. Nothing here is shared; concurrency safety in
//! the fan-out follows from this isolation, not from locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculation::{CalculationOutcome, CalculationSubmission};
use crate::models::{ExitStatus, FailureCode, OutputRecord};

use super::handlers::ContextPatch;

/// One execution of the external calculation within a restart loop
///
/// Created per iteration, immutable once the calculation has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Unique identity of this attempt, reported on budget exhaustion
    pub id: Uuid,

    /// 1-based iteration index within the restart loop
    pub iteration: u32,

    /// Exactly what was submitted for this attempt
    pub submission: CalculationSubmission,

    /// Status and (possibly partial) output of the completed run
    pub outcome: CalculationOutcome,

    /// When the attempt was submitted (UTC)
    pub started_at: DateTime<Utc>,

    /// When the attempt completed (UTC)
    pub finished_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Record a completed attempt
    pub fn new(
        iteration: u32,
        submission: CalculationSubmission,
        outcome: CalculationOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            iteration,
            submission,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// The raw exit status of this attempt
    pub fn status(&self) -> ExitStatus {
        self.outcome.status
    }

    /// The failure code, if the attempt failed
    pub fn failure_code(&self) -> Option<FailureCode> {
        self.outcome.status.failure_code()
    }

    /// Whatever output the parser produced, even for failed runs
    pub fn output(&self) -> Option<&OutputRecord> {
        self.outcome.output.as_ref()
    }
}

/// Mutable state of one restart-engine run
///
/// Owned exclusively by the engine instance that created it and destroyed
/// when the run returns.
#[derive(Debug)]
pub struct EngineContext {
    /// Number of attempts launched so far
    pub iteration: u32,

    /// Effective inputs for the next attempt, updated by handler corrections
    pub inputs: CalculationSubmission,

    /// Every attempt made during this run, in order
    pub attempts: Vec<AttemptRecord>,

    /// Set once the run has reached a terminal state
    pub is_finished: bool,

    /// Terminal failure code, if the run ended unrecoverably
    pub terminal_code: Option<FailureCode>,
}

impl EngineContext {
    /// Set up a fresh context from the caller's initial inputs
    pub fn new(initial_inputs: CalculationSubmission) -> Self {
        Self {
            iteration: 0,
            inputs: initial_inputs,
            attempts: Vec::new(),
            is_finished: false,
            terminal_code: None,
        }
    }

    /// Apply a handler's correction to the effective inputs
    pub fn apply_patch(&mut self, patch: ContextPatch) {
        if let Some(structure) = patch.structure {
            self.inputs.structure = structure;
        }
        if let Some(parameters) = patch.parameters {
            self.inputs.parameters = parameters;
        }
    }

    /// The most recent attempt, if any
    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}
