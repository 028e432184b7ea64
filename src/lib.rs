// Workchain - restartable quantum-chemistry calculations
// A generic submit/inspect/recover engine with fan-out aggregation

//! # Workchain Library
//!
//! This is the main library crate for Workchain, an orchestration engine for
//! long-running, potentially flaky external computations (quantum-chemistry
//! calculations in this workload). This file serves as the **library root**
//! and defines the public API that external crates can use.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`ParameterRecord`]: How the external program should run (method, basis, route options)
//! - [`StructureSnapshot`]: One molecular geometry, textual or cartesian
//! - [`OutputRecord`]: The named-field record a completed calculation produces
//! - [`FailureCode`] / [`ExitStatus`]: The fixed set of ways an attempt can end
//!
//! ### Restart Engine
//!
//! #### [`RestartEngine`] - Generic Submit/Inspect/Recover Loop
//!
//! The **authoritative** driver for one logical calculation. It repeatedly
//! submits the effective inputs to the external [`Calculation`], classifies
//! each attempt against an ordered [`HandlerRegistry`], and either:
//!
//! - **Retries**: a handler supplied a correction for the next attempt
//! - **Succeeds**: the attempt terminated normally (or a handler marked it satisfactory)
//! - **Fails**: a fatal code fired, an unmatched failure surfaced, or the
//!   iteration budget ran out
//!
//! Handlers fire highest-priority-first, ties broken by registration order,
//! at most one per attempt.
//!
//! ### Fan-Out Engine
//!
//! [`FanOutEngine`] derives three parameter variants (diffuse functions,
//! implicit solvation, hybrid) from one base configuration, runs an
//! independent restart engine per variant concurrently, and merges the
//! results plus a caller-supplied baseline into keyed aggregate maps.
//!
//! ### Calculation Boundary
//!
//! The external program sits behind the async [`Calculation`] trait. The
//! in-memory [`ScriptedCalculation`] implementation backs development and
//! tests without touching a real scheduler.

// Domain models (parameter records, structures, outputs)
pub mod models;

// The external-calculation boundary and its in-memory scripted stand-in
pub mod calculation;

// Pure parameter transforms deriving the calculation variants
pub mod transforms;

// Execution engines (restart loop, handler registry, fan-out)
pub mod engine;

// Re-export core domain types for easy access
// This creates a "flat" API - users can import directly from the crate root
pub use models::{
    ExitStatus,        // Success or Failed(code) for one attempt
    FailureCode,       // The fixed set of failure codes with stable numbers
    OutputRecord,      // Named-field output of a completed calculation
    ParameterRecord,   // Immutable run configuration for the external program
    StructureSnapshot, // One molecular geometry
};

// Re-export the calculation boundary types
pub use calculation::{
    Calculation,           // Async trait the external program sits behind
    CalculationOutcome,    // Exit status plus whatever output was parsed
    CalculationSubmission, // One attempt's full set of inputs
    ExecutionCode,         // Handle naming the installed external program
    ResourceSpec,          // Static per-attempt resource limits
    ScriptedCalculation,   // In-memory implementation for tests/development
    SubmissionMetadata,    // Provenance tags carried on each submission
};

// Re-export engine types for convenience
pub use engine::{
    context::{AttemptRecord, EngineContext},
    fanout::{AggregateResult, FanOutEngine, FanOutInputs, Variant},
    handlers::{ContextPatch, HandlerRegistry, HandlerReport},
    restart::RestartEngine,
};

// Core error types
use thiserror::Error;

/// Custom error types for workchain operations
///
/// Terminal engine outcomes carry the stable numeric code of the original
/// exit-code scheme so callers can dispatch on them without string matching.
#[derive(Error, Debug)]
pub enum WorkchainError {
    /// A declared-fatal failure code ended the restart loop immediately
    #[error("calculation failed with unrecoverable code {code}: {message}")]
    UnrecoverableFailure {
        code: u32,       // Stable numeric exit code (e.g. 350, 399)
        message: String, // Human-readable description of the failure
    },

    /// The restart loop ran out of allowed attempts without success
    #[error(
        "reached the maximum number of iterations {max_iterations}: last ran attempt {last_iteration} <{last_attempt_id}>"
    )]
    MaximumIterationsExceeded {
        max_iterations: u32,         // The configured budget
        last_iteration: u32,         // Which attempt ran last
        last_attempt_id: uuid::Uuid, // Identity of that attempt for diagnosis
    },

    /// A successful attempt produced no usable output record
    #[error("missing output: {0}")]
    MissingOutput(String),

    /// Error when invalid input is provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Errors surfaced by the external calculation infrastructure
    /// Using anyhow::Error for flexible error handling at the collaborator boundary
    #[error("Calculation error: {0}")]
    Calculation(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    /// Also uses `#[from]` for automatic conversion
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkchainError {
    /// Stable numeric code for terminal outcomes, following the original
    /// exit-code scheme (350/399 for unrecoverable runs, 401 for budget
    /// exhaustion). Non-terminal errors have no number.
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            WorkchainError::UnrecoverableFailure { code, .. } => Some(*code),
            WorkchainError::MaximumIterationsExceeded { .. } => Some(401),
            _ => None,
        }
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, WorkchainError>;
