// Core domain models for workchains
// These are the generic data structures the engines operate on

//! # Domain Models Module
//!
//! This module contains the core domain models for the workchain engine.
//! They are deliberately **engine-agnostic**: nothing in here knows about
//! retries, handlers, or fan-out - only about what a calculation is asked
//! to do and what it produced.
//!
//! ## Model Overview
//!
//! - [`ParameterRecord`]: immutable run configuration (method, basis set,
//!   route options, free-form input sections)
//! - [`StructureSnapshot`]: one molecular geometry, textual or cartesian
//! - [`OutputRecord`]: the named-field record a completed calculation
//!   produces, with opaque pass-through for fields the engine never reads
//! - [`ExitStatus`] / [`FailureCode`]: the fixed vocabulary for how one
//!   attempt terminated

// Declares the `parameters` submodule from `parameters.rs`
// Contains ParameterRecord - how the external program should run
pub mod parameters;

// Declares the `structure` submodule from `structure.rs`
// Contains StructureSnapshot and the atom-row text rendering rule
pub mod structure;

// Declares the `output` submodule from `output.rs`
// Contains OutputRecord, ExitStatus and FailureCode
pub mod output;

// Re-export main types for convenience
// This creates shortcuts so users don't need to know the internal structure

/// Re-export the run-configuration record and its basis-set mode constant
pub use parameters::{ParameterRecord, GENERAL_BASIS};

/// Re-export the geometry snapshot
pub use structure::StructureSnapshot;

/// Re-export the attempt-outcome vocabulary
pub use output::{ExitStatus, FailureCode, OutputRecord};
