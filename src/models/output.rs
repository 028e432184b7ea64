// Output records and attempt exit statuses

//! # Output Models
//!
//! This module defines what comes back across the calculation boundary:
//! the named-field [`OutputRecord`] of a completed run and the fixed
//! vocabulary of [`FailureCode`]s an attempt can end with.
//!
//! ## Schema Agnosticism
//!
//! The restart engine only ever reads the fields it needs for recovery and
//! aggregation (symbols, coordinate frames, free energy). Every other field
//! the external parser produced travels in the flattened `extra` map and is
//! handed back to callers untouched.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Named-field output of one completed calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Element symbols, one per atom
    pub symbols: Vec<String>,

    /// One geometry per optimizer iteration; the last frame is the final
    /// (or last-computed) geometry
    pub coordinate_frames: Vec<Vec<[f64; 3]>>,

    /// Free energy of the final structure
    pub free_energy: f64,

    /// Every other named field the parser produced, passed through opaquely
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// How one attempt terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    /// The external program terminated normally
    Success,

    /// The external program terminated with one of the known failure codes
    Failed(FailureCode),
}

impl ExitStatus {
    /// The failure code, if this status is a failure
    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            ExitStatus::Success => None,
            ExitStatus::Failed(code) => Some(*code),
        }
    }
}

/// The fixed set of failure codes the external calculation can report
///
/// Each code carries a stable number and a human-readable message so that
/// terminal failures are diagnosable without re-parsing logs. Codes this
/// crate does not know about pass through as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCode {
    /// The program stopped without printing its normal-termination banner
    NoNormalTermination,

    /// The program printed an explicit error termination
    ErrorTermination,

    /// The run finished but its output could not be parsed
    OutputParsing,

    /// SCF convergence failed in a way no restart will fix
    UnrecoverableScfFailure,

    /// The program failed in a way no restart will fix
    UnrecoverableTermination,

    /// A code outside the known set, passed through as a generic failure
    Other(u32),
}

impl FailureCode {
    /// Stable numeric code
    pub fn code(&self) -> u32 {
        match self {
            FailureCode::NoNormalTermination => 301,
            FailureCode::ErrorTermination => 302,
            FailureCode::OutputParsing => 303,
            FailureCode::UnrecoverableScfFailure => 350,
            FailureCode::UnrecoverableTermination => 399,
            FailureCode::Other(code) => *code,
        }
    }

    /// Human-readable description used in terminal failure reports
    pub fn message(&self) -> &'static str {
        match self {
            FailureCode::NoNormalTermination => {
                "The calculation did not report a normal termination."
            }
            FailureCode::ErrorTermination => {
                "The calculation reported an error termination."
            }
            FailureCode::OutputParsing => {
                "The calculation output could not be parsed."
            }
            FailureCode::UnrecoverableScfFailure => {
                "The calculation failed with an unrecoverable SCF convergence error."
            }
            FailureCode::UnrecoverableTermination => {
                "The calculation failed with an unrecoverable error."
            }
            FailureCode::Other(_) => "The calculation failed with an unclassified error.",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_numeric_codes() {
        assert_eq!(FailureCode::UnrecoverableScfFailure.code(), 350);
        assert_eq!(FailureCode::UnrecoverableTermination.code(), 399);
        assert_eq!(FailureCode::Other(512).code(), 512);
    }

    #[test]
    fn test_exit_status_failure_code() {
        assert_eq!(ExitStatus::Success.failure_code(), None);
        assert_eq!(
            ExitStatus::Failed(FailureCode::ErrorTermination).failure_code(),
            Some(FailureCode::ErrorTermination)
        );
    }

    #[test]
    fn test_output_extra_fields_pass_through() {
        let json = serde_json::json!({
            "symbols": ["O", "H", "H"],
            "coordinate_frames": [[[0.0, 0.0, 0.0], [0.0, 0.0, 0.96], [0.93, 0.0, -0.24]]],
            "free_energy": -76.408951,
            "scfenergies": [-76.41],
            "natom": 3
        });
        let output: OutputRecord = serde_json::from_value(json).unwrap();
        assert_eq!(output.symbols.len(), 3);
        assert_eq!(output.extra["natom"], serde_json::json!(3));
        assert!(output.extra.contains_key("scfenergies"));
    }
}
