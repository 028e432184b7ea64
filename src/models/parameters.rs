// Parameter records - run configuration for the external program

//! # Parameter Models
//!
//! This module defines [`ParameterRecord`], the immutable description of how
//! one calculation should run: the model chemistry, the basis-set mode, the
//! route options, and any free-form input sections appended after the
//! molecule specification.
//!
//! ## Immutability Convention
//!
//! Records are never modified in place once built. The transforms in
//! [`crate::transforms`] clone the base record and modify the clone, so a
//! caller can derive many variants from one base without aliasing surprises.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Basis-set mode selecting a user-supplied ("general") basis
///
/// When a record carries this mode, the actual basis definition is expected
/// in the free-form input block rather than in the route line.
pub const GENERAL_BASIS: &str = "gen";

/// Immutable run configuration for one calculation
///
/// This mirrors the input file of a Gaussian-style program without being
/// tied to its exact syntax:
/// - `functional` + `basis_set` pick the model chemistry
/// - `route_parameters` hold arbitrarily nested route options (e.g. the
///   `scrf` solvation sub-option written by the solvent transform)
/// - `input_block` holds free-form trailing sections (modredundant
///   definitions, general basis sets, ...) that the external program parses
///   as blank-line-separated blocks
///
/// Fields this crate never interprets travel in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Model chemistry, e.g. "B3LYP" or "wB97XD"
    pub functional: String,

    /// Basis set name, or [`GENERAL_BASIS`] when the basis lives in the
    /// free-form input block
    pub basis_set: String,

    /// Route options keyed by keyword; values may be null, scalars or
    /// nested objects (the solvation sub-option is a nested object)
    #[serde(default)]
    pub route_parameters: HashMap<String, serde_json::Value>,

    /// Free-form input sections appended after the molecule specification.
    /// Multiple logical sections are stacked into one string separated by
    /// blank lines; `None` (or empty) means no trailing sections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_block: Option<String>,

    /// Additional named fields passed through opaquely
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ParameterRecord {
    /// Create a record with the given model chemistry and no route options
    pub fn new(functional: impl Into<String>, basis_set: impl Into<String>) -> Self {
        Self {
            functional: functional.into(),
            basis_set: basis_set.into(),
            route_parameters: HashMap::new(),
            input_block: None,
            extra: HashMap::new(),
        }
    }

    /// True when the record carries a non-empty free-form input block
    pub fn has_input_block(&self) -> bool {
        matches!(self.input_block.as_deref(), Some(block) if !block.is_empty())
    }

    /// The solvation sub-option under the route, if any
    pub fn solvation(&self) -> Option<&serde_json::Value> {
        self.route_parameters.get(crate::transforms::SCRF_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = ParameterRecord::new("B3LYP", "6-31G(d)");
        assert_eq!(record.functional, "B3LYP");
        assert_eq!(record.basis_set, "6-31G(d)");
        assert!(record.route_parameters.is_empty());
        assert!(!record.has_input_block());
        assert!(record.solvation().is_none());
    }

    #[test]
    fn test_empty_input_block_counts_as_absent() {
        let mut record = ParameterRecord::new("B3LYP", "6-31G(d)");
        record.input_block = Some(String::new());
        assert!(!record.has_input_block());

        record.input_block = Some("opt=modredundant".to_string());
        assert!(record.has_input_block());
    }

    #[test]
    fn test_extra_fields_round_trip() {
        let mut record = ParameterRecord::new("B3LYP", "6-31G(d)");
        record
            .extra
            .insert("charge".to_string(), serde_json::json!(0));
        record
            .extra
            .insert("multiplicity".to_string(), serde_json::json!(1));

        let json = serde_json::to_value(&record).unwrap();
        // Flattened extras appear as top-level fields
        assert_eq!(json["charge"], serde_json::json!(0));

        let back: ParameterRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
