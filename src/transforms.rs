// Pure parameter transforms deriving the calculation variants

//! # Parameter Transforms
//!
//! Pure, deterministic functions that derive a new [`ParameterRecord`] from
//! a base record plus scalar arguments. They are the only place variant
//! parameters are built, and they **never mutate their input** - each
//! transform clones the base and modifies the clone.
//!
//! ## Basis Stacking
//!
//! A general ("gen") basis set is supplied through the free-form input
//! block, which may already carry content such as `opt=modredundant`
//! coordinate definitions. Successive blocks must be joined with an explicit
//! blank-line separator or the external program misparses them, so
//! [`with_diffuse_basis`] appends `"\n\n" + basis_text` to an existing block
//! rather than replacing it.
//!
//! ## Solvation Overwrite
//!
//! [`with_implicit_solvent`] sets the `scrf` route sub-option outright:
//! whatever solvation a base record carried, the derived record reflects the
//! requested solvent and nothing else.

use serde_json::json;

use crate::models::{ParameterRecord, GENERAL_BASIS};

/// Route keyword carrying the implicit-solvation sub-option
pub const SCRF_KEY: &str = "scrf";

/// Solvation model written by the solvent transforms
pub const SOLVATION_MODEL: &str = "iefpcm";

/// Derive a record that requests diffuse functions via a general basis
///
/// Sets the basis-set mode to [`GENERAL_BASIS`] and stacks `basis_text`
/// onto the free-form input block: a record without an existing block gets
/// exactly `basis_text`; a record with one gets the existing text, a blank
/// line, then `basis_text`.
pub fn with_diffuse_basis(base: &ParameterRecord, basis_text: &str) -> ParameterRecord {
    let mut derived = base.clone();
    derived.basis_set = GENERAL_BASIS.to_string();
    derived.input_block = Some(match base.input_block.as_deref() {
        // No prior free-form content (or an empty block): the basis stands alone
        None | Some("") => basis_text.to_string(),
        // Prior content (e.g. modredundant definitions): stack with a blank line
        Some(existing) => format!("{}\n\n{}", existing, basis_text),
    });
    derived
}

/// Derive a record that requests implicit solvation (IEFPCM)
///
/// Overwrites any prior `scrf` sub-option with
/// `{model: "iefpcm", solvent: <solvent>}`.
pub fn with_implicit_solvent(base: &ParameterRecord, solvent: &str) -> ParameterRecord {
    let mut derived = base.clone();
    derived.route_parameters.insert(
        SCRF_KEY.to_string(),
        json!({ "model": SOLVATION_MODEL, "solvent": solvent }),
    );
    derived
}

/// Derive a record combining diffuse functions and implicit solvation
///
/// Basis stacking is applied first, the solvation overwrite second, so an
/// existing free-form block is preserved and the solvation always reflects
/// the requested solvent regardless of prior content.
pub fn with_diffuse_and_solvent(
    base: &ParameterRecord,
    basis_text: &str,
    solvent: &str,
) -> ParameterRecord {
    with_implicit_solvent(&with_diffuse_basis(base, basis_text), solvent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> ParameterRecord {
        let mut record = ParameterRecord::new("B3LYP", "6-31G(d)");
        record
            .route_parameters
            .insert("opt".to_string(), serde_json::Value::Null);
        record
    }

    #[test]
    fn test_diffuse_basis_on_empty_block() {
        let base = base_record();
        let derived = with_diffuse_basis(&base, "6-31+G(d)");

        assert_eq!(derived.basis_set, GENERAL_BASIS);
        assert_eq!(derived.input_block.as_deref(), Some("6-31+G(d)"));
        // Everything else is untouched
        assert_eq!(derived.functional, base.functional);
        assert_eq!(derived.route_parameters, base.route_parameters);
    }

    #[test]
    fn test_diffuse_basis_stacks_existing_block() {
        let mut base = base_record();
        base.input_block = Some("opt=modredundant".to_string());

        let derived = with_diffuse_basis(&base, "6-31+G(d)");
        assert_eq!(
            derived.input_block.as_deref(),
            Some("opt=modredundant\n\n6-31+G(d)")
        );
    }

    #[test]
    fn test_implicit_solvent_sets_scrf() {
        let derived = with_implicit_solvent(&base_record(), "water");
        assert_eq!(
            derived.solvation(),
            Some(&serde_json::json!({ "model": "iefpcm", "solvent": "water" }))
        );
        // The basis-set mode is not the solvent transform's business
        assert_eq!(derived.basis_set, "6-31G(d)");
    }

    #[test]
    fn test_implicit_solvent_overwrites_prior_solvation() {
        let base = with_implicit_solvent(&base_record(), "toluene");
        let derived = with_implicit_solvent(&base, "water");
        assert_eq!(
            derived.solvation(),
            Some(&serde_json::json!({ "model": "iefpcm", "solvent": "water" }))
        );
    }

    #[test]
    fn test_combined_applies_both_rules() {
        let mut base = base_record();
        base.input_block = Some("opt=modredundant".to_string());

        let derived = with_diffuse_and_solvent(&base, "6-31+G(d)", "acetone");
        assert_eq!(derived.basis_set, GENERAL_BASIS);
        assert_eq!(
            derived.input_block.as_deref(),
            Some("opt=modredundant\n\n6-31+G(d)")
        );
        // The solvation reflects exactly the requested solvent, regardless
        // of the basis text supplied
        assert_eq!(
            derived.solvation(),
            Some(&serde_json::json!({ "model": "iefpcm", "solvent": "acetone" }))
        );
    }

    #[test]
    fn test_transforms_are_deterministic() {
        let base = base_record();
        let first = with_diffuse_and_solvent(&base, "6-31+G(d)", "water");
        let second = with_diffuse_and_solvent(&base, "6-31+G(d)", "water");
        assert_eq!(first, second);
    }

    #[test]
    fn test_transforms_never_mutate_the_base() {
        let base = base_record();
        let untouched = base.clone();

        let _ = with_diffuse_basis(&base, "6-31+G(d)");
        let _ = with_implicit_solvent(&base, "water");
        let _ = with_diffuse_and_solvent(&base, "6-31+G(d)", "water");

        assert_eq!(base, untouched);
    }
}
