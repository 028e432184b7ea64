// Structure snapshots - molecular geometries submitted with each attempt

//! # Structure Models
//!
//! This module defines [`StructureSnapshot`], the geometry associated with
//! one calculation attempt, and the exact textual rendering contract the
//! external program consumes.
//!
//! ## Rendering Contract
//!
//! One line per atom, `SYMBOL  X.XXXXXX    Y.XXXXXX    Z.XXXXXX` (two spaces
//! after the symbol, four between coordinates, six decimal places),
//! newline-joined with **no trailing newline**. The fan-out aggregation and
//! the restart correction handler both rely on this format round-tripping
//! identically, so it lives in exactly one place.

use serde::{Deserialize, Serialize};

use super::output::OutputRecord;
use crate::{Result, WorkchainError};

/// One molecular geometry, never mutated in place
///
/// A snapshot is either the raw text a caller supplied (passed through to
/// the external program verbatim) or a symbols + cartesian-coordinates pair
/// rendered on demand. Corrections during the restart loop always produce a
/// new snapshot rather than editing an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructureSnapshot {
    /// Caller-supplied geometry text, used as-is
    Text(String),

    /// Element symbols plus one cartesian coordinate triple per atom
    Cartesian {
        symbols: Vec<String>,
        coords: Vec<[f64; 3]>,
    },
}

impl StructureSnapshot {
    /// Build a cartesian snapshot from parallel symbol/coordinate arrays
    pub fn from_xyz(symbols: Vec<String>, coords: Vec<[f64; 3]>) -> Self {
        StructureSnapshot::Cartesian { symbols, coords }
    }

    /// Derive a snapshot from the **last** geometry frame of an output record
    ///
    /// This seeds a corrected retry: the last computed geometry of a failed
    /// attempt is usually closer to convergence than the original input.
    pub fn from_last_frame(output: &OutputRecord) -> Result<Self> {
        let frame = output.coordinate_frames.last().ok_or_else(|| {
            WorkchainError::MissingOutput("output record has no coordinate frames".to_string())
        })?;
        if frame.len() != output.symbols.len() {
            return Err(WorkchainError::InvalidInput(format!(
                "geometry frame has {} rows for {} atoms",
                frame.len(),
                output.symbols.len()
            )));
        }
        Ok(StructureSnapshot::Cartesian {
            symbols: output.symbols.clone(),
            coords: frame.clone(),
        })
    }

    /// Render the geometry in the external program's input format
    ///
    /// Text snapshots pass through unchanged; cartesian snapshots render one
    /// atom row per line with six decimal places and no trailing newline.
    pub fn to_input_text(&self) -> String {
        match self {
            StructureSnapshot::Text(text) => text.clone(),
            StructureSnapshot::Cartesian { symbols, coords } => symbols
                .iter()
                .zip(coords.iter())
                .map(|(symbol, [x, y, z])| {
                    format!("{}  {:.6}    {:.6}    {:.6}", symbol, x, y, z)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn water_output() -> OutputRecord {
        OutputRecord {
            symbols: vec!["O".to_string(), "H".to_string()],
            coordinate_frames: vec![
                vec![[0.0, 0.0, 0.1], [0.0, 0.0, 1.0]],
                vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.96]],
            ],
            free_energy: -76.0,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_rendering_format() {
        let snapshot = StructureSnapshot::from_xyz(
            vec!["O".to_string(), "H".to_string()],
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.96]],
        );
        assert_eq!(
            snapshot.to_input_text(),
            "O  0.000000    0.000000    0.000000\nH  0.000000    0.000000    0.960000"
        );
    }

    #[test]
    fn test_rendering_has_no_trailing_newline() {
        let snapshot = StructureSnapshot::from_xyz(vec!["O".to_string()], vec![[1.5, -2.25, 0.0]]);
        let text = snapshot.to_input_text();
        assert!(!text.ends_with('\n'));
        assert_eq!(text, "O  1.500000    -2.250000    0.000000");
    }

    #[test]
    fn test_text_snapshot_passes_through() {
        let text = "O  0.000000    0.000000    0.000000".to_string();
        let snapshot = StructureSnapshot::Text(text.clone());
        assert_eq!(snapshot.to_input_text(), text);
    }

    #[test]
    fn test_from_last_frame_uses_final_geometry() {
        let snapshot = StructureSnapshot::from_last_frame(&water_output()).unwrap();
        match &snapshot {
            StructureSnapshot::Cartesian { coords, .. } => {
                assert_eq!(coords[1], [0.0, 0.0, 0.96]);
            }
            other => panic!("expected cartesian snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_from_last_frame_rejects_empty_history() {
        let mut output = water_output();
        output.coordinate_frames.clear();
        let err = StructureSnapshot::from_last_frame(&output).unwrap_err();
        assert!(matches!(err, WorkchainError::MissingOutput(_)));
    }
}
