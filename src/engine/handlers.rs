// Handler registry - prioritized classification of attempt outcomes

//! # Handler Registry
//!
//! After every attempt, the restart engine asks this registry what to make
//! of the outcome. The registry is an explicit, ordered table of
//! `{priority, trigger codes, action}` records, sorted once at build time:
//!
//! - handlers are evaluated in **descending priority** order
//! - priority ties are broken by **registration order**
//! - the **first** handler whose trigger codes match the attempt's failure
//!   code fires, and its [`HandlerReport`] is final for the iteration:
//!   at most one handler fires per attempt
//! - successful attempts and unmatched failure codes pass through unhandled
//!
//! ## Default Registry
//!
//! [`HandlerRegistry::gaussian_defaults`] encodes the workload's policy:
//! the two declared-fatal codes (350, 399) map straight to a terminal
//! report, while the three generic failure codes trigger the structural
//! correction - resubmit from the failed attempt's own last geometry, since
//! it is usually closer to convergence than the original input. The same
//! correction is applied regardless of which of the three codes fired.

use crate::models::{FailureCode, ParameterRecord, StructureSnapshot};

use super::context::AttemptRecord;

/// A correction applied to the effective inputs before the next attempt
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    /// Replacement geometry for the next attempt
    pub structure: Option<StructureSnapshot>,

    /// Replacement parameters for the next attempt
    pub parameters: Option<ParameterRecord>,
}

impl ContextPatch {
    /// A patch that only replaces the submitted structure
    pub fn replace_structure(structure: StructureSnapshot) -> Self {
        Self {
            structure: Some(structure),
            ..Self::default()
        }
    }
}

/// What a fired handler decided about the attempt
#[derive(Debug, Clone, Default)]
pub struct HandlerReport {
    /// Stop consulting lower-priority handlers. Dispatch already stops at
    /// the first match, so this is informational in reports; it is kept so
    /// a report fully describes the decision that was taken.
    pub do_break: bool,

    /// Terminal failure code: the run ends unrecoverably with this code
    pub exit_code: Option<FailureCode>,

    /// Correction for the next attempt; the run keeps looping
    pub patch: Option<ContextPatch>,

    /// Treat the attempt as satisfactory despite its raw status
    pub satisfactory: bool,
}

impl HandlerReport {
    /// Retry the next attempt with unchanged inputs
    pub fn retry() -> Self {
        Self::default()
    }

    /// Retry after applying a correction to the effective inputs
    pub fn corrected(patch: ContextPatch) -> Self {
        Self {
            patch: Some(patch),
            ..Self::default()
        }
    }

    /// End the run unrecoverably with the given code
    pub fn terminal(code: FailureCode) -> Self {
        Self {
            do_break: true,
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// Mark the attempt satisfactory: the run succeeds with its output
    pub fn satisfactory() -> Self {
        Self {
            do_break: true,
            satisfactory: true,
            ..Self::default()
        }
    }
}

/// Boxed handler action: inspects the attempt, returns a report
type HandlerAction = Box<dyn Fn(&AttemptRecord) -> HandlerReport + Send + Sync>;

/// One registered handler
struct HandlerEntry {
    /// Name used in log lines when the handler fires
    name: String,

    /// Higher fires earlier; ties resolved by registration order
    priority: i32,

    /// Failure codes this handler claims
    trigger_codes: Vec<FailureCode>,

    /// The classification/correction logic
    action: HandlerAction,
}

/// Ordered registry of failure handlers
///
/// Built once (before the engine starts looping) and read-only afterwards.
/// The entries are kept sorted by descending priority; the sort is stable,
/// so equal priorities keep their registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the given failure codes
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        trigger_codes: Vec<FailureCode>,
        action: F,
    ) where
        F: Fn(&AttemptRecord) -> HandlerReport + Send + Sync + 'static,
    {
        self.entries.push(HandlerEntry {
            name: name.into(),
            priority,
            trigger_codes,
            action: Box::new(action),
        });
        // Stable sort: equal priorities keep registration order
        self.entries.sort_by_key(|entry| std::cmp::Reverse(entry.priority));
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the attempt against the registry
    ///
    /// Returns the firing handler's name and report, or `None` when no
    /// handler matched (the raw status then passes through unmodified).
    pub fn inspect(&self, attempt: &AttemptRecord) -> Option<(&str, HandlerReport)> {
        let code = attempt.failure_code()?;
        self.entries
            .iter()
            .find(|entry| entry.trigger_codes.contains(&code))
            .map(|entry| (entry.name.as_str(), (entry.action)(attempt)))
    }

    /// The workload's default policy for Gaussian-style calculations
    ///
    /// - `handle_fatal_codes` (priority 100): the declared non-retriable
    ///   codes end the run immediately
    /// - `handle_misc_failure` (priority 0): generic failures resubmit from
    ///   the failed attempt's last computed geometry; if that attempt left
    ///   nothing parsable behind, resubmit unchanged
    pub fn gaussian_defaults() -> Self {
        let mut registry = Self::new();

        registry.register(
            "handle_fatal_codes",
            100,
            vec![
                FailureCode::UnrecoverableScfFailure,
                FailureCode::UnrecoverableTermination,
            ],
            |attempt| {
                // Matched, so the code is present by construction
                let code = attempt
                    .failure_code()
                    .unwrap_or(FailureCode::UnrecoverableTermination);
                HandlerReport::terminal(code)
            },
        );

        registry.register(
            "handle_misc_failure",
            0,
            vec![
                FailureCode::NoNormalTermination,
                FailureCode::ErrorTermination,
                FailureCode::OutputParsing,
            ],
            |attempt| match attempt
                .output()
                .and_then(|output| StructureSnapshot::from_last_frame(output).ok())
            {
                Some(snapshot) => HandlerReport::corrected(ContextPatch::replace_structure(snapshot)),
                // Nothing parsable to recover a geometry from
                None => HandlerReport::retry(),
            },
        );

        registry
    }
}
