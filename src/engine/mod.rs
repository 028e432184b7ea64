// Workchain execution engines
// This contains the restart loop, its handler registry, and the fan-out

//! # Engine Module
//!
//! This module contains the execution machinery that drives calculations
//! through the [`crate::Calculation`] boundary. It is the layer between the
//! domain models and the external world.
//!
//! ## Architecture Overview
//!
//! - **Domain Models**: pure data (in `models/`)
//! - **Engine Layer**: restart loop, handler dispatch, fan-out (this module)
//! - **Calculation Boundary**: the external collaborator (in `calculation`)
//!
//! ## Engine Components
//!
//! ### Restart Engine (`restart` module)
//! - Drives one logical calculation through repeated attempts
//! - submit → inspect → recover, bounded by an iteration budget
//! - Owns its [`context::EngineContext`] exclusively for the whole run
//!
//! ### Handler Registry (`handlers` module)
//! - Ordered table of `{priority, trigger codes, action}` records
//! - Evaluated highest-priority-first, registration order breaks ties
//! - At most one handler fires per attempt
//!
//! ### Fan-Out Engine (`fanout` module)
//! - Derives the diffuse / implicit / hybrid parameter variants
//! - Runs three independent restart engines concurrently
//! - Joins all three and merges results with the caller's baseline

/// Per-run mutable state and attempt bookkeeping
pub mod context;

/// Ordered failure-handler registry and its reports
pub mod handlers;

/// The submit/inspect/recover restart loop
pub mod restart;

/// Three-variant fan-out with keyed aggregation
pub mod fanout;

// Re-export main engine types for clean API access
pub use context::{AttemptRecord, EngineContext};
pub use fanout::{AggregateResult, FanOutEngine, FanOutInputs, Variant};
pub use handlers::{ContextPatch, HandlerRegistry, HandlerReport};
pub use restart::RestartEngine;
