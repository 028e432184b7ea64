// Restart engine - the generic submit/inspect/recover loop

//! # Restart Engine
//!
//! [`RestartEngine`] drives one logical calculation through repeated
//! attempts until it succeeds, fails unrecoverably, or exhausts its
//! iteration budget:
//!
//! ```text
//! SETUP -> LOOPING -> { SUCCEEDED, FAILED_MAX_ITER, FAILED_UNRECOVERABLE }
//! ```
//!
//! Each pass of the loop submits the effective inputs to the external
//! [`Calculation`] (the engine's only suspension point - a run can be
//! in flight for days without pinning a thread), records an
//! [`AttemptRecord`], and dispatches the handler registry over it:
//!
//! - a **terminal** report ends the run with that failure code
//! - a **correction** is applied to the effective inputs and the loop
//!   continues
//! - a **satisfactory** report (or a raw success with no handler override)
//!   ends the run successfully
//! - an **unmatched failure code** is unrecoverable: no handler claimed it
//!
//! On success the engine returns the last attempt's whole output record -
//! it is output-schema-agnostic and passes every named field through
//! unmodified. Budget exhaustion is reported, never silently swallowed:
//! the error names the last attempt that ran.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::calculation::{Calculation, CalculationSubmission};
use crate::models::{ExitStatus, OutputRecord};
use crate::{Result, WorkchainError};

use super::context::{AttemptRecord, EngineContext};
use super::handlers::HandlerRegistry;

/// Drives one logical calculation through repeated attempts
///
/// The engine itself is stateless across runs: every `run` call owns a
/// fresh [`EngineContext`], so one engine can serve many concurrent runs.
pub struct RestartEngine {
    /// The external collaborator that actually executes attempts
    calculation: Arc<dyn Calculation>,

    /// Ordered handler table, sorted once at construction
    handlers: Arc<HandlerRegistry>,
}

impl RestartEngine {
    /// Create an engine with an explicit handler registry
    pub fn new(calculation: Arc<dyn Calculation>, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            calculation,
            handlers,
        }
    }

    /// Create an engine with the workload's default Gaussian policy
    pub fn with_gaussian_defaults(calculation: Arc<dyn Calculation>) -> Self {
        Self::new(calculation, Arc::new(HandlerRegistry::gaussian_defaults()))
    }

    /// Run the calculation to a terminal state
    ///
    /// Returns the successful attempt's output record, or the terminal
    /// failure ([`WorkchainError::UnrecoverableFailure`] or
    /// [`WorkchainError::MaximumIterationsExceeded`]).
    pub async fn run(
        &self,
        initial_inputs: CalculationSubmission,
        max_iterations: u32,
    ) -> Result<OutputRecord> {
        if max_iterations == 0 {
            return Err(WorkchainError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        // SETUP: the context is owned by this run alone
        let mut ctx = EngineContext::new(initial_inputs);

        // LOOPING
        while !ctx.is_finished && ctx.iteration < max_iterations {
            ctx.iteration += 1;
            let started_at = Utc::now();
            info!(
                iteration = ctx.iteration,
                max_iterations, "launching calculation attempt"
            );

            // The only suspension point: wait for the external run to end
            let outcome = self.calculation.submit(ctx.inputs.clone()).await?;
            let attempt = AttemptRecord::new(ctx.iteration, ctx.inputs.clone(), outcome, started_at);

            self.inspect_attempt(&attempt, &mut ctx);
            ctx.attempts.push(attempt);
        }

        self.results(ctx, max_iterations)
    }

    /// Classify one completed attempt and update the context
    fn inspect_attempt(&self, attempt: &AttemptRecord, ctx: &mut EngineContext) {
        match self.handlers.inspect(attempt) {
            Some((handler, report)) => {
                if let Some(code) = report.exit_code {
                    error!(
                        iteration = attempt.iteration,
                        handler,
                        code = code.code(),
                        "attempt classified as unrecoverable"
                    );
                    ctx.is_finished = true;
                    ctx.terminal_code = Some(code);
                } else if let Some(patch) = report.patch {
                    warn!(
                        iteration = attempt.iteration,
                        handler, "handler supplied a correction; restarting"
                    );
                    ctx.apply_patch(patch);
                } else if report.satisfactory {
                    info!(
                        iteration = attempt.iteration,
                        handler, "handler marked the attempt satisfactory"
                    );
                    ctx.is_finished = true;
                } else {
                    warn!(
                        iteration = attempt.iteration,
                        handler, "handler requested a plain restart"
                    );
                }
            }
            None => match attempt.status() {
                ExitStatus::Success => {
                    ctx.is_finished = true;
                }
                ExitStatus::Failed(code) => {
                    // No handler claimed this code as recoverable
                    error!(
                        iteration = attempt.iteration,
                        code = code.code(),
                        "unhandled failure code; giving up"
                    );
                    ctx.is_finished = true;
                    ctx.terminal_code = Some(code);
                }
            },
        }
    }

    /// Translate the final context into the run's result
    fn results(&self, ctx: EngineContext, max_iterations: u32) -> Result<OutputRecord> {
        if let Some(code) = ctx.terminal_code {
            return Err(WorkchainError::UnrecoverableFailure {
                code: code.code(),
                message: code.message().to_string(),
            });
        }

        let last = ctx.last_attempt().ok_or_else(|| {
            WorkchainError::Internal("restart loop ended without any attempt".to_string())
        })?;

        // We check the finished flag and not the raw status of the last
        // attempt, because a handler may have qualified a "failed" run as
        // satisfactory for the outcome of the work chain.
        if !ctx.is_finished {
            return Err(WorkchainError::MaximumIterationsExceeded {
                max_iterations,
                last_iteration: last.iteration,
                last_attempt_id: last.id,
            });
        }

        info!(iterations = ctx.iteration, "work chain completed");
        last.output().cloned().ok_or_else(|| {
            WorkchainError::MissingOutput(
                "the satisfactory attempt produced no output record".to_string(),
            )
        })
    }
}
