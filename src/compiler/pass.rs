//! The function pass interface.

use crate::{
    compiler::OptimizerContext,
    ir::Function,
    Result,
};

/// A transformation that runs on one function at a time.
///
/// Passes are shared between worker threads, so `run_on_function` takes
/// `&self`; any per-run state belongs in the [`OptimizerContext`].
///
/// # Example
///
/// ```rust,ignore
/// struct CountApplies;
///
/// impl FunctionPass for CountApplies {
///     fn name(&self) -> &'static str {
///         "count-applies"
///     }
///
///     fn run_on_function(&self, function: &mut Function, ctx: &OptimizerContext) -> Result<bool> {
///         let count = function.body().map_or(0, |b| b.full_apply_sites().len());
///         ctx.events.info(format!("{}: {} applies", function.name(), count));
///         Ok(false)
///     }
/// }
/// ```
pub trait FunctionPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. The pass manager has already skipped
    /// declarations and functions that opted out of optimization.
    fn should_run(&self, _function: &Function, _ctx: &OptimizerContext) -> bool {
        true
    }

    /// Runs the pass on a private copy of one function.
    ///
    /// The caller publishes the copy to the module when this returns `true`.
    ///
    /// # Arguments
    ///
    /// * `function` - The function to transform.
    /// * `ctx` - The shared optimizer context.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the function.
    fn run_on_function(&self, function: &mut Function, ctx: &OptimizerContext) -> Result<bool>;

    /// Called once before each pipeline round.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &OptimizerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after each pipeline round.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &OptimizerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
