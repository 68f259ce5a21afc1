//! Pass scheduling and analysis invalidation.
//!
//! The [`PassManager`] runs [`FunctionPass`]es over a module in rounds:
//!
//! 1. The first round visits every function of the module.
//! 2. Every following round visits only the functions that passes placed on
//!    the worklist during the previous round (e.g. freshly created clones).
//!
//! Rounds stop when the worklist is empty or after
//! [`crate::compiler::OptimizerConfig::max_iterations`] rounds.
//!
//! Within a round each pass processes the target functions in parallel using
//! rayon. A function is taken as a private copy of its module snapshot, and
//! the copy is published back only when the pass reports a change.

use bitflags::bitflags;
use rayon::prelude::*;

use crate::{
    compiler::{EventKind, FunctionPass, OptimizerContext},
    ir::{Function, FunctionId},
    Result,
};

bitflags! {
    /// Which analyses of a function have become stale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InvalidationKind: u8 {
        /// Instructions were added, removed or rewritten.
        const INSTRUCTIONS = 0x01;
        /// Call sites changed.
        const CALLS = 0x02;
        /// Control flow changed.
        const BRANCHES = 0x04;
        /// The function was replaced as a whole.
        const FUNCTION_BODY = 0x08;
        /// All of the above.
        const EVERYTHING = Self::INSTRUCTIONS.bits()
            | Self::CALLS.bits()
            | Self::BRANCHES.bits()
            | Self::FUNCTION_BODY.bits();
    }
}

/// Pipeline services consumed by transformation passes.
pub trait PipelineScheduler: Send + Sync {
    /// Schedules a newly created function for optimization.
    ///
    /// # Arguments
    ///
    /// * `new` - The function to schedule.
    /// * `original` - The function it was derived from.
    fn add_to_worklist(&self, new: FunctionId, original: FunctionId);

    /// Marks analyses of `function` as stale.
    fn invalidate_analyses(&self, function: FunctionId, kind: InvalidationKind);
}

/// Runs function passes over a module.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
}

impl PassManager {
    /// Creates a pass manager without passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass.
    pub fn add_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Appends a pass, builder style.
    #[must_use]
    pub fn with_pass(mut self, pass: Box<dyn FunctionPass>) -> Self {
        self.passes.push(pass);
        self
    }

    /// Returns the names of the registered passes in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs the pipeline until the worklist is drained.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The optimizer context holding the module.
    ///
    /// # Returns
    ///
    /// The number of rounds executed.
    ///
    /// # Errors
    ///
    /// Returns an error if any pass fails or a function cannot be published.
    pub fn run(&mut self, ctx: &OptimizerContext) -> Result<usize> {
        let mut targets = ctx.module.function_ids();
        let mut rounds = 0;

        while rounds < ctx.config.max_iterations && !targets.is_empty() {
            rounds += 1;
            let changed = Self::run_round(&mut self.passes, ctx, &targets)?;

            let mut next: Vec<FunctionId> = ctx
                .take_worklist()?
                .into_iter()
                .map(|(new, _)| new)
                .collect();
            next.sort_unstable();
            next.dedup();

            log::debug!(
                "round {}: {} functions visited, changed: {}, {} scheduled",
                rounds,
                targets.len(),
                changed,
                next.len()
            );
            targets = next;
        }

        if !targets.is_empty() {
            let message = format!(
                "stopping after {} rounds with {} functions still scheduled",
                rounds,
                targets.len()
            );
            log::warn!("{}", message);
            ctx.events.warn(message);
        }

        let message = format!(
            "{} rounds, {} transformations in {} functions, {} diagnostics: {}",
            rounds,
            ctx.events.transformation_count(),
            ctx.events.functions_affected(),
            ctx.events.diagnostics().count(),
            ctx.events.summary()
        );
        log::debug!("{}", message);
        ctx.events.info(message);

        Ok(rounds)
    }

    fn run_round(
        passes: &mut [Box<dyn FunctionPass>],
        ctx: &OptimizerContext,
        targets: &[FunctionId],
    ) -> Result<bool> {
        let mut any_changed = false;

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        for pass in passes.iter() {
            let pass = pass.as_ref();
            ctx.events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(format!("{} on {} functions", pass.name(), targets.len()));
            let process = |id: &FunctionId| Self::run_on_function(pass, *id, ctx);

            let results: Result<Vec<bool>> = if ctx.config.parallel {
                targets.par_iter().map(process).collect()
            } else {
                targets.iter().map(process).collect()
            };
            let changed = results?.into_iter().filter(|c| *c).count();

            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("{}: {} functions changed", pass.name(), changed));
            any_changed |= changed > 0;
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed)
    }

    fn run_on_function(
        pass: &dyn FunctionPass,
        id: FunctionId,
        ctx: &OptimizerContext,
    ) -> Result<bool> {
        let Some(snapshot) = ctx.module.function(id) else {
            return Ok(false);
        };
        if !snapshot.is_definition() || !snapshot.should_optimize() {
            return Ok(false);
        }
        if !pass.should_run(&snapshot, ctx) {
            return Ok(false);
        }

        let mut function = Function::clone(&snapshot);
        let changed = match pass.run_on_function(&mut function, ctx) {
            Ok(changed) => changed,
            Err(error) => {
                ctx.events
                    .record(EventKind::Error)
                    .function(id)
                    .pass(pass.name())
                    .message(error.to_string());
                return Err(error);
            }
        };
        if changed {
            ctx.module.replace_function(function)?;
            ctx.invalidate_analyses(id, InvalidationKind::EVERYTHING);
        }
        Ok(changed)
    }
}
