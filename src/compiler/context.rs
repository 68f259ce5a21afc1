//! Shared state for one optimizer run.
//!
//! The [`OptimizerContext`] owns the module being optimized together with
//! every cache and side channel that passes share:
//!
//! - cached analyses (def-use indices, caller analysis) with explicit
//!   invalidation
//! - the worklist of functions created during the current round
//! - counters and the event log
//!
//! All state is behind thread-safe containers, so a single `&OptimizerContext`
//! is handed to passes running on several functions in parallel.

use std::sync::{Arc, Mutex};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::{CallerAnalysis, CallerAnalysisProvider, CallerInfo, DefUseIndex},
    compiler::{
        EventLog, InvalidationKind, MetricsRegistry, OptimizerConfig, PipelineScheduler,
        Statistics,
    },
    ir::{Function, FunctionId, Module},
    Result,
};

/// Shared optimizer state.
pub struct OptimizerContext {
    /// The module being optimized.
    pub module: Arc<Module>,

    /// Pipeline configuration.
    pub config: OptimizerConfig,

    /// Events recorded by passes.
    pub events: EventLog,

    /// Counters incremented by passes.
    pub stats: Statistics,

    // ── Cached analyses ─────────────────────────────────────────────────
    callers: Box<dyn CallerAnalysisProvider>,
    def_use: DashMap<FunctionId, (Arc<Function>, Arc<DefUseIndex>)>,
    invalidations: DashMap<FunctionId, InvalidationKind>,

    // ── Worklist ────────────────────────────────────────────────────────
    worklist: Mutex<Vec<(FunctionId, FunctionId)>>,
    scheduled: DashSet<FunctionId>,
}

impl OptimizerContext {
    /// Creates a context owning `module`.
    #[must_use]
    pub fn new(module: Module, config: OptimizerConfig) -> Self {
        Self::with_shared(Arc::new(module), config)
    }

    /// Creates a context over a module shared with the caller.
    #[must_use]
    pub fn with_shared(module: Arc<Module>, config: OptimizerConfig) -> Self {
        Self {
            module,
            config,
            events: EventLog::new(),
            stats: Statistics::new(),
            callers: Box::new(CallerAnalysis::new()),
            def_use: DashMap::new(),
            invalidations: DashMap::new(),
            worklist: Mutex::new(Vec::new()),
            scheduled: DashSet::new(),
        }
    }

    /// Replaces the caller analysis provider.
    #[must_use]
    pub fn with_caller_analysis(mut self, provider: Box<dyn CallerAnalysisProvider>) -> Self {
        self.callers = provider;
        self
    }

    // ── Analyses ────────────────────────────────────────────────────────

    /// Returns the callers of `callee`, possibly from a cache.
    #[must_use]
    pub fn callers_of(&self, callee: FunctionId) -> Arc<Vec<CallerInfo>> {
        self.callers.callers_of(&self.module, callee)
    }

    /// Returns the def-use index of a function snapshot.
    ///
    /// The index is cached per function and reused as long as the module
    /// still holds the same snapshot. Returns `None` for declarations.
    #[must_use]
    pub fn def_use(&self, function: &Arc<Function>) -> Option<Arc<DefUseIndex>> {
        let body = function.body()?;
        if let Some(entry) = self.def_use.get(&function.id()) {
            if Arc::ptr_eq(&entry.0, function) {
                return Some(Arc::clone(&entry.1));
            }
        }

        let index = Arc::new(DefUseIndex::build(body));
        self.def_use
            .insert(function.id(), (Arc::clone(function), Arc::clone(&index)));
        Some(index)
    }

    /// Returns `true` if a def-use index is cached for `function`.
    #[must_use]
    pub fn has_cached_def_use(&self, function: FunctionId) -> bool {
        self.def_use.contains_key(&function)
    }

    /// Returns the union of every invalidation recorded for `function`.
    #[must_use]
    pub fn invalidations_of(&self, function: FunctionId) -> InvalidationKind {
        self.invalidations
            .get(&function)
            .map_or(InvalidationKind::empty(), |kind| *kind)
    }

    /// Returns the metrics sink.
    #[must_use]
    pub fn metrics(&self) -> &dyn MetricsRegistry {
        &self.stats
    }

    // ── Worklist ────────────────────────────────────────────────────────

    /// Drains the worklist.
    ///
    /// Returns `(new, original)` pairs in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the worklist lock was poisoned.
    pub fn take_worklist(&self) -> Result<Vec<(FunctionId, FunctionId)>> {
        let mut worklist = lock!(self.worklist)?;
        self.scheduled.clear();
        Ok(std::mem::take(&mut *worklist))
    }

    /// Returns `true` if `function` waits on the worklist.
    #[must_use]
    pub fn is_scheduled(&self, function: FunctionId) -> bool {
        self.scheduled.contains(&function)
    }
}

impl PipelineScheduler for OptimizerContext {
    fn add_to_worklist(&self, new: FunctionId, original: FunctionId) {
        if !self.scheduled.insert(new) {
            return;
        }
        match lock!(self.worklist) {
            Ok(mut worklist) => worklist.push((new, original)),
            Err(error) => log::warn!("dropping {} from the worklist: {}", new, error),
        }
    }

    fn invalidate_analyses(&self, function: FunctionId, kind: InvalidationKind) {
        *self.invalidations.entry(function).or_default() |= kind;

        if kind.intersects(InvalidationKind::INSTRUCTIONS | InvalidationKind::FUNCTION_BODY) {
            self.def_use.remove(&function);
        }
        if kind.contains(InvalidationKind::CALLS) {
            self.callers.invalidate(function);
        }
    }
}
