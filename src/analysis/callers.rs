//! Caller-side information per function.
//!
//! [`CallerAnalysis`] answers "who calls this function, and how often" from
//! a lazily filled cache. Entries are computed from the current module
//! snapshots on first request and stay valid until they are invalidated
//! explicitly; a pass that rewrites call sites is expected to invalidate the
//! functions whose caller sets changed.

use std::sync::Arc;

use dashmap::DashMap;

use crate::ir::{FunctionId, Module};

/// One caller of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerInfo {
    /// The calling function.
    pub caller: FunctionId,
    /// Number of full applies of the callee in the caller.
    pub call_sites: usize,
}

/// Source of caller-side information.
pub trait CallerAnalysisProvider: Send + Sync {
    /// Returns the callers of `callee`, possibly from a stale cache.
    fn callers_of(&self, module: &Module, callee: FunctionId) -> Arc<Vec<CallerInfo>>;

    /// Drops cached information involving `function`.
    fn invalidate(&self, function: FunctionId);
}

/// Cached caller analysis.
#[derive(Debug, Default)]
pub struct CallerAnalysis {
    cache: DashMap<FunctionId, Arc<Vec<CallerInfo>>>,
}

impl CallerAnalysis {
    /// Creates an empty analysis.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn compute(module: &Module, callee: FunctionId) -> Vec<CallerInfo> {
        let mut callers = Vec::new();
        for id in module.function_ids() {
            let Some(function) = module.function(id) else {
                continue;
            };
            let Some(body) = function.body() else {
                continue;
            };
            let call_sites = body
                .full_apply_sites()
                .iter()
                .filter(|site| site.referenced_function() == Some(callee))
                .count();
            if call_sites > 0 {
                callers.push(CallerInfo {
                    caller: id,
                    call_sites,
                });
            }
        }
        callers
    }

    /// Returns `true` if the analysis has a cached entry for `callee`.
    #[must_use]
    pub fn is_cached(&self, callee: FunctionId) -> bool {
        self.cache.contains_key(&callee)
    }
}

impl CallerAnalysisProvider for CallerAnalysis {
    fn callers_of(&self, module: &Module, callee: FunctionId) -> Arc<Vec<CallerInfo>> {
        if let Some(cached) = self.cache.get(&callee) {
            return Arc::clone(&cached);
        }
        let computed = Arc::new(Self::compute(module, callee));
        self.cache.insert(callee, Arc::clone(&computed));
        computed
    }

    fn invalidate(&self, function: FunctionId) {
        self.cache.remove(&function);
        self.cache
            .retain(|_, callers| !callers.iter().any(|info| info.caller == function));
    }
}
