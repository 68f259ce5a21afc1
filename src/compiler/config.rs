//! Optimizer configuration.

/// Configuration for the optimization pipeline.
///
/// Controls which stages run and how the [`crate::compiler::PassManager`]
/// iterates. Individual functions can additionally opt out of optimization
/// through [`crate::ir::OptimizationMode::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Enable existential argument specialization (default: true).
    pub existential_specializer: bool,

    /// Maximum pipeline rounds (default: 4).
    ///
    /// The first round visits every function; later rounds only visit
    /// functions that were added to the worklist, such as new clones.
    pub max_iterations: usize,

    /// Process independent functions in parallel (default: true).
    pub parallel: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            existential_specializer: true,
            max_iterations: 4,
            parallel: true,
        }
    }
}

impl OptimizerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with every optional stage disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            existential_specializer: false,
            ..Self::default()
        }
    }

    /// Creates a configuration that processes functions one at a time.
    ///
    /// Useful for reproducible event ordering in diagnostics.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }
}
