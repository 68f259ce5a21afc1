//! Analyses over the IR.
//!
//! # Architecture
//!
//! - [`defuse`] - Definitions and uses of SSA values within one body
//! - [`existential`] - Recovery of the concrete type behind an existential value
//! - [`callers`] - Cached caller-side information per function
//!
//! Analyses are plain data built from a function snapshot. Caching and
//! invalidation live in [`crate::compiler::OptimizerContext`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use exspec::analysis::{ConcreteTypeResolver, DefUseIndex};
//!
//! let index = DefUseIndex::build(body);
//! let resolver = ConcreteTypeResolver::new(body, &index, module.types());
//!
//! if let Some(info) = resolver.resolve(argument, Some(site.location())) {
//!     println!("argument wraps {}", module.types().display_name(info.concrete));
//! }
//! ```

pub mod callers;
pub mod defuse;
pub mod existential;

pub use callers::{CallerAnalysis, CallerAnalysisProvider, CallerInfo};
pub use defuse::{DefSite, DefUseIndex, UseSite};
pub use existential::{ConcreteExistentialInfo, ConcreteTypeResolver};
