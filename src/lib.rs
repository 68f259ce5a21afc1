// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # exspec
//!
//! Existential-argument specialization for a mid-level SSA intermediate
//! representation.
//!
//! A function taking `any Drawable` dispatches every protocol requirement
//! through a witness table and reaches its argument through an existential
//! container. When a caller builds the existential right before the call, it
//! knows the concrete type inside. `exspec` clones such callees into generic
//! functions with a type parameter in place of the existential and rewrites
//! the call sites to open the existential and call the clone. A later generic
//! specializer can then produce fully concrete code.
//!
//! ## Features
//!
//! - **Small SSA IR** - Ownership conventions, indirect storage and the
//!   existential operations the transformation reasons about
//! - **Concrete type recovery** - Intra-procedural tracing from an argument
//!   back to the instruction that initialized its existential
//! - **Shared clones** - Clones are named after callee and specialized
//!   positions; equal call sites share one clone, even across threads
//! - **Parallel pipeline** - Functions are optimized in parallel rounds, with
//!   new clones scheduled for the next round
//! - **Diagnostics** - Every considered call site leaves an event and a
//!   counter explaining why it was or was not specialized
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exspec::prelude::*;
//!
//! let module = Module::new("shapes");
//! // ... declare types and add functions ...
//!
//! let ctx = OptimizerContext::new(module, OptimizerConfig::default());
//! let mut manager = PassManager::new().with_pass(Box::new(ExistentialSpecializerPass::new()));
//! manager.run(&ctx)?;
//!
//! for event in ctx.events.filter_kind(EventKind::CallSiteRewritten) {
//!     println!("{}", event.message);
//! }
//! println!("{}", ctx.stats);
//! # Ok::<(), exspec::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Types, values, instructions, functions and the module
//! - [`analysis`] - Def-use chains, concrete type recovery, caller analysis
//! - [`compiler`] - Pass infrastructure and the specializer itself
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result`]. Declining to specialize a call site
//! is not an error: the site is left untouched and the reason is reported
//! through [`compiler::EventLog`] and [`compiler::Statistics`].

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// The intermediate representation.
pub mod ir;

/// Analyses over IR functions.
pub mod analysis;

/// Pass infrastructure and transformation passes.
pub mod compiler;

pub use error::Error;

/// The result type used throughout `exspec`.
pub type Result<T> = std::result::Result<T, Error>;
