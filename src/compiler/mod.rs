//! Optimization pipeline infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Optimization Pipeline                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  OptimizerContext            Shared state for one pipeline run   │
//! │    ├─ Module                  (function snapshots, type table)   │
//! │    ├─ Analysis caches         (def-use, callers)                 │
//! │    ├─ Worklist                (clones awaiting optimization)     │
//! │    ├─ EventLog                                                   │
//! │    └─ Statistics                                                 │
//! │                                                                  │
//! │  PassManager                 Round-based execution               │
//! │    ├─ Round 0: every function of the module                      │
//! │    └─ Round n: functions scheduled during round n - 1            │
//! │                                                                  │
//! │  FunctionPass trait          Interface for all passes            │
//! │    ├─ run_on_function()       Per-function transformation        │
//! │    ├─ initialize()            Setup before each round            │
//! │    └─ finalize()              Cleanup after each round           │
//! │                                                                  │
//! │  Passes                                                          │
//! │    └─ ExistentialSpecializerPass                                 │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use exspec::compiler::{ExistentialSpecializerPass, OptimizerConfig, OptimizerContext, PassManager};
//!
//! let ctx = OptimizerContext::new(module, OptimizerConfig::default());
//! let mut manager = PassManager::new().with_pass(Box::new(ExistentialSpecializerPass::new()));
//! let changed = manager.run(&ctx)?;
//!
//! println!("{changed} functions changed: {}", ctx.stats);
//! ```

mod config;
mod context;
mod events;
mod mangle;
mod metrics;
mod pass;
pub mod passes;
mod scheduler;

pub use config::OptimizerConfig;
pub use context::OptimizerContext;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use mangle::{NameMangler, SpecializationMangler};
pub use metrics::{Counter, MetricsRegistry, Statistics};
pub use pass::FunctionPass;
pub use passes::ExistentialSpecializerPass;
pub use scheduler::{InvalidationKind, PassManager, PipelineScheduler};
