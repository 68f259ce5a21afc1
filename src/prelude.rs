//! # exspec Prelude
//!
//! The most commonly used types for building IR and running the specializer.
//!
//! ```rust,ignore
//! use exspec::prelude::*;
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all exspec operations
pub use crate::Error;

/// The result type used throughout exspec
pub use crate::Result;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Functions, modules and construction
pub use crate::ir::{
    Function, FunctionBuilder, FunctionId, FunctionSignature, InlineStrategy, Linkage, Module,
    OptimizationMode, Parameter, ParameterConvention, Representation,
};

/// Type system
pub use crate::ir::{
    CapabilitySet, ExistentialRepresentation, NominalDecl, NominalKind, Protocol, ProtocolId,
    TypeId, TypeTable,
};

/// Values and instructions
pub use crate::ir::{AccessMode, FullApplySite, InstrLocation, Instruction, Op, ValueId};

// ================================================================================================
// Analysis
// ================================================================================================

/// Def-use chains and concrete type recovery
pub use crate::analysis::{ConcreteExistentialInfo, ConcreteTypeResolver, DefUseIndex};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Pass infrastructure
pub use crate::compiler::{
    Counter, EventKind, EventLog, FunctionPass, OptimizerConfig, OptimizerContext, PassManager,
    Statistics,
};

/// The existential specializer
pub use crate::compiler::passes::existential::{
    CalleeRejection, Decline, ExistentialSpecializerPass, SiteOutcome,
};
