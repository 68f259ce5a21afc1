//! Mid-level intermediate representation in SSA form.
//!
//! The IR is deliberately small. It models exactly what existential
//! specialization has to reason about: ownership conventions of parameters,
//! indirect storage, wrapping values into existentials and opening them again,
//! and the calls that pass existentials around.
//!
//! # Architecture
//!
//! - [`types`] - Interned types, protocols and existential representations
//! - [`value`] - SSA values and instruction locations
//! - [`instruction`] - Operations with explicit def/use
//! - [`block`] - Basic blocks with phi nodes
//! - [`function`] - Functions, signatures, attributes and bodies
//! - [`apply`] - Views over full apply instructions
//! - [`module`] - Thread-safe function storage and the name registry
//! - [`builder`] - Closure-based function construction
//!
//! # Example
//!
//! ```text
//! func public @main() {
//! bb0:
//!   %0 = alloc_stack t1                      // any Drawable
//!   %1 = init_existential_addr %0, t2        // Circle
//!   store %2 to %1
//!   apply @f0(%0)                            // render(shape:)
//!   destroy_addr %0
//!   dealloc_stack %0
//!   return
//! }
//! ```

pub mod apply;
pub mod block;
pub mod builder;
pub mod function;
pub mod instruction;
pub mod module;
pub mod types;
pub mod value;

pub use apply::FullApplySite;
pub use block::{Block, PhiNode};
pub use builder::{BlockBuilder, FunctionBuilder, FunctionContext};
pub use function::{
    Function, FunctionBody, FunctionId, FunctionSignature, InlineStrategy, Linkage,
    OptimizationMode, Parameter, ParameterConvention, Representation, ResultInfo,
};
pub use instruction::{AccessMode, ApplyKind, Callee, Instruction, Op};
pub use module::Module;
pub use types::{
    CapabilitySet, ExistentialRepresentation, NominalDecl, NominalId, NominalKind, Protocol,
    ProtocolId, Type, TypeId, TypeTable,
};
pub use value::{InstrLocation, Value, ValueCategory, ValueId, ValueOrigin};
