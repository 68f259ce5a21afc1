//! Transformation passes.
//!
//! Each pass implements [`FunctionPass`](crate::compiler::FunctionPass) and is
//! registered with a [`PassManager`](crate::compiler::PassManager).
//!
//! - [`existential`] - Specialization of callees for the concrete types of
//!   existential arguments

pub mod existential;

pub use existential::ExistentialSpecializerPass;
