//! Request and result types exchanged with the transform engine.

use std::collections::BTreeMap;

use strum::Display;

use crate::{
    compiler::passes::existential::CalleeRejection,
    ir::{
        AccessMode, CapabilitySet, ExistentialRepresentation, FunctionId, InstrLocation,
        Parameter, ParameterConvention, TypeId,
    },
};

/// Everything the engine needs to know about one specialized parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    /// Parameter position.
    pub index: usize,
    /// Type wrapped into the existential at the call site.
    pub concrete: TypeId,
    /// Declared existential type of the parameter.
    pub existential: TypeId,
    /// Protocols required by the existential.
    pub capabilities: CapabilitySet,
    /// Runtime layout of the existential, `Opaque` or `Class`.
    pub representation: ExistentialRepresentation,
    /// How the callee may access the argument.
    pub access: AccessMode,
    /// The callee destroys the parameter's storage itself.
    pub releases_storage: bool,
    /// Declared convention of the parameter.
    pub convention: ParameterConvention,
}

/// Describes one formal parameter of a specialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterDescriptor {
    /// Keeps its declared type.
    PassThrough {
        /// Parameter position.
        index: usize,
        /// The unchanged parameter.
        param: Parameter,
    },
    /// Becomes a generic parameter bound at the call site.
    Specialized(ArgumentDescriptor),
}

impl ParameterDescriptor {
    /// Returns the parameter position.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::PassThrough { index, .. } => *index,
            Self::Specialized(descriptor) => descriptor.index,
        }
    }

    /// Returns `true` for specialized parameters.
    #[must_use]
    pub const fn is_specialized(&self) -> bool {
        matches!(self, Self::Specialized(_))
    }
}

/// A complete request for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecializationRequest {
    /// The original callee.
    pub callee: FunctionId,
    /// Location of the apply in the caller.
    pub site: InstrLocation,
    /// One descriptor per formal parameter, in order.
    pub params: Vec<ParameterDescriptor>,
    /// The specialized parameters by position.
    pub existential_args: BTreeMap<usize, ArgumentDescriptor>,
    /// Name token of the clone; identical for identical signatures.
    pub name: String,
}

impl SpecializationRequest {
    /// Assembles a request from the qualifying descriptors.
    ///
    /// Every parameter without a descriptor becomes a pass-through entry.
    #[must_use]
    pub fn new(
        callee: FunctionId,
        site: InstrLocation,
        params: &[Parameter],
        existential_args: BTreeMap<usize, ArgumentDescriptor>,
        name: String,
    ) -> Self {
        let params = params
            .iter()
            .enumerate()
            .map(|(index, param)| match existential_args.get(&index) {
                Some(descriptor) => ParameterDescriptor::Specialized(descriptor.clone()),
                None => ParameterDescriptor::PassThrough {
                    index,
                    param: *param,
                },
            })
            .collect();

        Self {
            callee,
            site,
            params,
            existential_args,
            name,
        }
    }

    /// Returns the specialized positions in ascending order.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.existential_args.keys().copied().collect()
    }
}

/// The result of a successful specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specialization {
    /// The clone the call site now targets.
    pub function: FunctionId,
    /// `true` if the clone was created by this request, `false` if reused.
    pub created: bool,
    /// First location after the rewritten call sequence.
    pub resume_at: InstrLocation,
}

/// Why the engine refused a request. Nothing was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Decline {
    /// The request's site is not a full apply of the callee.
    #[strum(serialize = "site mismatch")]
    SiteMismatch,
    /// The callee is not in the module.
    #[strum(serialize = "missing callee")]
    MissingCallee,
    /// The callee or caller has no body.
    #[strum(serialize = "missing body")]
    MissingBody,
    /// Argument and parameter counts differ.
    #[strum(serialize = "arity mismatch")]
    ArityMismatch,
    /// The site's substitutions do not match the callee's generic parameters.
    #[strum(serialize = "substitution mismatch")]
    SubstitutionMismatch,
    /// The request specializes no parameter.
    #[strum(serialize = "nothing to specialize")]
    NothingToSpecialize,
    /// An argument does not fit the descriptor's representation.
    #[strum(serialize = "argument mismatch")]
    ArgumentMismatch,
    /// The callee reassigns a mutable specialized parameter.
    #[strum(serialize = "reinitialized parameter")]
    ReinitializedParameter,
    /// A clone registered under the request's name has an incompatible shape.
    #[strum(serialize = "name collision")]
    NameCollision,
}

/// Terminal outcome of one visited call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteOutcome {
    /// The callee cannot be specialized.
    RejectedByCallee(CalleeRejection),
    /// No argument qualified.
    RejectedByArguments,
    /// The engine declined the request.
    DeclinedByEngine(Decline),
    /// The site now calls a specialized clone.
    Specialized {
        /// The clone.
        function: FunctionId,
        /// The clone was created for this site.
        created: bool,
    },
}

impl SiteOutcome {
    /// Returns `true` if the site was rewritten.
    #[must_use]
    pub const fn is_specialized(&self) -> bool {
        matches!(self, Self::Specialized { .. })
    }
}
