//! Cloning and call-site rewriting.
//!
//! The default [`TransformEngine`] turns every specialized parameter of the
//! callee into a generic parameter `τ_k` and keeps the original body intact by
//! re-wrapping the parameter into an existential at entry. Ownership is
//! restored at every return according to the parameter's access mode.
//!
//! # Clone, `Opaque` parameter
//!
//! ```text
//! bb0:
//!   %e = alloc_stack any P
//!   %p = init_existential_addr %e, τ_0
//!   copy_addr [take]? %a to [init] %p      // take if consumed or released
//!   ...                                    // original body, %a renamed to %e
//!   // before each return:
//!   destroy_addr %e                        // immutable, not released
//!   %q = open_existential_addr mutable_access %e as τ_0
//!   copy_addr [take] %q to %a              // mutable borrow
//!   deinit_existential_addr %e             // mutable borrow
//!   dealloc_stack %e
//!   return
//! ```
//!
//! # Clone, `Class` parameter
//!
//! ```text
//!   %e = init_existential_ref %a : τ_0, any P
//! ```
//!
//! # Call site
//!
//! ```text
//!   %o = open_existential_addr immutable_access %x as Circle
//!   apply @$es6renderg0_<Circle>(%o)
//! ```

use crate::{
    compiler::passes::existential::{
        ArgumentDescriptor, Decline, Specialization, SpecializationRequest,
    },
    ir::{
        AccessMode, Callee, ExistentialRepresentation, FullApplySite, Function, FunctionBody,
        FunctionId, InstrLocation, Instruction, Linkage, Module, Op, ParameterConvention, TypeId, Value,
        ValueCategory, ValueId, ValueOrigin,
    },
};

/// Performs the cloning and rewriting for a complete request.
///
/// Implementations must validate before mutating: on `Err` neither the
/// caller nor the module may have changed.
pub trait TransformEngine: Send + Sync {
    /// Specializes the call site described by `request`.
    ///
    /// # Arguments
    ///
    /// * `request` - The callee, parameter descriptors and clone name.
    /// * `caller` - The function containing the call site.
    /// * `module` - The module receiving the clone.
    ///
    /// # Errors
    ///
    /// Returns a [`Decline`] if the request cannot be carried out.
    fn specialize(
        &self,
        request: &SpecializationRequest,
        caller: &mut Function,
        module: &Module,
    ) -> Result<Specialization, Decline>;
}

/// The default clone-and-rewrite engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistentialTransform;

impl ExistentialTransform {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate(
        request: &SpecializationRequest,
        caller: &Function,
        callee: &Function,
    ) -> Result<FullApplySite, Decline> {
        if request.existential_args.is_empty() {
            return Err(Decline::NothingToSpecialize);
        }

        let caller_body = caller.body().ok_or(Decline::MissingBody)?;
        let site = caller_body
            .instruction(request.site)
            .and_then(|instruction| FullApplySite::new(request.site, instruction))
            .ok_or(Decline::SiteMismatch)?;
        if site.referenced_function() != Some(request.callee) {
            return Err(Decline::SiteMismatch);
        }

        let callee_body = callee.body().ok_or(Decline::MissingBody)?;
        let params = &callee.signature().params;
        if site.args().len() != params.len() || request.params.len() != params.len() {
            return Err(Decline::ArityMismatch);
        }
        if site.substitutions().len() != callee.generic_params().len() {
            return Err(Decline::SubstitutionMismatch);
        }

        for (&index, descriptor) in &request.existential_args {
            if descriptor.index != index {
                return Err(Decline::ArityMismatch);
            }
            let param = params.get(index).ok_or(Decline::ArityMismatch)?;
            let argument = site
                .argument(index)
                .and_then(|value| caller_body.value(value))
                .ok_or(Decline::ArgumentMismatch)?;

            let fits = match descriptor.representation {
                ExistentialRepresentation::Opaque => {
                    argument.is_address() && param.convention.is_indirect()
                }
                ExistentialRepresentation::Class => {
                    !argument.is_address() && !param.convention.is_indirect()
                }
                _ => false,
            };
            if !fits || param.ty != descriptor.existential {
                return Err(Decline::ArgumentMismatch);
            }

            if descriptor.representation == ExistentialRepresentation::Opaque
                && descriptor.convention == ParameterConvention::IndirectMutable
                && Self::writes_parameter(callee_body, index)
            {
                return Err(Decline::ReinitializedParameter);
            }
        }

        Ok(site)
    }

    /// Returns `true` if the body may store a new existential into the parameter.
    fn writes_parameter(body: &FunctionBody, param: usize) -> bool {
        let Some(argument) = body.argument(param) else {
            return false;
        };
        body.iter_instructions()
            .any(|(_, instruction)| match instruction.op() {
                Op::InitExistentialAddr { existential, .. } => *existential == argument,
                Op::Store { dest, .. } | Op::CopyAddr { dest, .. } => *dest == argument,
                Op::DestroyAddr { operand } | Op::DeinitExistentialAddr { operand } => {
                    *operand == argument
                }
                Op::Apply { args, .. }
                | Op::PartialApply { args, .. }
                | Op::WitnessCall { args, .. } => args.contains(&argument),
                _ => false,
            })
    }

    /// Returns `true` if `existing` can serve `request`.
    fn is_compatible(existing: &Function, request: &SpecializationRequest, callee: &Function) -> bool {
        existing.specialized_from() == Some(request.callee)
            && existing.signature().params.len() == callee.signature().params.len()
            && existing.generic_params().len()
                == callee.generic_params().len() + request.existential_args.len()
    }

    /// Builds the generic clone of `callee`.
    fn build_clone(
        request: &SpecializationRequest,
        callee: &Function,
        module: &Module,
    ) -> Result<Function, Decline> {
        let types = module.types();
        let mut clone = callee.clone();
        let mut body = clone.body().cloned().ok_or(Decline::MissingBody)?;

        let base = callee.generic_params().len();
        let mut generics = callee.generic_params().to_vec();
        let mut wrapped = Vec::with_capacity(request.existential_args.len());
        let mut prologue = Vec::new();

        for (k, (&index, descriptor)) in request.existential_args.iter().enumerate() {
            // Generic parameter counts are bounded by parameter counts
            #[allow(clippy::cast_possible_truncation)]
            let tau = types.generic_param((base + k) as u32, descriptor.capabilities.clone());
            generics.push(tau);

            let argument = body.argument(index).ok_or(Decline::ArityMismatch)?;
            if let Some(value) = body.value_mut(argument) {
                value.set_ty(tau);
            }
            if let Some(param) = clone.signature_mut().params.get_mut(index) {
                param.ty = tau;
            }

            let category = match descriptor.representation {
                ExistentialRepresentation::Class => ValueCategory::Object,
                _ => ValueCategory::Address,
            };
            let existential = body.add_value(Value::new(
                descriptor.existential,
                category,
                ValueOrigin::Instruction,
            ));
            body.replace_all_uses(argument, existential);

            if descriptor.representation == ExistentialRepresentation::Class {
                prologue.push(Instruction::synthetic(Op::InitExistentialRef {
                    dest: existential,
                    operand: argument,
                    concrete: tau,
                    existential_ty: descriptor.existential,
                }));
            } else {
                let payload = body.add_value(Value::new(
                    tau,
                    ValueCategory::Address,
                    ValueOrigin::Instruction,
                ));
                let take = descriptor.releases_storage
                    || descriptor.convention == ParameterConvention::IndirectConsumed;
                prologue.push(Instruction::synthetic(Op::AllocStack {
                    dest: existential,
                    ty: descriptor.existential,
                }));
                prologue.push(Instruction::synthetic(Op::InitExistentialAddr {
                    dest: payload,
                    existential,
                    concrete: tau,
                }));
                prologue.push(Instruction::synthetic(Op::CopyAddr {
                    src: argument,
                    dest: payload,
                    take,
                    init: true,
                }));
                wrapped.push((descriptor, argument, existential, tau));
            }
        }

        if !body.insert_before(InstrLocation::new(0, 0), prologue) {
            return Err(Decline::MissingBody);
        }

        let mut returns = body.return_locations();
        returns.reverse();
        for location in returns {
            let mut epilogue = Vec::new();
            for &(descriptor, argument, existential, tau) in wrapped.iter().rev() {
                Self::restore(&mut body, &mut epilogue, descriptor, argument, existential, tau);
            }
            body.insert_before(location, epilogue);
        }

        clone.set_name(request.name.clone());
        clone.set_body(Some(body));
        clone.set_generic_params(generics);
        clone.set_linkage(Linkage::Shared);
        clone.set_specialized_from(Some(request.callee));
        Ok(clone)
    }

    /// Emits the ownership restoration of one `Opaque` parameter.
    fn restore(
        body: &mut FunctionBody,
        epilogue: &mut Vec<Instruction>,
        descriptor: &ArgumentDescriptor,
        argument: ValueId,
        existential: ValueId,
        tau: TypeId,
    ) {
        let owns_payload = !descriptor.releases_storage
            && descriptor.convention != ParameterConvention::IndirectConsumed;
        if owns_payload && descriptor.access == AccessMode::Mutable {
            let opened = body.add_value(Value::new(
                tau,
                ValueCategory::Address,
                ValueOrigin::Instruction,
            ));
            epilogue.push(Instruction::synthetic(Op::OpenExistentialAddr {
                dest: opened,
                operand: existential,
                access: AccessMode::Mutable,
                opened: tau,
            }));
            epilogue.push(Instruction::synthetic(Op::CopyAddr {
                src: opened,
                dest: argument,
                take: true,
                init: false,
            }));
            epilogue.push(Instruction::synthetic(Op::DeinitExistentialAddr {
                operand: existential,
            }));
        } else if owns_payload {
            epilogue.push(Instruction::synthetic(Op::DestroyAddr {
                operand: existential,
            }));
        }
        epilogue.push(Instruction::synthetic(Op::DeallocStack {
            operand: existential,
        }));
    }

    /// Redirects the call site to the clone.
    fn rewrite_site(
        request: &SpecializationRequest,
        site: &FullApplySite,
        caller: &mut FunctionBody,
        clone: FunctionId,
    ) -> InstrLocation {
        let mut pre = Vec::new();
        let mut post_groups = Vec::new();
        let mut args = site.args().to_vec();
        let mut substitutions = site.substitutions().to_vec();

        for (&index, descriptor) in &request.existential_args {
            let original = args[index];
            let concrete = descriptor.concrete;
            substitutions.push(concrete);
            let mut post = Vec::new();

            match descriptor.representation {
                ExistentialRepresentation::Class => {
                    let opened = caller.add_value(Value::new(
                        concrete,
                        ValueCategory::Object,
                        ValueOrigin::Instruction,
                    ));
                    pre.push(Instruction::synthetic(Op::OpenExistentialRef {
                        dest: opened,
                        operand: original,
                        opened: concrete,
                    }));
                    args[index] = opened;
                }
                _ if descriptor.releases_storage => {
                    let opened = caller.add_value(Value::new(
                        concrete,
                        ValueCategory::Address,
                        ValueOrigin::Instruction,
                    ));
                    let copy = caller.add_value(Value::new(
                        concrete,
                        ValueCategory::Address,
                        ValueOrigin::Instruction,
                    ));
                    pre.push(Instruction::synthetic(Op::OpenExistentialAddr {
                        dest: opened,
                        operand: original,
                        access: AccessMode::Immutable,
                        opened: concrete,
                    }));
                    pre.push(Instruction::synthetic(Op::AllocStack {
                        dest: copy,
                        ty: concrete,
                    }));
                    pre.push(Instruction::synthetic(Op::CopyAddr {
                        src: opened,
                        dest: copy,
                        take: false,
                        init: true,
                    }));
                    if descriptor.convention == ParameterConvention::IndirectConsumed {
                        post.push(Instruction::synthetic(Op::DestroyAddr { operand: original }));
                    }
                    post.push(Instruction::synthetic(Op::DeallocStack { operand: copy }));
                    args[index] = copy;
                }
                _ => {
                    let opened = caller.add_value(Value::new(
                        concrete,
                        ValueCategory::Address,
                        ValueOrigin::Instruction,
                    ));
                    pre.push(Instruction::synthetic(Op::OpenExistentialAddr {
                        dest: opened,
                        operand: original,
                        access: descriptor.access,
                        opened: concrete,
                    }));
                    if descriptor.convention == ParameterConvention::IndirectConsumed {
                        post.push(Instruction::synthetic(Op::DeinitExistentialAddr {
                            operand: original,
                        }));
                    }
                    args[index] = opened;
                }
            }
            post_groups.push(post);
        }

        let location = site.location();
        if let Some(instruction) = caller.instruction_mut(location) {
            *instruction = Instruction::synthetic(Op::Apply {
                dest: site.dest(),
                kind: site.kind(),
                callee: Callee::Function(clone),
                substitutions,
                args,
            });
        }

        let post: Vec<Instruction> = post_groups.into_iter().rev().flatten().collect();
        let (pre_len, post_len) = (pre.len(), post.len());
        caller.insert_before(
            InstrLocation::new(location.block, location.instruction + 1),
            post,
        );
        caller.insert_before(location, pre);

        InstrLocation::new(location.block, location.instruction + pre_len + 1 + post_len)
    }
}

impl TransformEngine for ExistentialTransform {
    fn specialize(
        &self,
        request: &SpecializationRequest,
        caller: &mut Function,
        module: &Module,
    ) -> Result<Specialization, Decline> {
        let callee = module
            .function(request.callee)
            .ok_or(Decline::MissingCallee)?;
        let site = Self::validate(request, caller, &callee)?;

        let (function, created) = match module.function_by_name(&request.name) {
            Some(existing) => {
                if !Self::is_compatible(&existing, request, &callee) {
                    return Err(Decline::NameCollision);
                }
                (existing.id(), false)
            }
            None => {
                let clone = Self::build_clone(request, &callee, module)?;
                let (id, created) = module.get_or_insert_with(&request.name, move |_| clone);
                if !created {
                    let winner = module.function(id).ok_or(Decline::MissingCallee)?;
                    if !Self::is_compatible(&winner, request, &callee) {
                        return Err(Decline::NameCollision);
                    }
                }
                (id, created)
            }
        };

        let body = caller.body_mut().ok_or(Decline::MissingBody)?;
        let resume_at = Self::rewrite_site(request, &site, body, function);

        Ok(Specialization {
            function,
            created,
            resume_at,
        })
    }
}
