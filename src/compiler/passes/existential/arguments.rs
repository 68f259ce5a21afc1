//! Per-parameter analysis of existential arguments.
//!
//! For a call site with an eligible callee, every formal parameter is tested
//! in order. A parameter qualifies when
//!
//! 1. its declared type is an existential other than `Any` and `AnyObject`,
//! 2. the existential is laid out `Opaque` or `Class`,
//! 3. the concrete type of the argument is known at the call site.
//!
//! Qualifying parameters are described by an [`ArgumentDescriptor`] that also
//! records how the callee accesses the argument and whether the callee
//! releases the argument's storage itself.

use std::collections::BTreeMap;

use crate::{
    analysis::{ConcreteTypeResolver, DefUseIndex},
    compiler::passes::existential::ArgumentDescriptor,
    ir::{
        AccessMode, ExistentialRepresentation, Function, FunctionBody, FullApplySite, Op,
        ParameterConvention, TypeTable,
    },
};

/// Returns how a callee may access an argument passed with `convention`.
///
/// Mutable borrows and consumed arguments may be written; everything else is
/// read-only.
#[must_use]
pub const fn access_mode(convention: ParameterConvention) -> AccessMode {
    match convention {
        ParameterConvention::IndirectMutable | ParameterConvention::IndirectConsumed => {
            AccessMode::Mutable
        }
        ParameterConvention::IndirectBorrowed | ParameterConvention::ByValue => {
            AccessMode::Immutable
        }
    }
}

/// Returns `true` if the callee destroys its parameter at `index` directly.
///
/// Only direct uses of the parameter value are inspected.
#[must_use]
pub fn releases_storage(body: &FunctionBody, index: &DefUseIndex, param: usize) -> bool {
    let Some(argument) = body.argument(param) else {
        return false;
    };
    index.uses_of(argument).iter().any(|use_site| {
        use_site
            .location()
            .and_then(|location| body.instruction(location))
            .is_some_and(|instruction| matches!(instruction.op(), Op::DestroyAddr { .. }))
    })
}

/// Analyzes the existential arguments of call sites within one caller.
pub struct ArgumentAnalyzer<'a> {
    types: &'a TypeTable,
    resolver: ConcreteTypeResolver<'a>,
}

impl<'a> ArgumentAnalyzer<'a> {
    /// Creates an analyzer for call sites in `caller`.
    #[must_use]
    pub const fn new(types: &'a TypeTable, caller: &'a FunctionBody, caller_index: &'a DefUseIndex) -> Self {
        Self {
            types,
            resolver: ConcreteTypeResolver::new(caller, caller_index, types),
        }
    }

    /// Collects the qualifying parameters of a call site.
    ///
    /// # Arguments
    ///
    /// * `site` - The call site in the caller.
    /// * `callee` - The resolved, eligible callee.
    /// * `callee_index` - Def-use index of the callee body.
    ///
    /// # Returns
    ///
    /// The descriptors keyed by parameter position; empty if no parameter
    /// qualified.
    #[must_use]
    pub fn analyze(
        &self,
        site: &FullApplySite,
        callee: &Function,
        callee_index: &DefUseIndex,
    ) -> BTreeMap<usize, ArgumentDescriptor> {
        let mut descriptors = BTreeMap::new();
        let Some(callee_body) = callee.body() else {
            return descriptors;
        };

        for (index, param) in callee.signature().params.iter().enumerate() {
            let ty = param.ty;
            if !self.types.is_existential(ty) || self.types.is_any(ty) || self.types.is_any_object(ty) {
                continue;
            }

            let representation = self.types.preferred_existential_representation(ty);
            if !matches!(
                representation,
                ExistentialRepresentation::Opaque | ExistentialRepresentation::Class
            ) {
                log::trace!(
                    "{}: parameter {} has {} representation",
                    callee.name(),
                    index,
                    representation
                );
                continue;
            }

            let Some(argument) = site.argument(index) else {
                continue;
            };
            let Some(info) = self.resolver.resolve(argument, Some(site.location())) else {
                log::debug!(
                    "{}: no unique concrete type for argument {} ({}) at {}",
                    callee.name(),
                    index,
                    argument,
                    site.location()
                );
                continue;
            };
            if !self.types.satisfies(info.concrete, ty) {
                log::debug!(
                    "{}: {} does not satisfy parameter {} ({})",
                    callee.name(),
                    self.types.display_name(info.concrete),
                    index,
                    self.types.display_name(ty)
                );
                continue;
            }

            let releases = representation == ExistentialRepresentation::Opaque
                && releases_storage(callee_body, callee_index, index);

            descriptors.insert(
                index,
                ArgumentDescriptor {
                    index,
                    concrete: info.concrete,
                    existential: ty,
                    capabilities: self.types.capabilities(ty).cloned().unwrap_or_default(),
                    representation,
                    access: access_mode(param.convention),
                    releases_storage: releases,
                    convention: param.convention,
                },
            );
        }

        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{
            FunctionBuilder, FunctionId, FunctionSignature, NominalDecl, NominalKind, Parameter,
            Protocol,
        },
        test::fixtures::Shapes,
    };

    fn analyze_first_site(shapes: &Shapes, caller: &Function) -> BTreeMap<usize, ArgumentDescriptor> {
        let body = caller.body().unwrap();
        let index = DefUseIndex::build(body);
        let site = body.full_apply_sites().remove(0);
        let callee = shapes
            .module
            .function(site.referenced_function().unwrap())
            .unwrap();
        let callee_index = DefUseIndex::build(callee.body().unwrap());
        ArgumentAnalyzer::new(shapes.types(), body, &index).analyze(&site, &callee, &callee_index)
    }

    fn call_with_circle(shapes: &Shapes, callee: FunctionId, extra: usize) -> Function {
        FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let slot = b.alloc_stack(shapes.drawable_ty);
                b.init_existential_addr(slot, shapes.circle_ty);
                let mut args = vec![slot];
                for _ in 0..extra {
                    args.push(b.literal(shapes.int_ty, 0));
                }
                b.apply(callee, &args, None);
                b.destroy_addr(slot);
                b.dealloc_stack(slot);
                b.ret(None);
            });
        })
    }

    #[test]
    fn test_access_modes() {
        assert_eq!(access_mode(ParameterConvention::IndirectBorrowed), AccessMode::Immutable);
        assert_eq!(access_mode(ParameterConvention::IndirectMutable), AccessMode::Mutable);
        assert_eq!(access_mode(ParameterConvention::IndirectConsumed), AccessMode::Mutable);
        assert_eq!(access_mode(ParameterConvention::ByValue), AccessMode::Immutable);
    }

    #[test]
    fn test_single_parameter_descriptor() {
        let shapes = Shapes::new();
        let render = shapes.render();
        let caller = call_with_circle(&shapes, render, 0);

        let descriptors = analyze_first_site(&shapes, &caller);
        assert_eq!(descriptors.len(), 1);
        let descriptor = &descriptors[&0];
        assert_eq!(descriptor.concrete, shapes.circle_ty);
        assert_eq!(descriptor.representation, ExistentialRepresentation::Opaque);
        assert_eq!(descriptor.access, AccessMode::Immutable);
        assert!(!descriptor.releases_storage);
    }

    #[test]
    fn test_release_flag_requires_destroy_in_callee() {
        let shapes = Shapes::new();
        let consume = shapes.define(
            "consume",
            vec![Parameter::new(shapes.drawable_ty, ParameterConvention::IndirectConsumed)],
            |f| {
                let shape = f.arg(0);
                f.block(0, |b| {
                    b.witness_call(shape, "draw", &[], None);
                    b.destroy_addr(shape);
                    b.ret(None);
                });
            },
        );
        let caller = call_with_circle(&shapes, consume, 0);

        let descriptors = analyze_first_site(&shapes, &caller);
        assert!(descriptors[&0].releases_storage);
        assert_eq!(descriptors[&0].access, AccessMode::Mutable);
    }

    #[test]
    fn test_non_existential_parameters_pass_through() {
        let shapes = Shapes::new();
        let scaled = shapes.define(
            "scaled",
            vec![
                Parameter::new(shapes.drawable_ty, ParameterConvention::IndirectBorrowed),
                Parameter::new(shapes.int_ty, ParameterConvention::ByValue),
            ],
            |f| f.block(0, |b| b.ret(None)),
        );
        let caller = call_with_circle(&shapes, scaled, 1);

        let descriptors = analyze_first_site(&shapes, &caller);
        assert_eq!(descriptors.keys().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_any_is_never_selected() {
        let shapes = Shapes::new();
        let show = shapes.define(
            "show",
            vec![Parameter::new(shapes.any_ty, ParameterConvention::IndirectBorrowed)],
            |f| f.block(0, |b| b.ret(None)),
        );
        let caller = FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let slot = b.alloc_stack(shapes.any_ty);
                b.init_existential_addr(slot, shapes.circle_ty);
                b.apply(show, &[slot], None);
                b.ret(None);
            });
        });

        assert!(analyze_first_site(&shapes, &caller).is_empty());
    }

    #[test]
    fn test_class_existential_never_releases() {
        let shapes = Shapes::new();
        let attach = shapes.attach();
        let caller = FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let tree = b.alloc_ref(shapes.tree_ty);
                let node = b.init_existential_ref(tree, shapes.tree_ty, shapes.node_ty);
                b.apply(attach, &[node], None);
                b.ret(None);
            });
        });

        let descriptors = analyze_first_site(&shapes, &caller);
        assert_eq!(descriptors[&0].representation, ExistentialRepresentation::Class);
        assert_eq!(descriptors[&0].concrete, shapes.tree_ty);
        assert!(!descriptors[&0].releases_storage);
    }

    #[test]
    fn test_class_existential_destroyed_by_callee_never_releases() {
        let shapes = Shapes::new();
        let detach = shapes.define(
            "detach",
            vec![Parameter::new(shapes.node_ty, ParameterConvention::ByValue)],
            |f| {
                let node = f.arg(0);
                f.block(0, |b| {
                    b.destroy_addr(node);
                    b.ret(None);
                });
            },
        );
        let caller = FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let tree = b.alloc_ref(shapes.tree_ty);
                let node = b.init_existential_ref(tree, shapes.tree_ty, shapes.node_ty);
                b.apply(detach, &[node], None);
                b.ret(None);
            });
        });

        let callee = shapes.module.function(detach).unwrap();
        let callee_index = DefUseIndex::build(callee.body().unwrap());
        assert!(releases_storage(callee.body().unwrap(), &callee_index, 0));

        let descriptors = analyze_first_site(&shapes, &caller);
        assert_eq!(descriptors[&0].representation, ExistentialRepresentation::Class);
        assert!(!descriptors[&0].releases_storage);
    }

    #[test]
    fn test_boxed_and_metatype_parameters_are_skipped() {
        let shapes = Shapes::new();
        let types = shapes.types();
        let failure = types.declare_protocol(Protocol::new("Failure").error());
        let timeout = types
            .declare_nominal(NominalDecl::new("Timeout", NominalKind::Struct).conforms(failure));
        let failure_ty = types.existential([failure]);
        let drawable_meta_ty = types.existential_metatype([shapes.drawable]);
        assert_eq!(
            types.preferred_existential_representation(failure_ty),
            ExistentialRepresentation::Boxed
        );
        assert_eq!(
            types.preferred_existential_representation(drawable_meta_ty),
            ExistentialRepresentation::Metatype
        );

        let report = shapes.define(
            "report",
            vec![
                Parameter::new(failure_ty, ParameterConvention::IndirectBorrowed),
                Parameter::new(drawable_meta_ty, ParameterConvention::ByValue),
            ],
            |f| f.block(0, |b| b.ret(None)),
        );
        let caller = FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let slot = b.alloc_stack(failure_ty);
                b.init_existential_addr(slot, timeout);
                let meta = b.literal(drawable_meta_ty, 0);
                b.apply(report, &[slot, meta], None);
                b.dealloc_stack(slot);
                b.ret(None);
            });
        });

        let body = caller.body().unwrap();
        let index = DefUseIndex::build(body);
        let site = body.full_apply_sites().remove(0);
        let resolver = ConcreteTypeResolver::new(body, &index, types);
        assert_eq!(
            resolver
                .resolve(site.argument(0).unwrap(), Some(site.location()))
                .map(|i| i.concrete),
            Some(timeout)
        );
        assert!(analyze_first_site(&shapes, &caller).is_empty());
    }
}
