//! Existential specialization integration tests.
//!
//! These tests drive the specializer through the public API only:
//! 1. Declare protocols and nominal types in a module
//! 2. Build callers and callees with `FunctionBuilder`
//! 3. Run the pass, either per function or through `PassManager`
//! 4. Inspect the rewritten call sites, the clones, events and counters

use std::sync::{Arc, Mutex};

use exspec::{
    compiler::{
        passes::existential::{
            CalleeRejection, Decline, ExistentialSpecializerPass, SiteOutcome, Specialization,
            SpecializationRequest, TransformEngine,
        },
        Counter, EventKind, OptimizerConfig, OptimizerContext, PassManager, SpecializationMangler,
    },
    ir::{
        AccessMode, ApplyKind, Callee, FullApplySite, Function, FunctionBuilder, FunctionId,
        FunctionSignature, InlineStrategy, InstrLocation, Instruction, Linkage, Module,
        NominalDecl, NominalKind, Op, Parameter, ParameterConvention, Protocol, Representation,
        TypeId,
    },
    Result,
};

/// Types shared by every test module.
struct Types {
    drawable: TypeId,
    node: TypeId,
    circle: TypeId,
    square: TypeId,
    tree: TypeId,
    int: TypeId,
    any: TypeId,
    any_object: TypeId,
}

fn declare(module: &Module) -> Types {
    let types = module.types();
    let drawable = types.declare_protocol(Protocol::new("Drawable").requirement("draw"));
    let node = types.declare_protocol(Protocol::new("Node").class_bound());

    Types {
        drawable: types.existential([drawable]),
        node: types.existential([node]),
        circle: types
            .declare_nominal(NominalDecl::new("Circle", NominalKind::Struct).conforms(drawable)),
        square: types
            .declare_nominal(NominalDecl::new("Square", NominalKind::Struct).conforms(drawable)),
        tree: types.declare_nominal(NominalDecl::new("Tree", NominalKind::Class).conforms(node)),
        int: types.declare_nominal(NominalDecl::new("Int", NominalKind::Struct)),
        any: types.any(),
        any_object: types.any_object(),
    }
}

/// `func name(_ shape: <convention> any Drawable) { shape.draw() }`
fn drawing_callee(module: &Module, t: &Types, name: &str, convention: ParameterConvention) -> FunctionId {
    let function = FunctionBuilder::new(
        name,
        FunctionSignature::new(vec![Parameter::new(t.drawable, convention)]),
    )
    .build_with(|f| {
        let shape = f.arg(0);
        f.block(0, |b| {
            b.witness_call(shape, "draw", &[], None);
            if convention == ParameterConvention::IndirectConsumed {
                b.destroy_addr(shape);
            }
            b.ret(None);
        });
    });
    module.add_function(function).unwrap()
}

/// A caller that wraps each concrete type and passes it to `callee`.
fn wrapping_caller(module: &Module, t: &Types, name: &str, callee: FunctionId, concrete: &[TypeId]) -> FunctionId {
    let function = FunctionBuilder::new(name, FunctionSignature::default()).build_with(|f| {
        f.block(0, |b| {
            for &ty in concrete {
                let slot = b.alloc_stack(t.drawable);
                b.init_existential_addr(slot, ty);
                b.apply(callee, &[slot], None);
                b.destroy_addr(slot);
                b.dealloc_stack(slot);
            }
            b.ret(None);
        });
    });
    module.add_function(function).unwrap()
}

fn sites(function: &Function) -> Vec<FullApplySite> {
    function.body().unwrap().full_apply_sites()
}

fn ops(function: &Function, block: usize) -> Vec<Op> {
    function
        .body()
        .unwrap()
        .block(block)
        .unwrap()
        .instructions()
        .iter()
        .map(|instruction| instruction.op().clone())
        .collect()
}

fn specialize(ctx: &OptimizerContext, caller: FunctionId) -> Vec<(InstrLocation, SiteOutcome)> {
    let mut function = Function::clone(&ctx.module.function(caller).unwrap());
    ExistentialSpecializerPass::new().specialize_function(&mut function, ctx)
}

fn sequential() -> OptimizerConfig {
    OptimizerConfig::sequential()
}

#[test]
fn test_two_concrete_types_share_one_clone() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = wrapping_caller(&module, &t, "main", render, &[t.circle, t.square]);

    let ctx = OptimizerContext::new(module, OptimizerConfig::default());
    let mut manager = PassManager::new().with_pass(Box::new(ExistentialSpecializerPass::new()));
    let rounds = manager.run(&ctx)?;
    assert_eq!(rounds, 2, "clone is optimized in a second round");

    let clones = ctx.module.specializations_of(render);
    assert_eq!(clones.len(), 1);
    let clone = ctx.module.function(clones[0]).unwrap();
    assert_eq!(clone.name(), "$es6renderg0_");
    assert_eq!(clone.linkage(), Linkage::Shared);
    assert_eq!(clone.generic_params().len(), 1);
    assert!(SpecializationMangler::is_specialization(clone.name()));

    let main = ctx.module.function(main).unwrap();
    let rewritten = sites(&main);
    assert_eq!(rewritten.len(), 2);
    for (site, concrete) in rewritten.iter().zip([t.circle, t.square]) {
        assert_eq!(site.referenced_function(), Some(clones[0]));
        assert_eq!(site.substitutions(), &[concrete]);
        let opened = site.argument(0).unwrap();
        assert_eq!(main.body().unwrap().value_type(opened), Some(concrete));
    }

    assert_eq!(ctx.stats.get(Counter::FunctionsSpecialized), 2);
    assert_eq!(ctx.stats.get(Counter::ClonesCreated), 1);
    assert_eq!(ctx.stats.get(Counter::ClonesReused), 1);
    assert_eq!(ctx.events.count_kind(EventKind::CallSiteRewritten), 2);
    assert_eq!(ctx.events.count_kind(EventKind::FunctionSpecialized), 1);
    assert_eq!(ctx.events.count_kind(EventKind::CloneReused), 1);
    Ok(())
}

#[test]
fn test_runtime_choice_is_left_untouched() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = module.add_function(
        FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
            let mut chosen = None;
            f.block(0, |b| {
                let fixed = b.alloc_stack(t.drawable);
                b.init_existential_addr(fixed, t.circle);
                b.apply(render, &[fixed], None);
                b.destroy_addr(fixed);
                b.dealloc_stack(fixed);

                let slot = b.alloc_stack(t.drawable);
                let flag = b.literal(t.int, 1);
                b.cond_br(flag, 1, 2);
                chosen = Some(slot);
            });
            let slot = chosen.unwrap();
            f.block(1, |b| {
                b.init_existential_addr(slot, t.circle);
                b.br(3);
            });
            f.block(2, |b| {
                b.init_existential_addr(slot, t.square);
                b.br(3);
            });
            f.block(3, |b| {
                b.apply(render, &[slot], None);
                b.destroy_addr(slot);
                b.dealloc_stack(slot);
                b.ret(None);
            });
        }),
    )?;
    let functions = module.len();

    let ctx = OptimizerContext::new(module, OptimizerConfig::default());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&ctx)?;

    assert_eq!(ctx.module.len(), functions + 1);
    let clone = ctx.module.function_by_name("$es6renderg0_").unwrap();

    let main = ctx.module.function(main).unwrap();
    let targets: Vec<Option<FunctionId>> =
        sites(&main).iter().map(FullApplySite::referenced_function).collect();
    assert_eq!(targets, vec![Some(clone.id()), Some(render)]);
    assert_eq!(sites(&main)[0].substitutions(), &[t.circle]);
    assert_eq!(ctx.events.count_kind(EventKind::ArgumentsRejected), 1);
    Ok(())
}

#[test]
fn test_original_callee_is_kept() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    wrapping_caller(&module, &t, "main", render, &[t.circle]);
    let before = module.function(render).unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&ctx)?;

    let after = ctx.module.function(render).unwrap();
    assert_eq!(*before, *after);
    assert_eq!(after.signature().params[0].ty, t.drawable);
    Ok(())
}

#[test]
fn test_second_run_changes_nothing() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = wrapping_caller(&module, &t, "main", render, &[t.circle]);

    let first = OptimizerContext::new(module, sequential());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&first)?;
    let rewritten = first.module.function(main).unwrap();
    let functions = first.module.len();

    let second = OptimizerContext::with_shared(Arc::clone(&first.module), sequential());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&second)?;

    assert_eq!(second.stats.get(Counter::FunctionsSpecialized), 0);
    assert_eq!(second.module.len(), functions);
    assert_eq!(*second.module.function(main).unwrap(), *rewritten);
    assert_eq!(second.events.count_kind(EventKind::ArgumentsRejected), 1);
    Ok(())
}

#[test]
fn test_disabled_pass_leaves_module_alone() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = wrapping_caller(&module, &t, "main", render, &[t.circle]);
    let before = module.function(main).unwrap();

    let ctx = OptimizerContext::new(module, OptimizerConfig::disabled());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&ctx)?;

    assert_eq!(*ctx.module.function(main).unwrap(), *before);
    assert_eq!(ctx.module.len(), 2);
    assert_eq!(ctx.stats.get(Counter::CallSitesVisited), 0);
    Ok(())
}

#[test]
fn test_ineligible_callees_are_rejected() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let param = || vec![Parameter::new(t.drawable, ParameterConvention::IndirectBorrowed)];
    let body = |builder: FunctionBuilder| builder.build_with(|f| f.block(0, |b| b.ret(None)));

    let callees = [
        (
            body(FunctionBuilder::new("cold", FunctionSignature::new(param())).no_optimize()),
            CalleeRejection::NotOptimizable,
        ),
        (
            FunctionBuilder::new("external", FunctionSignature::new(param())).declaration(),
            CalleeRejection::NoBody,
        ),
        (
            body(FunctionBuilder::new(
                "make",
                FunctionSignature::new(param()).returns_indirect(t.circle),
            )),
            CalleeRejection::IndirectResults,
        ),
        (
            body(FunctionBuilder::new(
                "validate",
                FunctionSignature::new(param()).throws(t.int),
            )),
            CalleeRejection::ErrorResult,
        ),
        (
            body(
                FunctionBuilder::new("tiny", FunctionSignature::new(param()))
                    .inline_strategy(InlineStrategy::Always),
            ),
            CalleeRejection::AlwaysInline,
        ),
        (
            body(
                FunctionBuilder::new("imported", FunctionSignature::new(param()))
                    .linkage(Linkage::PublicExternal),
            ),
            CalleeRejection::AvailableExternally,
        ),
        (
            body(FunctionBuilder::new(
                "objc",
                FunctionSignature::new(param()).representation(Representation::ObjcMethod),
            )),
            CalleeRejection::ForeignRepresentation,
        ),
    ];

    let mut expected = Vec::new();
    let mut targets = Vec::new();
    for (callee, rejection) in callees {
        targets.push(module.add_function(callee).unwrap());
        expected.push(rejection);
    }
    let main = {
        let function = FunctionBuilder::new("caller", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let slot = b.alloc_stack(t.drawable);
                b.init_existential_addr(slot, t.circle);
                for &target in &targets {
                    b.apply(target, &[slot], None);
                }
                b.destroy_addr(slot);
                b.dealloc_stack(slot);
                b.ret(None);
            });
        });
        module.add_function(function).unwrap()
    };
    let before = module.function(main).unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let outcomes = specialize(&ctx, main);

    let rejections: Vec<SiteOutcome> = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
    let expected: Vec<SiteOutcome> = expected.into_iter().map(SiteOutcome::RejectedByCallee).collect();
    assert_eq!(rejections, expected);
    assert_eq!(ctx.stats.get(Counter::CalleesRejected), 7);
    assert_eq!(ctx.events.count_kind(EventKind::CalleeRejected), 7);
    assert_eq!(*ctx.module.function(main).unwrap(), *before);
}

#[test]
fn test_indirect_call_is_rejected() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let slot = b.alloc_stack(t.drawable);
                    b.init_existential_addr(slot, t.circle);
                    let closure = b.partial_apply(Callee::Function(render), &[], t.int);
                    b.apply_with(ApplyKind::Apply, Callee::Value(closure), &[], &[slot], None);
                    b.dealloc_stack(slot);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let outcomes = specialize(&ctx, main);
    assert_eq!(
        outcomes,
        vec![(
            InstrLocation::new(0, 3),
            SiteOutcome::RejectedByCallee(CalleeRejection::IndirectCallee)
        )]
    );
}

#[test]
fn test_any_and_any_object_are_not_specialized() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let show = module
        .add_function(
            FunctionBuilder::new(
                "show",
                FunctionSignature::new(vec![
                    Parameter::new(t.any, ParameterConvention::IndirectBorrowed),
                    Parameter::new(t.any_object, ParameterConvention::ByValue),
                ]),
            )
            .build_with(|f| f.block(0, |b| b.ret(None))),
        )
        .unwrap();
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let slot = b.alloc_stack(t.any);
                    b.init_existential_addr(slot, t.circle);
                    let tree = b.alloc_ref(t.tree);
                    let object = b.init_existential_ref(tree, t.tree, t.any_object);
                    b.apply(show, &[slot, object], None);
                    b.dealloc_stack(slot);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let outcomes = specialize(&ctx, main);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1, SiteOutcome::RejectedByArguments);
    assert!(ctx.module.specializations_of(show).is_empty());
}

#[test]
fn test_unknown_concrete_type_is_not_specialized() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let forward = module
        .add_function(
            FunctionBuilder::new(
                "forward",
                FunctionSignature::new(vec![Parameter::new(
                    t.drawable,
                    ParameterConvention::IndirectBorrowed,
                )]),
            )
            .build_with(|f| {
                let shape = f.arg(0);
                f.block(0, |b| {
                    b.apply(render, &[shape], None);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let outcomes = specialize(&ctx, forward);
    assert_eq!(
        outcomes,
        vec![(InstrLocation::new(0, 0), SiteOutcome::RejectedByArguments)]
    );
    assert_eq!(ctx.stats.get(Counter::ArgumentsRejected), 1);
}

#[test]
fn test_mixed_parameters() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let blend = module
        .add_function(
            FunctionBuilder::new(
                "blend",
                FunctionSignature::new(vec![
                    Parameter::new(t.drawable, ParameterConvention::IndirectBorrowed),
                    Parameter::new(t.int, ParameterConvention::ByValue),
                    Parameter::new(t.drawable, ParameterConvention::IndirectBorrowed),
                ]),
            )
            .build_with(|f| {
                let (a, c) = (f.arg(0), f.arg(2));
                f.block(0, |b| {
                    b.witness_call(a, "draw", &[], None);
                    b.witness_call(c, "draw", &[], None);
                    b.ret(None);
                });
            }),
        )
        .unwrap();
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let first = b.alloc_stack(t.drawable);
                    b.init_existential_addr(first, t.circle);
                    let second = b.alloc_stack(t.drawable);
                    b.init_existential_addr(second, t.square);
                    let alpha = b.literal(t.int, 50);
                    b.apply(blend, &[first, alpha, second], None);
                    b.dealloc_stack(second);
                    b.dealloc_stack(first);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let mut function = Function::clone(&ctx.module.function(main).unwrap());
    let outcomes = ExistentialSpecializerPass::new().specialize_function(&mut function, &ctx);
    assert!(outcomes[0].1.is_specialized());

    let clone = ctx.module.function_by_name("$es5blendg0_2_").unwrap();
    let params = &clone.signature().params;
    assert_eq!(clone.generic_params().len(), 2);
    assert_eq!(params[0].ty, clone.generic_params()[0]);
    assert_eq!(params[1].ty, t.int);
    assert_eq!(params[2].ty, clone.generic_params()[1]);

    let site = &sites(&function)[0];
    assert_eq!(site.substitutions(), &[t.circle, t.square]);
    assert_eq!(site.argument(1).and_then(|a| function.body().unwrap().value_type(a)), Some(t.int));
}

#[test]
fn test_unresolved_parameter_is_passed_through() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let blend = module
        .add_function(
            FunctionBuilder::new(
                "blend",
                FunctionSignature::new(vec![
                    Parameter::new(t.drawable, ParameterConvention::IndirectBorrowed),
                    Parameter::new(t.int, ParameterConvention::ByValue),
                    Parameter::new(t.drawable, ParameterConvention::IndirectBorrowed),
                ]),
            )
            .build_with(|f| {
                let (a, c) = (f.arg(0), f.arg(2));
                f.block(0, |b| {
                    b.witness_call(a, "draw", &[], None);
                    b.witness_call(c, "draw", &[], None);
                    b.ret(None);
                });
            }),
        )
        .unwrap();
    let mut chosen = None;
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                let mut slots = None;
                f.block(0, |b| {
                    let known = b.alloc_stack(t.drawable);
                    b.init_existential_addr(known, t.circle);
                    let either = b.alloc_stack(t.drawable);
                    let flag = b.literal(t.int, 1);
                    b.cond_br(flag, 1, 2);
                    slots = Some((known, either));
                });
                let (known, either) = slots.unwrap();
                f.block(1, |b| {
                    b.init_existential_addr(either, t.circle);
                    b.br(3);
                });
                f.block(2, |b| {
                    b.init_existential_addr(either, t.square);
                    b.br(3);
                });
                f.block(3, |b| {
                    let alpha = b.literal(t.int, 50);
                    b.apply(blend, &[known, alpha, either], None);
                    b.dealloc_stack(either);
                    b.dealloc_stack(known);
                    b.ret(None);
                });
                chosen = Some(either);
            }),
        )
        .unwrap();
    let either = chosen.unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let mut function = Function::clone(&ctx.module.function(main).unwrap());
    let outcomes = ExistentialSpecializerPass::new().specialize_function(&mut function, &ctx);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].1.is_specialized());

    let clone = ctx.module.function_by_name("$es5blendg0_").unwrap();
    let params = &clone.signature().params;
    assert_eq!(clone.generic_params().len(), 1);
    assert_eq!(params[0].ty, clone.generic_params()[0]);
    assert_eq!(params[1].ty, t.int);
    assert_eq!(params[2].ty, t.drawable);

    let site = &sites(&function)[0];
    assert_eq!(site.referenced_function(), Some(clone.id()));
    assert_eq!(site.substitutions(), &[t.circle]);
    assert_eq!(site.argument(2), Some(either));
}

#[test]
fn test_witness_call_before_apply_still_specializes() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let slot = b.alloc_stack(t.drawable);
                    b.init_existential_addr(slot, t.square);
                    b.witness_call(slot, "draw", &[], None);
                    b.apply(render, &[slot], None);
                    b.destroy_addr(slot);
                    b.dealloc_stack(slot);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let outcomes = specialize(&ctx, main);
    assert!(outcomes[0].1.is_specialized());
    assert!(ctx.module.function_by_name("$es6renderg0_").is_some());
}

#[test]
fn test_consumed_argument_with_release() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let consume = drawing_callee(&module, &t, "consume", ParameterConvention::IndirectConsumed);
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let slot = b.alloc_stack(t.drawable);
                    b.init_existential_addr(slot, t.circle);
                    b.apply(consume, &[slot], None);
                    b.dealloc_stack(slot);
                    b.ret(None);
                });
            }),
        )
        .unwrap();

    let ctx = OptimizerContext::new(module, sequential());
    let mut function = Function::clone(&ctx.module.function(main).unwrap());
    let outcomes = ExistentialSpecializerPass::new().specialize_function(&mut function, &ctx);
    assert!(outcomes[0].1.is_specialized());

    let caller_ops = ops(&function, 0);
    assert!(matches!(
        caller_ops[2],
        Op::OpenExistentialAddr { access: AccessMode::Immutable, .. }
    ));
    assert!(matches!(caller_ops[3], Op::AllocStack { .. }));
    assert!(matches!(caller_ops[4], Op::CopyAddr { take: false, init: true, .. }));
    assert!(matches!(caller_ops[5], Op::Apply { .. }));
    assert!(matches!(caller_ops[6], Op::DestroyAddr { .. }));
    assert!(matches!(caller_ops[7], Op::DeallocStack { .. }));

    let clone = ctx.module.function_by_name("$es7consumeg0_").unwrap();
    let clone_ops = ops(&clone, 0);
    assert!(matches!(clone_ops[2], Op::CopyAddr { take: true, init: true, .. }));
    let n = clone_ops.len();
    assert!(matches!(clone_ops[n - 2], Op::DeallocStack { .. }));
    assert!(matches!(clone_ops[n - 3], Op::DestroyAddr { .. }), "original release is kept");
}

#[test]
fn test_class_existential_end_to_end() -> Result<()> {
    let module = Module::new("shapes");
    let t = declare(&module);
    let attach = module.add_function(
        FunctionBuilder::new(
            "attach",
            FunctionSignature::new(vec![Parameter::new(t.node, ParameterConvention::ByValue)]),
        )
        .build_with(|f| f.block(0, |b| b.ret(None))),
    )?;
    let main = module.add_function(
        FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
            f.block(0, |b| {
                let tree = b.alloc_ref(t.tree);
                let node = b.init_existential_ref(tree, t.tree, t.node);
                b.apply(attach, &[node], None);
                b.ret(None);
            });
        }),
    )?;

    let ctx = OptimizerContext::new(module, OptimizerConfig::default());
    PassManager::new()
        .with_pass(Box::new(ExistentialSpecializerPass::new()))
        .run(&ctx)?;

    let main = ctx.module.function(main).unwrap();
    let main_ops = ops(&main, 0);
    assert!(matches!(main_ops[2], Op::OpenExistentialRef { .. }));
    let site = &sites(&main)[0];
    assert_eq!(site.substitutions(), &[t.tree]);

    let clone = ctx.module.function(site.referenced_function().unwrap()).unwrap();
    assert!(matches!(ops(&clone, 0)[0], Op::InitExistentialRef { .. }));
    assert_eq!(clone.specialized_from(), Some(attach));
    Ok(())
}

#[derive(Default, Clone)]
struct RecordingEngine {
    requests: Arc<Mutex<Vec<SpecializationRequest>>>,
}

impl TransformEngine for RecordingEngine {
    fn specialize(
        &self,
        request: &SpecializationRequest,
        _caller: &mut Function,
        _module: &Module,
    ) -> std::result::Result<Specialization, Decline> {
        self.requests.lock().unwrap().push(request.clone());
        Err(Decline::NothingToSpecialize)
    }
}

#[test]
fn test_engine_receives_descriptors() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let update = drawing_callee(&module, &t, "update", ParameterConvention::IndirectMutable);
    let count = module
        .add_function(
            FunctionBuilder::new(
                "count",
                FunctionSignature::new(vec![Parameter::new(t.int, ParameterConvention::ByValue)]),
            )
            .build_with(|f| f.block(0, |b| b.ret(None))),
        )
        .unwrap();
    let main = module
        .add_function(
            FunctionBuilder::new("main", FunctionSignature::default()).build_with(|f| {
                f.block(0, |b| {
                    let n = b.literal(t.int, 1);
                    b.apply(count, &[n], None);
                    let slot = b.alloc_stack(t.drawable);
                    b.init_existential_addr(slot, t.square);
                    b.apply(update, &[slot], None);
                    b.destroy_addr(slot);
                    b.dealloc_stack(slot);
                    b.ret(None);
                });
            }),
        )
        .unwrap();
    let before = module.function(main).unwrap();

    let engine = RecordingEngine::default();
    let pass = ExistentialSpecializerPass::with_engine(Box::new(engine.clone()));
    let ctx = OptimizerContext::new(module, sequential());
    let mut function = Function::clone(&ctx.module.function(main).unwrap());
    let outcomes = pass.specialize_function(&mut function, &ctx);

    assert_eq!(
        outcomes,
        vec![
            (InstrLocation::new(0, 1), SiteOutcome::RejectedByArguments),
            (
                InstrLocation::new(0, 4),
                SiteOutcome::DeclinedByEngine(Decline::NothingToSpecialize)
            ),
        ]
    );
    assert_eq!(function, *before);

    let requests = engine.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "only the site with a candidate reaches the engine");
    let request = &requests[0];
    assert_eq!(request.callee, update);
    assert_eq!(request.site, InstrLocation::new(0, 4));
    assert_eq!(request.name, "$es6updateg0_");
    assert_eq!(request.indices(), vec![0]);
    let descriptor = &request.existential_args[&0];
    assert_eq!(descriptor.concrete, t.square);
    assert_eq!(descriptor.access, AccessMode::Mutable);
    assert!(!descriptor.releases_storage);
    assert_eq!(ctx.stats.get(Counter::EngineDeclined), 1);
}

#[test]
fn test_rewrite_preserves_instruction_order() {
    let module = Module::new("shapes");
    let t = declare(&module);
    let render = drawing_callee(&module, &t, "render", ParameterConvention::IndirectBorrowed);
    let main = wrapping_caller(&module, &t, "main", render, &[t.circle]);

    let ctx = OptimizerContext::new(module, sequential());
    let mut function = Function::clone(&ctx.module.function(main).unwrap());
    let outcomes = ExistentialSpecializerPass::new().specialize_function(&mut function, &ctx);
    assert_eq!(outcomes.len(), 1, "inserted instructions are not revisited");

    let kinds: Vec<bool> = function
        .body()
        .unwrap()
        .block(0)
        .unwrap()
        .instructions()
        .iter()
        .map(Instruction::is_synthetic)
        .collect();
    assert_eq!(kinds, vec![false, false, true, true, false, false, false]);
}
