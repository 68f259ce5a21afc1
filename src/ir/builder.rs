//! Closure-based construction of functions.
//!
//! The builder keeps the control flow structure of a function visible in the
//! code that creates it:
//!
//! ```rust
//! use exspec::ir::{
//!     FunctionBuilder, FunctionSignature, Parameter, ParameterConvention, Protocol, TypeTable,
//! };
//!
//! let types = TypeTable::new();
//! let drawable = types.declare_protocol(Protocol::new("Drawable").requirement("draw"));
//! let shape = types.existential([drawable]);
//!
//! let render = FunctionBuilder::new(
//!     "render",
//!     FunctionSignature::new(vec![Parameter::new(shape, ParameterConvention::IndirectBorrowed)]),
//! )
//! .build_with(|f| {
//!     let arg = f.arg(0);
//!     f.block(0, |b| {
//!         let payload = b.open_existential_addr_immutable(arg, shape);
//!         b.witness_call(payload, "draw", &[], None);
//!         b.ret(None);
//!     });
//! });
//!
//! assert!(render.is_definition());
//! ```

use std::collections::BTreeMap;

use crate::ir::{
    AccessMode, ApplyKind, Block, Callee, Function, FunctionBody, FunctionId, FunctionSignature,
    InlineStrategy, Instruction, Linkage, Op, OptimizationMode, PhiNode, TypeId, Value,
    ValueCategory, ValueId, ValueOrigin,
};

/// Builder for a [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    body: FunctionBody,
    blocks: BTreeMap<usize, Block>,
}

impl FunctionBuilder {
    /// Creates a builder for a public function with default attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: FunctionSignature) -> Self {
        let body = FunctionBody::new(&signature.params);
        Self {
            function: Function::new(name, signature),
            body,
            blocks: BTreeMap::new(),
        }
    }

    /// Sets the linkage.
    #[must_use]
    pub fn linkage(mut self, linkage: Linkage) -> Self {
        self.function.set_linkage(linkage);
        self
    }

    /// Sets the inlining policy.
    #[must_use]
    pub fn inline_strategy(mut self, strategy: InlineStrategy) -> Self {
        self.function.set_inline_strategy(strategy);
        self
    }

    /// Opts the function out of optimization.
    #[must_use]
    pub fn no_optimize(mut self) -> Self {
        self.function.set_optimization_mode(OptimizationMode::None);
        self
    }

    /// Sets the generic parameters.
    #[must_use]
    pub fn generic_params(mut self, params: Vec<TypeId>) -> Self {
        self.function.set_generic_params(params);
        self
    }

    /// Finishes the function as a declaration without a body.
    #[must_use]
    pub fn declaration(self) -> Function {
        self.function
    }

    /// Builds a definition using a closure that defines all blocks.
    ///
    /// Blocks missing between the ones defined are filled with empty blocks
    /// so that block ids equal their indices.
    pub fn build_with<F>(mut self, f: F) -> Function
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let mut ctx = FunctionContext { builder: &mut self };
        f(&mut ctx);

        let Self {
            mut function,
            mut body,
            mut blocks,
        } = self;

        if let Some(last) = blocks.keys().next_back().copied() {
            for id in 0..=last {
                body.add_block(blocks.remove(&id).unwrap_or_else(|| Block::new(id)));
            }
        }

        function.set_body(Some(body));
        function
    }

    fn new_value(&mut self, ty: TypeId, category: ValueCategory, origin: ValueOrigin) -> ValueId {
        self.body.add_value(Value::new(ty, category, origin))
    }
}

/// Context handed to [`FunctionBuilder::build_with`].
pub struct FunctionContext<'a> {
    builder: &'a mut FunctionBuilder,
}

impl FunctionContext<'_> {
    /// Returns the value of the formal parameter at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a parameter position.
    #[must_use]
    pub fn arg(&self, index: usize) -> ValueId {
        self.builder.body.arguments()[index]
    }

    /// Allocates a phi result ahead of its definition.
    pub fn phi_value(&mut self, ty: TypeId, category: ValueCategory) -> ValueId {
        self.builder.new_value(ty, category, ValueOrigin::Phi)
    }

    /// Defines block `id`.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let mut block = Block::new(id);
        let mut block_builder = BlockBuilder {
            builder: self.builder,
            block: &mut block,
        };
        f(&mut block_builder);
        self.builder.blocks.insert(id, block);
    }
}

/// Builder for the contents of one block.
///
/// Value-producing methods return the new [`ValueId`].
pub struct BlockBuilder<'a> {
    builder: &'a mut FunctionBuilder,
    block: &'a mut Block,
}

impl BlockBuilder<'_> {
    fn object(&mut self, ty: TypeId) -> ValueId {
        self.builder
            .new_value(ty, ValueCategory::Object, ValueOrigin::Instruction)
    }

    fn address(&mut self, ty: TypeId) -> ValueId {
        self.builder
            .new_value(ty, ValueCategory::Address, ValueOrigin::Instruction)
    }

    fn type_of(&self, value: ValueId) -> TypeId {
        self.builder
            .body
            .value_type(value)
            .unwrap_or_else(|| TypeId::new(u32::MAX))
    }

    fn emit(&mut self, op: Op) {
        self.block.push(Instruction::new(op));
    }

    /// Adds a phi node whose result was allocated with [`FunctionContext::phi_value`].
    pub fn phi(&mut self, result: ValueId, operands: &[(usize, ValueId)]) {
        let mut phi = PhiNode::new(result);
        for &(pred, value) in operands {
            phi.add_operand(pred, value);
        }
        self.block.add_phi(phi);
    }

    /// `literal`
    pub fn literal(&mut self, ty: TypeId, value: i64) -> ValueId {
        let dest = self.object(ty);
        self.emit(Op::Literal { dest, value });
        dest
    }

    /// `construct`
    pub fn construct(&mut self, ty: TypeId, operands: &[ValueId]) -> ValueId {
        let dest = self.object(ty);
        self.emit(Op::Construct {
            dest,
            ty,
            operands: operands.to_vec(),
        });
        dest
    }

    /// `alloc_stack`
    pub fn alloc_stack(&mut self, ty: TypeId) -> ValueId {
        let dest = self.address(ty);
        self.emit(Op::AllocStack { dest, ty });
        dest
    }

    /// `dealloc_stack`
    pub fn dealloc_stack(&mut self, operand: ValueId) {
        self.emit(Op::DeallocStack { operand });
    }

    /// `alloc_ref`
    pub fn alloc_ref(&mut self, ty: TypeId) -> ValueId {
        let dest = self.object(ty);
        self.emit(Op::AllocRef { dest, ty });
        dest
    }

    /// `load`
    pub fn load(&mut self, src: ValueId) -> ValueId {
        let ty = self.type_of(src);
        let dest = self.object(ty);
        self.emit(Op::Load { dest, src });
        dest
    }

    /// `store`
    pub fn store(&mut self, src: ValueId, dest: ValueId) {
        self.emit(Op::Store { src, dest });
    }

    /// `copy_addr`
    pub fn copy_addr(&mut self, src: ValueId, dest: ValueId, take: bool, init: bool) {
        self.emit(Op::CopyAddr {
            src,
            dest,
            take,
            init,
        });
    }

    /// `init_existential_addr`
    pub fn init_existential_addr(&mut self, existential: ValueId, concrete: TypeId) -> ValueId {
        let dest = self.address(concrete);
        self.emit(Op::InitExistentialAddr {
            dest,
            existential,
            concrete,
        });
        dest
    }

    /// `init_existential_ref`
    pub fn init_existential_ref(
        &mut self,
        operand: ValueId,
        concrete: TypeId,
        existential_ty: TypeId,
    ) -> ValueId {
        let dest = self.object(existential_ty);
        self.emit(Op::InitExistentialRef {
            dest,
            operand,
            concrete,
            existential_ty,
        });
        dest
    }

    /// `open_existential_addr`
    pub fn open_existential_addr(
        &mut self,
        operand: ValueId,
        access: AccessMode,
        opened: TypeId,
    ) -> ValueId {
        let dest = self.address(opened);
        self.emit(Op::OpenExistentialAddr {
            dest,
            operand,
            access,
            opened,
        });
        dest
    }

    /// `open_existential_addr immutable_access`
    pub fn open_existential_addr_immutable(&mut self, operand: ValueId, opened: TypeId) -> ValueId {
        self.open_existential_addr(operand, AccessMode::Immutable, opened)
    }

    /// `open_existential_ref`
    pub fn open_existential_ref(&mut self, operand: ValueId, opened: TypeId) -> ValueId {
        let dest = self.object(opened);
        self.emit(Op::OpenExistentialRef {
            dest,
            operand,
            opened,
        });
        dest
    }

    /// `deinit_existential_addr`
    pub fn deinit_existential_addr(&mut self, operand: ValueId) {
        self.emit(Op::DeinitExistentialAddr { operand });
    }

    /// `destroy_addr`
    pub fn destroy_addr(&mut self, operand: ValueId) {
        self.emit(Op::DestroyAddr { operand });
    }

    /// `witness_call`
    pub fn witness_call(
        &mut self,
        receiver: ValueId,
        requirement: &str,
        args: &[ValueId],
        result: Option<TypeId>,
    ) -> Option<ValueId> {
        let dest = result.map(|ty| self.object(ty));
        self.emit(Op::WitnessCall {
            dest,
            receiver,
            requirement: requirement.to_string(),
            args: args.to_vec(),
        });
        dest
    }

    /// Plain `apply` of a function of the module.
    pub fn apply(
        &mut self,
        callee: FunctionId,
        args: &[ValueId],
        result: Option<TypeId>,
    ) -> Option<ValueId> {
        self.apply_with(
            ApplyKind::Apply,
            Callee::Function(callee),
            &[],
            args,
            result,
        )
    }

    /// Full apply with explicit kind, target and substitutions.
    pub fn apply_with(
        &mut self,
        kind: ApplyKind,
        callee: Callee,
        substitutions: &[TypeId],
        args: &[ValueId],
        result: Option<TypeId>,
    ) -> Option<ValueId> {
        let dest = result.map(|ty| self.object(ty));
        self.emit(Op::Apply {
            dest,
            kind,
            callee,
            substitutions: substitutions.to_vec(),
            args: args.to_vec(),
        });
        dest
    }

    /// `partial_apply`
    pub fn partial_apply(&mut self, callee: Callee, args: &[ValueId], ty: TypeId) -> ValueId {
        let dest = self.object(ty);
        self.emit(Op::PartialApply {
            dest,
            callee,
            args: args.to_vec(),
        });
        dest
    }

    /// `br`
    pub fn br(&mut self, target: usize) {
        self.emit(Op::Branch { target });
    }

    /// `cond_br`
    pub fn cond_br(&mut self, condition: ValueId, then_block: usize, else_block: usize) {
        self.emit(Op::CondBranch {
            condition,
            then_block,
            else_block,
        });
    }

    /// `return`
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.emit(Op::Return { value });
    }
}
