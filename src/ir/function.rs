//! Functions, their signatures and their SSA bodies.
//!
//! A [`Function`] carries the static attributes optimization passes filter on
//! (linkage, inline strategy, optimization mode, calling convention
//! representation) and an optional [`FunctionBody`]. Functions without a body
//! are declarations whose definition lives elsewhere.

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::{
    Block, FullApplySite, InstrLocation, Instruction, TypeId, Value, ValueCategory, ValueId,
    ValueOrigin,
};

/// Identifier of a function within a [`crate::ir::Module`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct FunctionId(u32);

impl FunctionId {
    /// Creates a function id from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Ownership convention of a formal parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ParameterConvention {
    /// Passed by address; the callee may only read it.
    #[strum(serialize = "indirect_borrowed")]
    IndirectBorrowed,
    /// Passed by address; the callee may modify it in place.
    #[strum(serialize = "indirect_mutable")]
    IndirectMutable,
    /// Passed by address; the callee takes ownership and must release it.
    #[strum(serialize = "indirect_consumed")]
    IndirectConsumed,
    /// Passed directly as an object.
    #[strum(serialize = "by_value")]
    ByValue,
}

impl ParameterConvention {
    /// Returns `true` if the parameter is passed by address.
    #[must_use]
    pub const fn is_indirect(self) -> bool {
        !matches!(self, Self::ByValue)
    }

    /// Returns the category of the value the callee receives.
    #[must_use]
    pub const fn value_category(self) -> ValueCategory {
        if self.is_indirect() {
            ValueCategory::Address
        } else {
            ValueCategory::Object
        }
    }
}

/// Visibility and definition ownership of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Linkage {
    /// Visible everywhere, defined here.
    #[strum(serialize = "public")]
    Public,
    /// Visible within the program, defined here.
    #[strum(serialize = "hidden")]
    Hidden,
    /// May be emitted by several units; duplicates are merged.
    #[strum(serialize = "shared")]
    Shared,
    /// Visible only in this module.
    #[strum(serialize = "private")]
    Private,
    /// Body available for inspection, but materialized in another unit.
    #[strum(serialize = "public_external")]
    PublicExternal,
    /// Hidden definition materialized in another unit.
    #[strum(serialize = "hidden_external")]
    HiddenExternal,
    /// Shared definition materialized in another unit.
    #[strum(serialize = "shared_external")]
    SharedExternal,
}

impl Linkage {
    /// Returns `true` if the body is owned by another compilation unit.
    #[must_use]
    pub const fn is_available_externally(self) -> bool {
        matches!(
            self,
            Self::PublicExternal | Self::HiddenExternal | Self::SharedExternal
        )
    }
}

/// Inlining policy of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum InlineStrategy {
    /// The inliner decides.
    #[default]
    #[strum(serialize = "default")]
    Default,
    /// Never inline.
    #[strum(serialize = "never")]
    Never,
    /// Always inline.
    #[strum(serialize = "always")]
    Always,
}

/// Whether a function takes part in optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum OptimizationMode {
    /// Optimized normally.
    #[default]
    #[strum(serialize = "default")]
    Default,
    /// Opted out of every optimization.
    #[strum(serialize = "none")]
    None,
}

/// Calling convention representation of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum Representation {
    /// Free function without context.
    #[default]
    #[strum(serialize = "thin")]
    Thin,
    /// Closure with a context.
    #[strum(serialize = "thick")]
    Thick,
    /// Native method.
    #[strum(serialize = "method")]
    Method,
    /// Protocol witness.
    #[strum(serialize = "witness_method")]
    WitnessMethod,
    /// C function pointer.
    #[strum(serialize = "c")]
    CFunctionPointer,
    /// Method dispatched through the object runtime.
    #[strum(serialize = "objc_method")]
    ObjcMethod,
    /// Block invoked through the block-call convention.
    #[strum(serialize = "block")]
    Block,
}

impl Representation {
    /// Returns `true` for foreign conventions a clone cannot reproduce.
    #[must_use]
    pub const fn is_foreign_dispatch(self) -> bool {
        matches!(self, Self::ObjcMethod | Self::Block)
    }
}

/// A formal parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// Declared type.
    pub ty: TypeId,
    /// Ownership convention.
    pub convention: ParameterConvention,
}

impl Parameter {
    /// Creates a parameter.
    #[must_use]
    pub const fn new(ty: TypeId, convention: ParameterConvention) -> Self {
        Self { ty, convention }
    }
}

/// A formal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultInfo {
    /// Result type.
    pub ty: TypeId,
    /// Returned through caller-provided storage rather than directly.
    pub indirect: bool,
}

/// The type-level interface of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Formal parameters in order.
    pub params: Vec<Parameter>,
    /// Formal results in order.
    pub results: Vec<ResultInfo>,
    /// Type of the error result, if the function can throw.
    pub error_result: Option<TypeId>,
    /// Calling convention representation.
    pub representation: Representation,
}

impl FunctionSignature {
    /// Creates a signature with the given parameters and no results.
    #[must_use]
    pub fn new(params: Vec<Parameter>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Adds a direct result.
    #[must_use]
    pub fn returns(mut self, ty: TypeId) -> Self {
        self.results.push(ResultInfo {
            ty,
            indirect: false,
        });
        self
    }

    /// Adds a result returned through caller-provided storage.
    #[must_use]
    pub fn returns_indirect(mut self, ty: TypeId) -> Self {
        self.results.push(ResultInfo { ty, indirect: true });
        self
    }

    /// Adds an error result.
    #[must_use]
    pub fn throws(mut self, ty: TypeId) -> Self {
        self.error_result = Some(ty);
        self
    }

    /// Sets the representation.
    #[must_use]
    pub fn representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Returns the number of results returned through caller-provided storage.
    #[must_use]
    pub fn indirect_result_count(&self) -> usize {
        self.results.iter().filter(|r| r.indirect).count()
    }

    /// Returns `true` if the function has an error result.
    #[must_use]
    pub fn has_error_result(&self) -> bool {
        self.error_result.is_some()
    }
}

/// The SSA body of a function: blocks plus the value table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionBody {
    blocks: Vec<Block>,
    values: Vec<Value>,
    arguments: Vec<ValueId>,
}

impl FunctionBody {
    /// Creates a body whose argument values follow the given parameters.
    #[must_use]
    pub fn new(params: &[Parameter]) -> Self {
        let mut body = Self::default();
        for (index, param) in params.iter().enumerate() {
            // Parameter counts are bounded by signature limits
            #[allow(clippy::cast_possible_truncation)]
            let id = body.add_value(Value::new(
                param.ty,
                param.convention.value_category(),
                ValueOrigin::Argument(index as u16),
            ));
            body.arguments.push(id);
        }
        body
    }

    /// Adds a value to the value table and returns its id.
    pub fn add_value(&mut self, value: Value) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(value);
        id
    }

    /// Returns the metadata of a value.
    #[must_use]
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index())
    }

    /// Returns mutable metadata of a value.
    pub fn value_mut(&mut self, id: ValueId) -> Option<&mut Value> {
        self.values.get_mut(id.index())
    }

    /// Returns the type of a value.
    #[must_use]
    pub fn value_type(&self, id: ValueId) -> Option<TypeId> {
        self.value(id).map(Value::ty)
    }

    /// Returns the number of values.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Returns the value of the formal parameter at `index`.
    #[must_use]
    pub fn argument(&self, index: usize) -> Option<ValueId> {
        self.arguments.get(index).copied()
    }

    /// Returns the values of all formal parameters.
    #[must_use]
    pub fn arguments(&self) -> &[ValueId] {
        &self.arguments
    }

    /// Returns the blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns a block.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Appends a block.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Returns the instruction at a location.
    #[must_use]
    pub fn instruction(&self, location: InstrLocation) -> Option<&Instruction> {
        self.blocks
            .get(location.block)?
            .instruction(location.instruction)
    }

    /// Returns the mutable instruction at a location.
    pub fn instruction_mut(&mut self, location: InstrLocation) -> Option<&mut Instruction> {
        self.blocks
            .get_mut(location.block)?
            .instructions_mut()
            .get_mut(location.instruction)
    }

    /// Iterates over every instruction in block order.
    pub fn iter_instructions(&self) -> impl Iterator<Item = (InstrLocation, &Instruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .instructions()
                .iter()
                .enumerate()
                .map(move |(i, instruction)| (InstrLocation::new(b, i), instruction))
        })
    }

    /// Returns every full apply in block order.
    #[must_use]
    pub fn full_apply_sites(&self) -> Vec<FullApplySite> {
        self.iter_instructions()
            .filter_map(|(location, instruction)| FullApplySite::new(location, instruction))
            .collect()
    }

    /// Returns the locations of every return instruction.
    #[must_use]
    pub fn return_locations(&self) -> Vec<InstrLocation> {
        self.iter_instructions()
            .filter(|(_, instruction)| matches!(instruction.op(), crate::ir::Op::Return { .. }))
            .map(|(location, _)| location)
            .collect()
    }

    /// Rewrites every read of `from` (instruction operands and phi operands) into `to`.
    ///
    /// Returns the number of operands replaced.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        for block in &mut self.blocks {
            for phi in block.phis_mut() {
                replaced += phi.replace_uses(from, to);
            }
            for instruction in block.instructions_mut() {
                replaced += instruction.op_mut().replace_uses(from, to);
            }
        }
        replaced
    }

    /// Inserts instructions before the instruction at `location`.
    ///
    /// Returns `false` if the location is out of range.
    pub fn insert_before(&mut self, location: InstrLocation, instructions: Vec<Instruction>) -> bool {
        let Some(block) = self.blocks.get_mut(location.block) else {
            return false;
        };
        let list = block.instructions_mut();
        if location.instruction > list.len() {
            return false;
        }
        list.splice(location.instruction..location.instruction, instructions);
        true
    }
}

/// A function of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    id: FunctionId,
    name: String,
    signature: FunctionSignature,
    linkage: Linkage,
    inline_strategy: InlineStrategy,
    optimization_mode: OptimizationMode,
    generic_params: Vec<TypeId>,
    body: Option<FunctionBody>,
    specialized_from: Option<FunctionId>,
}

impl Function {
    /// Creates a public declaration. The id is assigned when the function is
    /// added to a module.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: FunctionSignature) -> Self {
        Self {
            id: FunctionId::new(u32::MAX),
            name: name.into(),
            signature,
            linkage: Linkage::Public,
            inline_strategy: InlineStrategy::Default,
            optimization_mode: OptimizationMode::Default,
            generic_params: Vec::new(),
            body: None,
            specialized_from: None,
        }
    }

    /// Returns the function id.
    #[must_use]
    pub const fn id(&self) -> FunctionId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: FunctionId) {
        self.id = id;
    }

    /// Returns the symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the signature.
    #[must_use]
    pub const fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    /// Renames a function that is not registered in a module yet.
    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns a mutable signature.
    pub fn signature_mut(&mut self) -> &mut FunctionSignature {
        &mut self.signature
    }

    /// Returns the linkage.
    #[must_use]
    pub const fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Sets the linkage.
    pub fn set_linkage(&mut self, linkage: Linkage) {
        self.linkage = linkage;
    }

    /// Returns the inlining policy.
    #[must_use]
    pub const fn inline_strategy(&self) -> InlineStrategy {
        self.inline_strategy
    }

    /// Sets the inlining policy.
    pub fn set_inline_strategy(&mut self, strategy: InlineStrategy) {
        self.inline_strategy = strategy;
    }

    /// Returns the optimization mode.
    #[must_use]
    pub const fn optimization_mode(&self) -> OptimizationMode {
        self.optimization_mode
    }

    /// Sets the optimization mode.
    pub fn set_optimization_mode(&mut self, mode: OptimizationMode) {
        self.optimization_mode = mode;
    }

    /// Returns `false` if the function opted out of optimization.
    #[must_use]
    pub fn should_optimize(&self) -> bool {
        self.optimization_mode != OptimizationMode::None
    }

    /// Returns the generic parameters, `τ_0` first.
    #[must_use]
    pub fn generic_params(&self) -> &[TypeId] {
        &self.generic_params
    }

    /// Replaces the generic parameters.
    pub fn set_generic_params(&mut self, params: Vec<TypeId>) {
        self.generic_params = params;
    }

    /// Returns `true` if the function has a body.
    #[must_use]
    pub fn is_definition(&self) -> bool {
        self.body.is_some()
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> Option<&FunctionBody> {
        self.body.as_ref()
    }

    /// Returns a mutable body.
    pub fn body_mut(&mut self) -> Option<&mut FunctionBody> {
        self.body.as_mut()
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: Option<FunctionBody>) {
        self.body = body;
    }

    /// Returns the function this one is a specialized clone of.
    #[must_use]
    pub const fn specialized_from(&self) -> Option<FunctionId> {
        self.specialized_from
    }

    /// Records the function this one was cloned from.
    pub fn set_specialized_from(&mut self, original: Option<FunctionId>) {
        self.specialized_from = original;
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {} @{}", self.linkage, self.name)?;
        if !self.generic_params.is_empty() {
            let params: Vec<String> = self.generic_params.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", params.join(", "))?;
        }
        let params: Vec<String> = self
            .signature
            .params
            .iter()
            .map(|p| format!("{} {}", p.convention, p.ty))
            .collect();
        write!(f, "({})", params.join(", "))?;

        let Some(body) = &self.body else {
            return writeln!(f);
        };
        writeln!(f, " {{")?;
        for block in body.blocks() {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}
