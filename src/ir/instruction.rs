//! Instructions in SSA form with explicit def/use information.
//!
//! Each [`Instruction`] wraps an [`Op`] in `dest = op(operands)` form. The
//! operation set is deliberately small: it covers memory, existential
//! wrapping/opening, dynamic dispatch, calls and control flow, which is all
//! the existential specializer and its transform need to reason about.
//!
//! # Existential Operations
//!
//! | Op | Meaning |
//! |----|---------|
//! | [`Op::InitExistentialAddr`] | Prepare opaque existential storage for a concrete payload; yields the payload address |
//! | [`Op::InitExistentialRef`] | Wrap a class reference into a class existential |
//! | [`Op::OpenExistentialAddr`] | Project the payload address out of opaque existential storage |
//! | [`Op::OpenExistentialRef`] | Extract the reference out of a class existential |
//! | [`Op::DeinitExistentialAddr`] | Release the container of an existential whose payload was moved out |
//! | [`Op::DestroyAddr`] | Destroy the value stored at an address, releasing its storage |

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::{FunctionId, TypeId, ValueId};

/// How an opened existential is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum AccessMode {
    /// The payload is only read.
    #[strum(serialize = "immutable_access")]
    Immutable,
    /// The payload may be modified or consumed.
    #[strum(serialize = "mutable_access")]
    Mutable,
}

/// The flavor of a full apply.
///
/// Every variant transfers control to the callee and resumes in the caller.
/// Partial applications are a separate op ([`Op::PartialApply`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ApplyKind {
    /// Plain call.
    #[strum(serialize = "apply")]
    Apply,
    /// Call of a function with an error result; the error edge is implicit.
    #[strum(serialize = "try_apply")]
    TryApply,
    /// Start of a coroutine call.
    #[strum(serialize = "begin_apply")]
    BeginApply,
}

/// The target of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Statically resolved reference to a function of the module.
    Function(FunctionId),
    /// Indirect call through a function value.
    Value(ValueId),
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(id) => write!(f, "@{id}"),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// A decomposed SSA operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `dest = literal value`
    Literal {
        /// Result.
        dest: ValueId,
        /// Integer value.
        value: i64,
    },
    /// `dest = construct ty(operands)` - builds a value of a nominal type.
    Construct {
        /// Result.
        dest: ValueId,
        /// Constructed type.
        ty: TypeId,
        /// Field values.
        operands: Vec<ValueId>,
    },
    /// `dest = alloc_stack ty`
    AllocStack {
        /// Address of the allocation.
        dest: ValueId,
        /// Allocated type.
        ty: TypeId,
    },
    /// `dealloc_stack operand`
    DeallocStack {
        /// Address returned by `alloc_stack`.
        operand: ValueId,
    },
    /// `dest = alloc_ref ty` - allocates a class instance.
    AllocRef {
        /// Reference to the new instance.
        dest: ValueId,
        /// Class type.
        ty: TypeId,
    },
    /// `dest = load src`
    Load {
        /// Loaded value.
        dest: ValueId,
        /// Source address.
        src: ValueId,
    },
    /// `store src to dest`
    Store {
        /// Stored value.
        src: ValueId,
        /// Destination address.
        dest: ValueId,
    },
    /// `copy_addr [take] src to [init] dest`
    CopyAddr {
        /// Source address.
        src: ValueId,
        /// Destination address.
        dest: ValueId,
        /// The source is consumed by the copy.
        take: bool,
        /// The destination is uninitialized before the copy.
        init: bool,
    },
    /// `dest = init_existential_addr existential, concrete`
    InitExistentialAddr {
        /// Address of the payload, typed as the concrete type.
        dest: ValueId,
        /// Address of the existential storage being initialized.
        existential: ValueId,
        /// Concrete type stored in the existential.
        concrete: TypeId,
    },
    /// `dest = init_existential_ref operand : concrete, existential_ty`
    InitExistentialRef {
        /// Resulting existential.
        dest: ValueId,
        /// Class reference being wrapped.
        operand: ValueId,
        /// Concrete type of `operand`.
        concrete: TypeId,
        /// Existential type of `dest`.
        existential_ty: TypeId,
    },
    /// `dest = open_existential_addr access operand as opened`
    OpenExistentialAddr {
        /// Address of the payload.
        dest: ValueId,
        /// Address of the existential storage.
        operand: ValueId,
        /// How the payload is used afterwards.
        access: AccessMode,
        /// Type of the payload.
        opened: TypeId,
    },
    /// `dest = open_existential_ref operand as opened`
    OpenExistentialRef {
        /// The extracted reference.
        dest: ValueId,
        /// Class existential.
        operand: ValueId,
        /// Type of the reference.
        opened: TypeId,
    },
    /// `deinit_existential_addr operand`
    DeinitExistentialAddr {
        /// Address of the existential storage.
        operand: ValueId,
    },
    /// `destroy_addr operand`
    DestroyAddr {
        /// Address whose value is destroyed.
        operand: ValueId,
    },
    /// `dest = witness_call receiver.requirement(args)` - dynamic dispatch through a conformance.
    WitnessCall {
        /// Result, if the requirement returns a value.
        dest: Option<ValueId>,
        /// The value the requirement is invoked on.
        receiver: ValueId,
        /// Requirement name.
        requirement: String,
        /// Additional arguments.
        args: Vec<ValueId>,
    },
    /// `dest = apply callee<substitutions>(args)`
    Apply {
        /// Result, if the callee returns a value.
        dest: Option<ValueId>,
        /// Plain, throwing or coroutine call.
        kind: ApplyKind,
        /// Call target.
        callee: Callee,
        /// Replacement types for the callee's generic parameters, in order.
        substitutions: Vec<TypeId>,
        /// Arguments, aligned with the callee's parameters.
        args: Vec<ValueId>,
    },
    /// `dest = partial_apply callee(args)` - builds a closure, does not transfer control.
    PartialApply {
        /// The closure.
        dest: ValueId,
        /// Closed-over function.
        callee: Callee,
        /// Captured arguments.
        args: Vec<ValueId>,
    },
    /// `br target`
    Branch {
        /// Successor block.
        target: usize,
    },
    /// `cond_br condition, then_block, else_block`
    CondBranch {
        /// Branch condition.
        condition: ValueId,
        /// Successor when the condition is non-zero.
        then_block: usize,
        /// Successor otherwise.
        else_block: usize,
    },
    /// `return value`
    Return {
        /// Returned value, if any.
        value: Option<ValueId>,
    },
}

impl Op {
    /// Returns the value defined by this operation, if any.
    #[must_use]
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Self::Literal { dest, .. }
            | Self::Construct { dest, .. }
            | Self::AllocStack { dest, .. }
            | Self::AllocRef { dest, .. }
            | Self::Load { dest, .. }
            | Self::InitExistentialAddr { dest, .. }
            | Self::InitExistentialRef { dest, .. }
            | Self::OpenExistentialAddr { dest, .. }
            | Self::OpenExistentialRef { dest, .. }
            | Self::PartialApply { dest, .. } => Some(*dest),
            Self::WitnessCall { dest, .. } | Self::Apply { dest, .. } => *dest,
            Self::DeallocStack { .. }
            | Self::Store { .. }
            | Self::CopyAddr { .. }
            | Self::DeinitExistentialAddr { .. }
            | Self::DestroyAddr { .. }
            | Self::Branch { .. }
            | Self::CondBranch { .. }
            | Self::Return { .. } => None,
        }
    }

    /// Returns the values read by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        match self {
            Self::Literal { .. }
            | Self::AllocStack { .. }
            | Self::AllocRef { .. }
            | Self::Branch { .. } => Vec::new(),
            Self::Construct { operands, .. } => operands.clone(),
            Self::DeallocStack { operand }
            | Self::DeinitExistentialAddr { operand }
            | Self::DestroyAddr { operand }
            | Self::InitExistentialRef { operand, .. }
            | Self::OpenExistentialAddr { operand, .. }
            | Self::OpenExistentialRef { operand, .. } => vec![*operand],
            Self::Load { src, .. } => vec![*src],
            Self::Store { src, dest } | Self::CopyAddr { src, dest, .. } => vec![*src, *dest],
            Self::InitExistentialAddr { existential, .. } => vec![*existential],
            Self::WitnessCall { receiver, args, .. } => {
                let mut uses = Vec::with_capacity(args.len() + 1);
                uses.push(*receiver);
                uses.extend(args.iter().copied());
                uses
            }
            Self::Apply { callee, args, .. } | Self::PartialApply { callee, args, .. } => {
                let mut uses = Vec::with_capacity(args.len() + 1);
                if let Callee::Value(value) = callee {
                    uses.push(*value);
                }
                uses.extend(args.iter().copied());
                uses
            }
            Self::CondBranch { condition, .. } => vec![*condition],
            Self::Return { value } => value.iter().copied().collect(),
        }
    }

    /// Rewrites every read of `from` into a read of `to`.
    ///
    /// Returns the number of operands that were replaced.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        let mut swap = |v: &mut ValueId| {
            if *v == from {
                *v = to;
                replaced += 1;
            }
        };

        match self {
            Self::Literal { .. }
            | Self::AllocStack { .. }
            | Self::AllocRef { .. }
            | Self::Branch { .. } => {}
            Self::Construct { operands, .. } => operands.iter_mut().for_each(&mut swap),
            Self::DeallocStack { operand }
            | Self::DeinitExistentialAddr { operand }
            | Self::DestroyAddr { operand }
            | Self::InitExistentialRef { operand, .. }
            | Self::OpenExistentialAddr { operand, .. }
            | Self::OpenExistentialRef { operand, .. } => swap(operand),
            Self::Load { src, .. } => swap(src),
            Self::Store { src, dest } | Self::CopyAddr { src, dest, .. } => {
                swap(src);
                swap(dest);
            }
            Self::InitExistentialAddr { existential, .. } => swap(existential),
            Self::WitnessCall { receiver, args, .. } => {
                swap(receiver);
                args.iter_mut().for_each(&mut swap);
            }
            Self::Apply { callee, args, .. } | Self::PartialApply { callee, args, .. } => {
                if let Callee::Value(value) = callee {
                    swap(value);
                }
                args.iter_mut().for_each(&mut swap);
            }
            Self::CondBranch { condition, .. } => swap(condition),
            Self::Return { value } => {
                if let Some(value) = value {
                    swap(value);
                }
            }
        }

        replaced
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Branch { .. } | Self::CondBranch { .. } | Self::Return { .. }
        )
    }

    /// Returns the successor blocks of a terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Self::Branch { target } => vec![*target],
            Self::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

fn join(values: &[ValueId]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dest) = self.dest() {
            write!(f, "{dest} = ")?;
        }

        match self {
            Self::Literal { value, .. } => write!(f, "literal {value}"),
            Self::Construct { ty, operands, .. } => {
                write!(f, "construct {ty}({})", join(operands))
            }
            Self::AllocStack { ty, .. } => write!(f, "alloc_stack {ty}"),
            Self::DeallocStack { operand } => write!(f, "dealloc_stack {operand}"),
            Self::AllocRef { ty, .. } => write!(f, "alloc_ref {ty}"),
            Self::Load { src, .. } => write!(f, "load {src}"),
            Self::Store { src, dest } => write!(f, "store {src} to {dest}"),
            Self::CopyAddr {
                src,
                dest,
                take,
                init,
            } => write!(
                f,
                "copy_addr {}{src} to {}{dest}",
                if *take { "[take] " } else { "" },
                if *init { "[init] " } else { "" }
            ),
            Self::InitExistentialAddr {
                existential,
                concrete,
                ..
            } => write!(f, "init_existential_addr {existential}, {concrete}"),
            Self::InitExistentialRef {
                operand,
                concrete,
                existential_ty,
                ..
            } => write!(
                f,
                "init_existential_ref {operand} : {concrete}, {existential_ty}"
            ),
            Self::OpenExistentialAddr {
                operand,
                access,
                opened,
                ..
            } => write!(f, "open_existential_addr {access} {operand} as {opened}"),
            Self::OpenExistentialRef {
                operand, opened, ..
            } => write!(f, "open_existential_ref {operand} as {opened}"),
            Self::DeinitExistentialAddr { operand } => {
                write!(f, "deinit_existential_addr {operand}")
            }
            Self::DestroyAddr { operand } => write!(f, "destroy_addr {operand}"),
            Self::WitnessCall {
                receiver,
                requirement,
                args,
                ..
            } => write!(f, "witness_call {receiver}.{requirement}({})", join(args)),
            Self::Apply {
                kind,
                callee,
                substitutions,
                args,
                ..
            } => {
                write!(f, "{kind} {callee}")?;
                if !substitutions.is_empty() {
                    let subs: Vec<String> = substitutions.iter().map(ToString::to_string).collect();
                    write!(f, "<{}>", subs.join(", "))?;
                }
                write!(f, "({})", join(args))
            }
            Self::PartialApply { callee, args, .. } => {
                write!(f, "partial_apply {callee}({})", join(args))
            }
            Self::Branch { target } => write!(f, "br bb{target}"),
            Self::CondBranch {
                condition,
                then_block,
                else_block,
            } => write!(f, "cond_br {condition}, bb{then_block}, bb{else_block}"),
            Self::Return { value: Some(value) } => write!(f, "return {value}"),
            Self::Return { value: None } => write!(f, "return"),
        }
    }
}

/// An instruction: an operation plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    op: Op,
    synthetic: bool,
}

impl Instruction {
    /// Creates an instruction that was part of the input program.
    #[must_use]
    pub const fn new(op: Op) -> Self {
        Self {
            op,
            synthetic: false,
        }
    }

    /// Creates an instruction inserted by an optimization.
    #[must_use]
    pub const fn synthetic(op: Op) -> Self {
        Self {
            op,
            synthetic: true,
        }
    }

    /// Returns the operation.
    #[must_use]
    pub const fn op(&self) -> &Op {
        &self.op
    }

    /// Returns a mutable reference to the operation.
    pub fn op_mut(&mut self) -> &mut Op {
        &mut self.op
    }

    /// Returns `true` if an optimization inserted this instruction.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Returns the value defined by this instruction, if any.
    #[must_use]
    pub fn dest(&self) -> Option<ValueId> {
        self.op.dest()
    }

    /// Returns the values read by this instruction.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        self.op.uses()
    }

    /// Returns `true` if this instruction ends its block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}
