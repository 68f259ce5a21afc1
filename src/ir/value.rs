//! SSA values and their origins.
//!
//! Every value in a function body is identified by a [`ValueId`] indexing the
//! body's value table. The table records the value's type, whether it is an
//! object or an address, and where it was defined.

use std::fmt;

use crate::ir::TypeId;

/// Unique identifier for an SSA value within one function body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(usize);

impl ValueId {
    /// Creates a new value identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index into the value table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Whether a value is the object itself or the address of memory holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    /// A loadable value.
    Object,
    /// The address of memory holding a value of the value's type.
    Address,
}

/// Where a value was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOrigin {
    /// Formal parameter of the function, by position.
    Argument(u16),
    /// Result of an instruction.
    Instruction,
    /// Result of a phi node at a control flow merge.
    Phi,
}

/// Metadata for one SSA value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    ty: TypeId,
    category: ValueCategory,
    origin: ValueOrigin,
}

impl Value {
    /// Creates a value description.
    #[must_use]
    pub const fn new(ty: TypeId, category: ValueCategory, origin: ValueOrigin) -> Self {
        Self {
            ty,
            category,
            origin,
        }
    }

    /// Returns the value's type.
    #[must_use]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    /// Replaces the value's type.
    pub fn set_ty(&mut self, ty: TypeId) {
        self.ty = ty;
    }

    /// Returns whether this is an object or an address.
    #[must_use]
    pub const fn category(&self) -> ValueCategory {
        self.category
    }

    /// Returns `true` if the value is an address.
    #[must_use]
    pub fn is_address(&self) -> bool {
        self.category == ValueCategory::Address
    }

    /// Returns where the value was defined.
    #[must_use]
    pub const fn origin(&self) -> ValueOrigin {
        self.origin
    }
}

/// Position of an instruction: block index and instruction index within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrLocation {
    /// Block index.
    pub block: usize,
    /// Instruction index within the block.
    pub instruction: usize,
}

impl InstrLocation {
    /// Creates a new location.
    #[must_use]
    pub const fn new(block: usize, instruction: usize) -> Self {
        Self { block, instruction }
    }
}

impl fmt::Display for InstrLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}:{}", self.block, self.instruction)
    }
}
