//! Def-use index for SSA values.
//!
//! [`DefUseIndex`] is built once from a [`FunctionBody`] and answers the two
//! questions passes ask most: where is a value defined, and which
//! instructions read it.
//!
//! # Basic Usage
//!
//! ```rust,ignore
//! use exspec::analysis::DefUseIndex;
//!
//! let index = DefUseIndex::build(body);
//!
//! for use_site in index.uses_of(value) {
//!     println!("{value} used at bb{}:{}", use_site.block, use_site.instruction);
//! }
//!
//! if let Some(Op::AllocStack { ty, .. }) = index.def_op(value) {
//!     println!("{value} is a stack slot of {ty}");
//! }
//! ```

use std::collections::{HashMap, HashSet};

use crate::ir::{FunctionBody, InstrLocation, Op, ValueId, ValueOrigin};

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    /// Formal parameter at the given position.
    Argument(u16),
    /// Result of the instruction at the location.
    Instruction(InstrLocation),
    /// Result of a phi node.
    Phi {
        /// Block holding the phi.
        block: usize,
        /// Index in the block's phi list.
        index: usize,
    },
}

/// A read of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    /// Block of the reading instruction or phi.
    pub block: usize,
    /// Instruction index, or phi index for phi operands.
    pub instruction: usize,
    /// Whether the read is a phi operand.
    pub is_phi_operand: bool,
}

impl UseSite {
    /// Creates a use site for a regular instruction.
    #[must_use]
    pub const fn instruction(location: InstrLocation) -> Self {
        Self {
            block: location.block,
            instruction: location.instruction,
            is_phi_operand: false,
        }
    }

    /// Creates a use site for a phi operand.
    #[must_use]
    pub const fn phi_operand(block: usize, phi_index: usize) -> Self {
        Self {
            block,
            instruction: phi_index,
            is_phi_operand: true,
        }
    }

    /// Returns the instruction location, or `None` for phi operands.
    #[must_use]
    pub const fn location(&self) -> Option<InstrLocation> {
        if self.is_phi_operand {
            None
        } else {
            Some(InstrLocation::new(self.block, self.instruction))
        }
    }
}

/// Index for def-use queries on one function body.
#[derive(Debug, Clone, Default)]
pub struct DefUseIndex {
    /// Map from value to its definition site.
    definitions: HashMap<ValueId, DefSite>,

    /// Map from value to its use sites, in block order.
    uses: HashMap<ValueId, Vec<UseSite>>,

    /// Defining operation of every instruction-defined value.
    def_ops: HashMap<ValueId, Op>,

    /// Values defined by phi nodes.
    phi_defs: HashSet<ValueId>,

    /// Values with no uses.
    unused: HashSet<ValueId>,

    /// Total value count.
    value_count: usize,
}

impl DefUseIndex {
    /// Builds the index for a function body.
    ///
    /// This is an O(n) walk over all phi nodes and instructions.
    ///
    /// # Arguments
    ///
    /// * `body` - The function body to index.
    ///
    /// # Returns
    ///
    /// A new `DefUseIndex` with all relationships computed.
    #[must_use]
    pub fn build(body: &FunctionBody) -> Self {
        let mut definitions = HashMap::new();
        let mut uses: HashMap<ValueId, Vec<UseSite>> = HashMap::new();
        let mut def_ops = HashMap::new();
        let mut phi_defs = HashSet::new();

        for (position, &arg) in body.arguments().iter().enumerate() {
            let origin = body.value(arg).map(|v| v.origin());
            if let Some(ValueOrigin::Argument(index)) = origin {
                definitions.insert(arg, DefSite::Argument(index));
            } else {
                // Argument positions are bounded by signature limits
                #[allow(clippy::cast_possible_truncation)]
                definitions.insert(arg, DefSite::Argument(position as u16));
            }
        }

        for (block_idx, block) in body.blocks().iter().enumerate() {
            for (phi_idx, phi) in block.phis().iter().enumerate() {
                definitions.insert(
                    phi.result(),
                    DefSite::Phi {
                        block: block_idx,
                        index: phi_idx,
                    },
                );
                phi_defs.insert(phi.result());
                for &(_, value) in phi.operands() {
                    uses.entry(value)
                        .or_default()
                        .push(UseSite::phi_operand(block_idx, phi_idx));
                }
            }

            for (instr_idx, instruction) in block.instructions().iter().enumerate() {
                let location = InstrLocation::new(block_idx, instr_idx);
                if let Some(dest) = instruction.dest() {
                    definitions.insert(dest, DefSite::Instruction(location));
                    def_ops.insert(dest, instruction.op().clone());
                }
                for value in instruction.uses() {
                    let sites = uses.entry(value).or_default();
                    let site = UseSite::instruction(location);
                    // An instruction reading a value twice is one user
                    if sites.last() != Some(&site) {
                        sites.push(site);
                    }
                }
            }
        }

        let unused = definitions
            .keys()
            .filter(|value| uses.get(value).map_or(true, Vec::is_empty))
            .copied()
            .collect();

        Self {
            definitions,
            uses,
            def_ops,
            phi_defs,
            unused,
            value_count: body.value_count(),
        }
    }

    /// Returns the definition site of a value.
    #[must_use]
    pub fn def_site(&self, value: ValueId) -> Option<DefSite> {
        self.definitions.get(&value).copied()
    }

    /// Returns the operation defining a value, or `None` for arguments and phis.
    #[must_use]
    pub fn def_op(&self, value: ValueId) -> Option<&Op> {
        self.def_ops.get(&value)
    }

    /// Returns the use sites of a value; empty for unused or unknown values.
    #[must_use]
    pub fn uses_of(&self, value: ValueId) -> &[UseSite] {
        self.uses.get(&value).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of distinct users of a value.
    #[must_use]
    pub fn use_count(&self, value: ValueId) -> usize {
        self.uses_of(value).len()
    }

    /// Returns `true` if the value is defined but never read.
    #[must_use]
    pub fn is_unused(&self, value: ValueId) -> bool {
        self.unused.contains(&value)
    }

    /// Returns `true` if a phi node defines the value.
    #[must_use]
    pub fn is_phi_def(&self, value: ValueId) -> bool {
        self.phi_defs.contains(&value)
    }

    /// Returns the only use site of a value, if it has exactly one.
    #[must_use]
    pub fn single_use_site(&self, value: ValueId) -> Option<UseSite> {
        match self.uses_of(value) {
            [site] => Some(*site),
            _ => None,
        }
    }

    /// Returns the number of values in the indexed body.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.value_count
    }
}
