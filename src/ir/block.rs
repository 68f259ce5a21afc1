//! Basic blocks containing phi nodes and instructions.
//!
//! ```text
//! bb2:
//!   %7 = phi(%3 from bb0, %5 from bb1)
//!   %8 = alloc_stack t4
//!   br bb3
//! ```
//!
//! Phi nodes are evaluated at block entry before any instruction executes.

use std::fmt;

use crate::ir::{Instruction, ValueId};

/// A phi node merging one value per predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    result: ValueId,
    /// `(predecessor block, incoming value)` pairs.
    operands: Vec<(usize, ValueId)>,
}

impl PhiNode {
    /// Creates a phi node without operands.
    #[must_use]
    pub const fn new(result: ValueId) -> Self {
        Self {
            result,
            operands: Vec::new(),
        }
    }

    /// Returns the merged value.
    #[must_use]
    pub const fn result(&self) -> ValueId {
        self.result
    }

    /// Returns the incoming `(predecessor, value)` pairs.
    #[must_use]
    pub fn operands(&self) -> &[(usize, ValueId)] {
        &self.operands
    }

    /// Adds an incoming value from a predecessor block.
    pub fn add_operand(&mut self, predecessor: usize, value: ValueId) {
        self.operands.push((predecessor, value));
    }

    /// Rewrites incoming `from` values into `to`.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        for (_, value) in &mut self.operands {
            if *value == from {
                *value = to;
                replaced += 1;
            }
        }
        replaced
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let incoming: Vec<String> = self
            .operands
            .iter()
            .map(|(pred, value)| format!("{value} from bb{pred}"))
            .collect();
        write!(f, "{} = phi({})", self.result, incoming.join(", "))
    }
}

/// A basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: usize,
    phis: Vec<PhiNode>,
    instructions: Vec<Instruction>,
}

impl Block {
    /// Creates an empty block.
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self {
            id,
            phis: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the phi nodes of this block.
    #[must_use]
    pub fn phis(&self) -> &[PhiNode] {
        &self.phis
    }

    /// Returns a mutable reference to the phi nodes.
    pub fn phis_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phis
    }

    /// Appends a phi node.
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phis.push(phi);
    }

    /// Returns the instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns a mutable reference to the instructions.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Returns the terminator, if the block is complete.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Returns the successor block indices.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        self.terminator()
            .map(|t| t.op().successors())
            .unwrap_or_default()
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the block has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bb{}:", self.id)?;
        for phi in &self.phis {
            writeln!(f, "  {phi}")?;
        }
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Op;

    #[test]
    fn test_terminator_and_successors() {
        let mut block = Block::new(0);
        assert!(block.terminator().is_none());
        assert!(block.successors().is_empty());

        block.push(Instruction::new(Op::Literal {
            dest: ValueId::new(0),
            value: 1,
        }));
        assert!(block.terminator().is_none());

        block.push(Instruction::new(Op::CondBranch {
            condition: ValueId::new(0),
            then_block: 1,
            else_block: 2,
        }));
        assert!(block.terminator().is_some());
        assert_eq!(block.successors(), vec![1, 2]);
        assert_eq!(block.len(), 2);
    }

    #[test]
    fn test_phi_display() {
        let mut phi = PhiNode::new(ValueId::new(7));
        phi.add_operand(0, ValueId::new(3));
        phi.add_operand(1, ValueId::new(5));
        assert_eq!(phi.to_string(), "%7 = phi(%3 from bb0, %5 from bb1)");
        assert_eq!(phi.replace_uses(ValueId::new(5), ValueId::new(6)), 1);
        assert_eq!(phi.operands()[1], (1, ValueId::new(6)));
    }
}
