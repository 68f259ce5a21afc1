//! Views over full apply instructions.

use crate::ir::{ApplyKind, Callee, FunctionId, InstrLocation, Instruction, Op, TypeId, ValueId};

/// A call site that transfers control to its callee and resumes afterwards.
///
/// Built from [`Op::Apply`] instructions only; partial applications build
/// closures and are never full applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullApplySite {
    location: InstrLocation,
    kind: ApplyKind,
    callee: Callee,
    substitutions: Vec<TypeId>,
    args: Vec<ValueId>,
    dest: Option<ValueId>,
}

impl FullApplySite {
    /// Creates a view of the instruction at `location` if it is a full apply.
    #[must_use]
    pub fn new(location: InstrLocation, instruction: &Instruction) -> Option<Self> {
        let Op::Apply {
            dest,
            kind,
            callee,
            substitutions,
            args,
        } = instruction.op()
        else {
            return None;
        };

        Some(Self {
            location,
            kind: *kind,
            callee: *callee,
            substitutions: substitutions.clone(),
            args: args.clone(),
            dest: *dest,
        })
    }

    /// Returns the location of the apply.
    #[must_use]
    pub const fn location(&self) -> InstrLocation {
        self.location
    }

    /// Returns the apply flavor.
    #[must_use]
    pub const fn kind(&self) -> ApplyKind {
        self.kind
    }

    /// Returns the call target.
    #[must_use]
    pub const fn callee(&self) -> Callee {
        self.callee
    }

    /// Returns the statically referenced function, or `None` for indirect calls.
    #[must_use]
    pub const fn referenced_function(&self) -> Option<FunctionId> {
        match self.callee {
            Callee::Function(id) => Some(id),
            Callee::Value(_) => None,
        }
    }

    /// Returns the generic substitutions.
    #[must_use]
    pub fn substitutions(&self) -> &[TypeId] {
        &self.substitutions
    }

    /// Returns the arguments, aligned with the callee's parameters.
    #[must_use]
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    /// Returns the argument at `index`.
    #[must_use]
    pub fn argument(&self, index: usize) -> Option<ValueId> {
        self.args.get(index).copied()
    }

    /// Returns the result value.
    #[must_use]
    pub const fn dest(&self) -> Option<ValueId> {
        self.dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_apply_is_not_full() {
        let partial = Instruction::new(Op::PartialApply {
            dest: ValueId::new(1),
            callee: Callee::Function(FunctionId::new(0)),
            args: vec![ValueId::new(0)],
        });
        assert!(FullApplySite::new(InstrLocation::new(0, 0), &partial).is_none());
    }

    #[test]
    fn test_full_apply_view() {
        let apply = Instruction::new(Op::Apply {
            dest: None,
            kind: ApplyKind::BeginApply,
            callee: Callee::Value(ValueId::new(3)),
            substitutions: Vec::new(),
            args: vec![ValueId::new(0), ValueId::new(1)],
        });
        let site = FullApplySite::new(InstrLocation::new(1, 2), &apply);
        let site = site.as_ref();
        assert_eq!(site.map(FullApplySite::kind), Some(ApplyKind::BeginApply));
        assert_eq!(site.and_then(FullApplySite::referenced_function), None);
        assert_eq!(site.and_then(|s| s.argument(1)), Some(ValueId::new(1)));
        assert_eq!(site.map(FullApplySite::location), Some(InstrLocation::new(1, 2)));
    }
}
