//! Concrete type recovery for existential values.
//!
//! [`ConcreteTypeResolver`] traces an existential value back to the single
//! point where a concrete value was wrapped into it. The search is
//! intra-procedural and flow-insensitive:
//!
//! - it crosses block boundaries, since SSA definitions dominate their uses;
//! - it never looks through phi nodes, so merges of differently typed values
//!   stay unresolved even when all incoming types agree;
//! - it never reaches into the callers of the analyzed function, so formal
//!   parameters are always unresolved.
//!
//! # Resolution Rules
//!
//! | Value | Resolves when |
//! |-------|---------------|
//! | object | defined by `init_existential_ref` |
//! | address | an `alloc_stack` with exactly one initializing write, and no user that may write it behind the resolver's back |
//!
//! The initializing write of an address is one of:
//!
//! - `init_existential_addr` - yields its concrete type
//! - `copy_addr [init]` from another resolvable address
//! - `store` of a resolvable object
//!
//! Every other user of the slot must be a known reader (`load`, `copy_addr`
//! source, `open_existential_addr`, `destroy_addr`, `deinit_existential_addr`,
//! `dealloc_stack`, a `witness_call` receiving the slot as its receiver) or the
//! apply being analyzed. Dispatching a requirement opens the existential and
//! cannot change its dynamic type. A slot handed to any other call, or passed
//! as a witness call argument, might be reassigned there and is rejected.

use std::collections::HashSet;

use crate::{
    analysis::{DefSite, DefUseIndex},
    ir::{FunctionBody, InstrLocation, Op, TypeId, TypeTable, ValueId},
};

/// The concrete type behind an existential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcreteExistentialInfo {
    /// The type wrapped into the existential.
    pub concrete: TypeId,
    /// The existential type of the analyzed value.
    pub existential: TypeId,
    /// Location of the instruction that performed the wrapping.
    pub origin: InstrLocation,
}

/// Resolves the concrete types of existential values within one function body.
pub struct ConcreteTypeResolver<'a> {
    body: &'a FunctionBody,
    index: &'a DefUseIndex,
    types: &'a TypeTable,
}

impl<'a> ConcreteTypeResolver<'a> {
    /// Creates a resolver over a body and its def-use index.
    #[must_use]
    pub const fn new(body: &'a FunctionBody, index: &'a DefUseIndex, types: &'a TypeTable) -> Self {
        Self { body, index, types }
    }

    /// Resolves the concrete type of `value` as passed by the apply at `site`.
    ///
    /// # Arguments
    ///
    /// * `value` - An existential object or address.
    /// * `site` - The apply consuming the value; it is not treated as a write.
    ///
    /// # Returns
    ///
    /// The concrete type and the wrapping point, or `None` if no single
    /// unambiguous origin exists or the origin does not conform.
    #[must_use]
    pub fn resolve(&self, value: ValueId, site: Option<InstrLocation>) -> Option<ConcreteExistentialInfo> {
        let existential = self.body.value_type(value)?;
        if !self.types.is_existential(existential) {
            return None;
        }

        let mut visited = HashSet::new();
        let (concrete, origin) = if self.body.value(value)?.is_address() {
            self.resolve_address(value, site, &mut visited)?
        } else {
            self.resolve_object(value)?
        };

        if !self.types.satisfies(concrete, existential) {
            log::trace!(
                "{} resolved to {}, which does not satisfy {}",
                value,
                self.types.display_name(concrete),
                self.types.display_name(existential)
            );
            return None;
        }

        Some(ConcreteExistentialInfo {
            concrete,
            existential,
            origin,
        })
    }

    fn def_location(&self, value: ValueId) -> Option<InstrLocation> {
        match self.index.def_site(value)? {
            DefSite::Instruction(location) => Some(location),
            _ => None,
        }
    }

    fn resolve_object(&self, value: ValueId) -> Option<(TypeId, InstrLocation)> {
        match self.index.def_op(value)? {
            Op::InitExistentialRef { concrete, .. } => Some((*concrete, self.def_location(value)?)),
            _ => None,
        }
    }

    fn resolve_address(
        &self,
        address: ValueId,
        site: Option<InstrLocation>,
        visited: &mut HashSet<ValueId>,
    ) -> Option<(TypeId, InstrLocation)> {
        if !visited.insert(address) {
            return None;
        }
        if !matches!(self.index.def_op(address)?, Op::AllocStack { .. }) {
            return None;
        }

        let mut write = None;
        for use_site in self.index.uses_of(address) {
            let location = use_site.location()?;
            let op = self.body.instruction(location)?.op();
            let is_write = match op {
                Op::InitExistentialAddr { existential, .. } => *existential == address,
                Op::Store { dest, .. } => *dest == address,
                Op::CopyAddr { src, dest, .. } => {
                    if *dest == address && *src == address {
                        return None;
                    }
                    *dest == address
                }
                Op::Load { .. }
                | Op::OpenExistentialAddr { .. }
                | Op::DestroyAddr { .. }
                | Op::DeinitExistentialAddr { .. }
                | Op::DeallocStack { .. } => false,
                Op::WitnessCall { receiver, args, .. } => {
                    if *receiver != address || args.contains(&address) {
                        return None;
                    }
                    false
                }
                Op::Apply { .. } if Some(location) == site => false,
                _ => return None,
            };

            if is_write {
                if write.is_some() {
                    return None;
                }
                write = Some((location, op));
            }
        }

        let (location, op) = write?;
        match op {
            Op::InitExistentialAddr { concrete, .. } => Some((*concrete, location)),
            Op::CopyAddr {
                src, init: true, ..
            } => self.resolve_address(*src, None, visited),
            Op::Store { src, .. } => self.resolve_object(*src),
            _ => None,
        }
    }
}
