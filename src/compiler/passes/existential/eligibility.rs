//! Callee eligibility.
//!
//! A callee can be cloned only if the clone can stand in for it at a single
//! call site without changing how results, errors or dispatch reach the
//! caller. The checks are pure functions of the callee's static attributes.

use std::sync::Arc;

use strum::{Display, EnumIter};

use crate::ir::{Function, FullApplySite, InlineStrategy, Module};

/// The first reason a callee cannot be specialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum CalleeRejection {
    /// The call goes through a value, or names no function of the module.
    #[strum(serialize = "indirect callee")]
    IndirectCallee,
    /// The callee opted out of optimization.
    #[strum(serialize = "not optimizable")]
    NotOptimizable,
    /// The callee is a declaration.
    #[strum(serialize = "no body")]
    NoBody,
    /// The callee returns results through caller-provided storage.
    #[strum(serialize = "indirect results")]
    IndirectResults,
    /// The callee can throw.
    #[strum(serialize = "error result")]
    ErrorResult,
    /// The callee is always inlined.
    #[strum(serialize = "always inline")]
    AlwaysInline,
    /// The callee's body belongs to another compilation unit.
    #[strum(serialize = "available externally")]
    AvailableExternally,
    /// The callee uses a foreign dispatch convention.
    #[strum(serialize = "foreign representation")]
    ForeignRepresentation,
}

/// Checks the static attributes of a resolved callee.
///
/// # Errors
///
/// Returns the first failing condition, in declaration order of
/// [`CalleeRejection`].
pub fn check_callee(callee: &Function) -> Result<(), CalleeRejection> {
    if !callee.should_optimize() {
        return Err(CalleeRejection::NotOptimizable);
    }
    if !callee.is_definition() {
        return Err(CalleeRejection::NoBody);
    }

    let signature = callee.signature();
    if signature.indirect_result_count() > 0 {
        return Err(CalleeRejection::IndirectResults);
    }
    if signature.has_error_result() {
        return Err(CalleeRejection::ErrorResult);
    }
    if callee.inline_strategy() == InlineStrategy::Always {
        return Err(CalleeRejection::AlwaysInline);
    }
    if callee.linkage().is_available_externally() {
        return Err(CalleeRejection::AvailableExternally);
    }
    if signature.representation.is_foreign_dispatch() {
        return Err(CalleeRejection::ForeignRepresentation);
    }
    Ok(())
}

/// Resolves and checks the callee of a call site.
///
/// # Errors
///
/// Returns [`CalleeRejection::IndirectCallee`] for calls through a value or
/// to an unknown function, otherwise the result of [`check_callee`].
pub fn resolve_callee(site: &FullApplySite, module: &Module) -> Result<Arc<Function>, CalleeRejection> {
    let callee = site
        .referenced_function()
        .and_then(|id| module.function(id))
        .ok_or(CalleeRejection::IndirectCallee)?;
    check_callee(&callee)?;
    Ok(callee)
}

/// Returns `true` if the call site's callee may be specialized.
#[must_use]
pub fn is_eligible_callee(site: &FullApplySite, module: &Module) -> bool {
    resolve_callee(site, module).is_ok()
}
