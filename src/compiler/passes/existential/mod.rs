//! Existential argument specialization.
//!
//! Calls that pass a value of an existential type (`any Drawable`) make the
//! callee dispatch every requirement dynamically. When the caller knows which
//! concrete type it wrapped into the existential, the call can instead target
//! a generic clone of the callee whose parameter is bound to that type at the
//! call site.
//!
//! # Example
//!
//! Before:
//! ```text
//! func @render(indirect_borrowed any Drawable)
//!
//! %0 = alloc_stack any Drawable
//! %1 = init_existential_addr %0, Circle
//! apply @render(%0)
//! ```
//!
//! After:
//! ```text
//! func shared @$es6renderg0_<τ_0_0: Drawable>(indirect_borrowed τ_0_0)
//!
//! %0 = alloc_stack any Drawable
//! %1 = init_existential_addr %0, Circle
//! %2 = open_existential_addr immutable_access %0 as Circle
//! apply @$es6renderg0_<Circle>(%2)
//! ```
//!
//! # Pipeline
//!
//! For every full apply of the function, in block and instruction order:
//!
//! 1. [`eligibility`] - the callee must be a direct, optimizable definition
//!    whose results, errors and dispatch a clone can reproduce.
//! 2. [`arguments`] - at least one existential parameter must have a known
//!    concrete type at the call site.
//! 3. The [`NameMangler`] names the clone after the callee and the
//!    specialized positions, so equal signatures share one clone.
//! 4. The [`TransformEngine`] clones (or reuses) and rewrites the site.
//! 5. On success the clone is scheduled and the callee's analyses are
//!    invalidated.
//!
//! Every step that fails leaves the IR untouched and moves on to the next
//! site. Each visited site yields exactly one [`SiteOutcome`].

pub mod arguments;
pub mod descriptor;
pub mod eligibility;
pub mod transform;

pub use arguments::{access_mode, releases_storage, ArgumentAnalyzer};
pub use descriptor::{
    ArgumentDescriptor, Decline, ParameterDescriptor, SiteOutcome, Specialization,
    SpecializationRequest,
};
pub use eligibility::{check_callee, is_eligible_callee, resolve_callee, CalleeRejection};
pub use transform::{ExistentialTransform, TransformEngine};

use crate::{
    analysis::DefUseIndex,
    compiler::{
        Counter, EventKind, FunctionPass, InvalidationKind, NameMangler, OptimizerContext,
        PipelineScheduler, SpecializationMangler,
    },
    ir::{Function, FunctionBody, FullApplySite, FunctionId, InstrLocation},
    Result,
};

/// Specializes callees for the concrete types behind existential arguments.
///
/// The pass trusts its input: IR that violates structural rules (for example
/// an apply whose argument count differs from the callee's parameters) is not
/// diagnosed, the affected site is simply left alone.
pub struct ExistentialSpecializerPass {
    engine: Box<dyn TransformEngine>,
    mangler: Box<dyn NameMangler>,
}

impl Default for ExistentialSpecializerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ExistentialSpecializerPass {
    const NAME: &'static str = "existential-specializer";

    /// Creates the pass with the default engine and mangler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(Box::new(ExistentialTransform::new()))
    }

    /// Creates the pass with a custom transform engine.
    #[must_use]
    pub fn with_engine(engine: Box<dyn TransformEngine>) -> Self {
        Self {
            engine,
            mangler: Box::new(SpecializationMangler),
        }
    }

    /// Replaces the name mangler.
    #[must_use]
    pub fn with_mangler(mut self, mangler: Box<dyn NameMangler>) -> Self {
        self.mangler = mangler;
        self
    }

    /// Visits every full apply of `function` and specializes where possible.
    ///
    /// # Arguments
    ///
    /// * `function` - The caller; rewritten in place.
    /// * `ctx` - Provides the module, caches and pipeline services.
    ///
    /// # Returns
    ///
    /// The outcome of every visited call site, in visiting order. Sites
    /// inserted by a rewrite are not visited.
    pub fn specialize_function(
        &self,
        function: &mut Function,
        ctx: &OptimizerContext,
    ) -> Vec<(InstrLocation, SiteOutcome)> {
        let caller = function.id();
        let mut outcomes = Vec::new();
        let mut cursor = InstrLocation::new(0, 0);
        let mut caller_index: Option<DefUseIndex> = None;

        loop {
            let (site, request) = {
                let Some(body) = function.body() else {
                    break;
                };
                let Some(site) = Self::next_site(body, cursor) else {
                    break;
                };
                ctx.metrics().increment(Counter::CallSitesVisited);

                let index = caller_index.get_or_insert_with(|| DefUseIndex::build(body));
                match self.prepare(&site, caller, body, index, ctx) {
                    Ok(request) => (site, request),
                    Err(outcome) => {
                        outcomes.push((site.location(), outcome));
                        cursor = Self::after(site.location());
                        continue;
                    }
                }
            };

            let outcome = match self.engine.specialize(&request, function, &ctx.module) {
                Ok(specialization) => {
                    Self::record_success(caller, &site, &request, &specialization, ctx);
                    cursor = specialization.resume_at;
                    caller_index = None;
                    SiteOutcome::Specialized {
                        function: specialization.function,
                        created: specialization.created,
                    }
                }
                Err(decline) => {
                    log::debug!(
                        "{}: {} declined ({})",
                        site.location(),
                        request.name,
                        decline
                    );
                    ctx.metrics().increment(Counter::EngineDeclined);
                    ctx.events
                        .record(EventKind::SpecializationDeclined)
                        .at(caller, site.location())
                        .pass(Self::NAME)
                        .message(format!("{}: {}", request.name, decline));
                    cursor = Self::after(site.location());
                    SiteOutcome::DeclinedByEngine(decline)
                }
            };
            outcomes.push((site.location(), outcome));
        }

        outcomes
    }

    fn after(location: InstrLocation) -> InstrLocation {
        InstrLocation::new(location.block, location.instruction + 1)
    }

    /// Finds the first full apply at or after `from`.
    fn next_site(body: &FunctionBody, from: InstrLocation) -> Option<FullApplySite> {
        body.blocks()
            .iter()
            .enumerate()
            .skip(from.block)
            .find_map(|(b, block)| {
                let start = if b == from.block { from.instruction } else { 0 };
                block
                    .instructions()
                    .iter()
                    .enumerate()
                    .skip(start)
                    .find_map(|(i, instruction)| {
                        FullApplySite::new(InstrLocation::new(b, i), instruction)
                    })
            })
    }

    /// Runs the eligibility checks and assembles the request for one site.
    fn prepare(
        &self,
        site: &FullApplySite,
        caller: FunctionId,
        body: &FunctionBody,
        caller_index: &DefUseIndex,
        ctx: &OptimizerContext,
    ) -> std::result::Result<SpecializationRequest, SiteOutcome> {
        let callee = match resolve_callee(site, &ctx.module) {
            Ok(callee) => callee,
            Err(rejection) => {
                log::debug!("{}: callee rejected ({})", site.location(), rejection);
                ctx.metrics().increment(Counter::CalleesRejected);
                ctx.events
                    .record(EventKind::CalleeRejected)
                    .at(caller, site.location())
                    .pass(Self::NAME)
                    .message(format!("{}: {}", site.callee(), rejection));
                return Err(SiteOutcome::RejectedByCallee(rejection));
            }
        };
        let callee_index = ctx
            .def_use(&callee)
            .ok_or(SiteOutcome::RejectedByCallee(CalleeRejection::NoBody))?;

        let types = ctx.module.types();
        let existential_args =
            ArgumentAnalyzer::new(types, body, caller_index).analyze(site, &callee, &callee_index);
        if existential_args.is_empty() {
            ctx.metrics().increment(Counter::ArgumentsRejected);
            ctx.events
                .record(EventKind::ArgumentsRejected)
                .at(caller, site.location())
                .pass(Self::NAME)
                .message(format!("{}: no specializable argument", callee.name()));
            return Err(SiteOutcome::RejectedByArguments);
        }

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "{}: {} has {} known callers",
                site.location(),
                callee.name(),
                ctx.callers_of(callee.id()).len()
            );
        }

        let indices: Vec<usize> = existential_args.keys().copied().collect();
        let name = self.mangler.specialization_name(callee.name(), &indices);
        Ok(SpecializationRequest::new(
            callee.id(),
            site.location(),
            &callee.signature().params,
            existential_args,
            name,
        ))
    }

    fn record_success(
        caller: FunctionId,
        site: &FullApplySite,
        request: &SpecializationRequest,
        specialization: &Specialization,
        ctx: &OptimizerContext,
    ) {
        let metrics = ctx.metrics();
        metrics.increment(Counter::FunctionsSpecialized);
        if specialization.created {
            metrics.increment(Counter::ClonesCreated);
            ctx.events
                .record(EventKind::FunctionSpecialized)
                .function(specialization.function)
                .pass(Self::NAME)
                .message(format!("{} from {}", request.name, request.callee));
        } else {
            metrics.increment(Counter::ClonesReused);
            ctx.events
                .record(EventKind::CloneReused)
                .at(caller, site.location())
                .pass(Self::NAME)
                .message(request.name.clone());
        }

        let concrete: Vec<String> = request
            .existential_args
            .values()
            .map(|descriptor| ctx.module.types().display_name(descriptor.concrete))
            .collect();
        log::debug!(
            "{}: {} -> {}<{}>",
            site.location(),
            request.callee,
            request.name,
            concrete.join(", ")
        );
        ctx.events
            .record(EventKind::CallSiteRewritten)
            .at(caller, site.location())
            .pass(Self::NAME)
            .message(format!("{}<{}>", request.name, concrete.join(", ")));

        ctx.add_to_worklist(specialization.function, request.callee);
        ctx.invalidate_analyses(request.callee, InvalidationKind::EVERYTHING);
    }
}

impl FunctionPass for ExistentialSpecializerPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn should_run(&self, function: &Function, ctx: &OptimizerContext) -> bool {
        ctx.config.existential_specializer && function.should_optimize()
    }

    fn run_on_function(&self, function: &mut Function, ctx: &OptimizerContext) -> Result<bool> {
        let outcomes = self.specialize_function(function, ctx);
        Ok(outcomes.iter().any(|(_, outcome)| outcome.is_specialized()))
    }

    fn description(&self) -> &'static str {
        "Specializes callees for the concrete types of existential arguments"
    }
}
