//! Candidate selection across the scope chain
//!
//! The resolver turns a requested service plus a context into the ordered
//! list of constructible candidates. Ordering is: nearest scope in the
//! chain first (scope-local registrations override inherited ones), then
//! declared priority ascending, then registration order. Construction and
//! caching are delegated to the instantiator against each candidate's
//! owning context.

use crate::context::Context;
use crate::descriptor::{BoxedHandle, ComponentDescriptor, ScopeKey, ServiceKey};
use crate::error::{IocError, Result};
use crate::instantiator;
use std::any::TypeId;

#[cfg(feature = "logging")]
use tracing::trace;

/// One constructible implementation of a service, paired with the context
/// that owns its declared scope.
pub(crate) struct Candidate<'a> {
    pub(crate) owner: Context,
    pub(crate) descriptor: &'a ComponentDescriptor,
}

/// The ordered candidate list for `service` as seen from `ctx`.
pub(crate) fn candidates<'a>(
    ctx: &'a Context,
    service: ServiceKey,
) -> Result<Vec<Candidate<'a>>> {
    ctx.ensure_active()?;

    let repository = ctx.repository();
    let indices = repository.indices_for(service);
    let mut list = Vec::new();

    // Walk the chain outward; each hop contributes the descriptors declared
    // for its scope, already in priority order from the repository index.
    let mut hop = Some(ctx.clone());
    while let Some(current) = hop {
        current.ensure_active()?;
        for &idx in indices {
            let descriptor = repository.descriptor_at(idx);
            if descriptor.scope() == current.scope() {
                list.push(Candidate {
                    owner: current.clone(),
                    descriptor,
                });
            }
        }
        hop = current.parent().cloned();
    }

    Ok(list)
}

/// Resolve the single best implementation. `Ok(None)` means no visible
/// implementation exists; the caller decides whether that is an error.
pub(crate) fn resolve_one(ctx: &Context, service: ServiceKey) -> Result<Option<BoxedHandle>> {
    ctx.ensure_active()?;

    // A manual binding short-circuits discovery for this exact service.
    if let Some(binding) = ctx.repository().binding_for(service) {
        let descriptor = ctx.repository().descriptor_at(binding.descriptor);
        let Some(owner) = owning_context(ctx, descriptor.scope())? else {
            return Ok(None);
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "wirebox",
            service = service.name(),
            component = descriptor.key().name(),
            scope = %owner.scope(),
            "Resolving through manual binding"
        );

        let instance = instantiator::instance_of(&owner, descriptor)?;
        return Ok(Some((binding.cast)(instance)));
    }

    let list = candidates(ctx, service)?;
    match list.first() {
        Some(candidate) => {
            #[cfg(feature = "logging")]
            trace!(
                target: "wirebox",
                service = service.name(),
                component = candidate.descriptor.key().name(),
                scope = %candidate.owner.scope(),
                candidates = list.len(),
                "Resolved top-priority candidate"
            );
            Ok(Some(materialize(candidate, service)?))
        }
        None => Ok(None),
    }
}

/// Materialize every visible implementation, preserving resolution order.
pub(crate) fn resolve_all(ctx: &Context, service: ServiceKey) -> Result<Vec<BoxedHandle>> {
    let list = candidates(ctx, service)?;
    let mut out = Vec::with_capacity(list.len());
    for candidate in &list {
        out.push(materialize(candidate, service)?);
    }
    Ok(out)
}

/// Resolve the implementation immediately after `requesting` in the
/// ordered candidate list. `Ok(None)` when the requester is last or is not
/// itself a candidate.
pub(crate) fn resolve_next(
    ctx: &Context,
    requesting: TypeId,
    service: ServiceKey,
) -> Result<Option<BoxedHandle>> {
    let list = candidates(ctx, service)?;
    let position = list
        .iter()
        .position(|c| c.descriptor.key().id() == requesting);

    match position {
        Some(idx) => match list.get(idx + 1) {
            Some(successor) => Ok(Some(materialize(successor, service)?)),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

/// Whether any implementation of `service` is visible from `ctx`.
pub(crate) fn has_candidates(ctx: &Context, service: ServiceKey) -> Result<bool> {
    if let Some(binding) = ctx.repository().binding_for(service) {
        let descriptor = ctx.repository().descriptor_at(binding.descriptor);
        if owning_context(ctx, descriptor.scope())?.is_some() {
            return Ok(true);
        }
    }
    Ok(!candidates(ctx, service)?.is_empty())
}

/// The chain context whose scope matches `scope`, nearest first.
fn owning_context(ctx: &Context, scope: ScopeKey) -> Result<Option<Context>> {
    let mut hop = Some(ctx.clone());
    while let Some(current) = hop {
        current.ensure_active()?;
        if current.scope() == scope {
            return Ok(Some(current));
        }
        hop = current.parent().cloned();
    }
    Ok(None)
}

/// Construct (or fetch) the candidate in its owning context and cast the
/// instance into a handle for the requested service.
fn materialize(candidate: &Candidate<'_>, service: ServiceKey) -> Result<BoxedHandle> {
    let cast = candidate.descriptor.caster_for(service).ok_or_else(|| {
        IocError::construction(
            candidate.descriptor.key().name(),
            format!("no binding registered for service {}", service.name()),
        )
    })?;
    let instance = instantiator::instance_of(&candidate.owner, candidate.descriptor)?;
    Ok(cast(instance))
}
