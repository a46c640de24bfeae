//! The class repository: an immutable index of component descriptors
//!
//! Built once during the registration phase, read-only afterwards. All
//! structural validation happens in [`RepositoryBuilder::build`]; a
//! validation failure there means the component set is unsafe to serve
//! from, so callers are expected to abort startup on it.

use crate::descriptor::{
    CastFn, ComponentDescriptor, ComponentKey, MethodTag, ServiceKey, ServiceRegistration,
};
use crate::error::{IocError, Result};
use ahash::RandomState;
use std::any::TypeId;
use std::collections::HashMap;

#[cfg(feature = "logging")]
use tracing::debug;

/// A validated manual override: service → single implementation.
pub(crate) struct ManualBinding {
    /// Index of the bound descriptor.
    pub(crate) descriptor: usize,
    pub(crate) cast: CastFn,
}

/// Immutable index from service type to priority-ordered implementations.
///
/// Concurrent reads need no locking; the repository is shared as an `Arc`
/// across every context in the chain.
///
/// ```
/// # use wirebox::{ClassRepository, ComponentDescriptor};
/// struct Clock;
///
/// let repo = ClassRepository::builder()
///     .component(
///         ComponentDescriptor::for_type::<Clock>()
///             .constructor(|_| Ok(Clock))
///             .finish(),
///     )
///     .build()
///     .unwrap();
/// assert_eq!(repo.len(), 1);
/// ```
pub struct ClassRepository {
    descriptors: Vec<ComponentDescriptor>,
    by_component: HashMap<TypeId, usize, RandomState>,
    /// Per service: descriptor indices sorted by priority ascending, ties
    /// broken by discovery order.
    by_service: HashMap<TypeId, Vec<usize>, RandomState>,
    bindings: HashMap<TypeId, ManualBinding, RandomState>,
}

impl ClassRepository {
    /// Start building a repository.
    #[inline]
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder {
            descriptors: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Descriptors implementing `service`, highest priority first.
    pub fn find(&self, service: ServiceKey) -> impl Iterator<Item = &ComponentDescriptor> + '_ {
        self.indices_for(service)
            .iter()
            .map(move |&idx| &self.descriptors[idx])
    }

    /// The descriptor registered for a concrete component type, if any.
    pub fn descriptor_of(&self, component: ComponentKey) -> Option<&ComponentDescriptor> {
        self.by_component
            .get(&component.id())
            .map(|&idx| &self.descriptors[idx])
    }

    /// Every descriptor carrying the class-level marker. The returned
    /// iterator is lazy and restartable: call again for a fresh pass.
    pub fn classes_with<'a>(
        &'a self,
        marker: &'a str,
    ) -> impl Iterator<Item = &'a ComponentDescriptor> + 'a {
        self.descriptors.iter().filter(move |d| d.has_marker(marker))
    }

    /// Every `(descriptor, method)` pair where the method carries the
    /// marker. Lazy and restartable, like [`classes_with`](Self::classes_with).
    pub fn methods_with<'a>(
        &'a self,
        marker: &'a str,
    ) -> impl Iterator<Item = (&'a ComponentDescriptor, &'a MethodTag)> + 'a {
        self.descriptors.iter().flat_map(move |d| {
            d.methods()
                .iter()
                .filter(move |tag| tag.marker == marker)
                .map(move |tag| (d, tag))
        })
    }

    /// Iterate over every registered descriptor in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> + '_ {
        self.descriptors.iter()
    }

    /// Number of registered components.
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the repository holds no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    #[inline]
    pub(crate) fn indices_for(&self, service: ServiceKey) -> &[usize] {
        self.by_service
            .get(&service.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[inline]
    pub(crate) fn descriptor_at(&self, idx: usize) -> &ComponentDescriptor {
        &self.descriptors[idx]
    }

    #[inline]
    pub(crate) fn binding_for(&self, service: ServiceKey) -> Option<&ManualBinding> {
        self.bindings.get(&service.id())
    }
}

impl std::fmt::Debug for ClassRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRepository")
            .field("components", &self.descriptors.len())
            .field("services", &self.by_service.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Collects descriptors and manual bindings, then validates the whole set
/// at once in [`build`](Self::build).
pub struct RepositoryBuilder {
    descriptors: Vec<ComponentDescriptor>,
    registrations: Vec<ServiceRegistration>,
}

impl RepositoryBuilder {
    /// Register a candidate component class.
    #[inline]
    pub fn component(mut self, descriptor: ComponentDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register a manual service-to-implementation override.
    #[inline]
    pub fn bind(mut self, registration: ServiceRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Validate every descriptor and binding and produce the immutable
    /// repository. Any [`IocError::Validation`] returned here means the
    /// component set is malformed; a partially-wired container is unsafe,
    /// so callers should treat this as fatal.
    pub fn build(self) -> Result<ClassRepository> {
        let hasher = RandomState::new();
        let mut by_component: HashMap<TypeId, usize, RandomState> =
            HashMap::with_capacity_and_hasher(self.descriptors.len(), hasher.clone());
        let mut by_service: HashMap<TypeId, Vec<usize>, RandomState> =
            HashMap::with_hasher(hasher.clone());

        for (idx, descriptor) in self.descriptors.iter().enumerate() {
            Self::validate_descriptor(descriptor)?;

            if by_component.insert(descriptor.key().id(), idx).is_some() {
                return Err(IocError::validation(format!(
                    "component {} registered more than once",
                    descriptor.key().name()
                )));
            }

            for service in descriptor.service_keys() {
                by_service.entry(service.id()).or_default().push(idx);
            }
        }

        // Priority ascending; the sort is stable, so equal priorities keep
        // discovery order and resolution stays deterministic across runs.
        for indices in by_service.values_mut() {
            indices.sort_by_key(|&idx| self.descriptors[idx].priority());
        }

        let mut bindings: HashMap<TypeId, ManualBinding, RandomState> =
            HashMap::with_hasher(hasher);
        for registration in &self.registrations {
            let Some(&idx) = by_component.get(&registration.component().id()) else {
                return Err(IocError::validation(format!(
                    "manual binding for {} targets unregistered component {}",
                    registration.service().name(),
                    registration.component().name()
                )));
            };

            match bindings.get(&registration.service().id()) {
                Some(existing) if existing.descriptor != idx => {
                    return Err(IocError::validation(format!(
                        "service {} manually bound to both {} and {}",
                        registration.service().name(),
                        self.descriptors[existing.descriptor].key().name(),
                        registration.component().name()
                    )));
                }
                Some(_) => {} // identical re-registration is idempotent
                None => {
                    bindings.insert(
                        registration.service().id(),
                        ManualBinding {
                            descriptor: idx,
                            cast: registration.caster().clone(),
                        },
                    );
                }
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "wirebox",
            components = self.descriptors.len(),
            services = by_service.len(),
            bindings = bindings.len(),
            "Class repository built"
        );

        Ok(ClassRepository {
            descriptors: self.descriptors,
            by_component,
            by_service,
            bindings,
        })
    }

    fn validate_descriptor(descriptor: &ComponentDescriptor) -> Result<()> {
        if descriptor.ctor().is_none() {
            return Err(IocError::validation(format!(
                "component {} has no constructor",
                descriptor.key().name()
            )));
        }

        let requests = descriptor.requests();
        for (pos, request) in requests.iter().enumerate() {
            if requests[..pos].iter().any(|r| r.slot() == request.slot()) {
                return Err(IocError::validation(format!(
                    "component {} declares slot '{}' more than once",
                    descriptor.key().name(),
                    request.slot()
                )));
            }

            // A next request only makes sense when the requester is itself
            // an implementation of the same service.
            if request.is_next() {
                if let Some(service) = request.service() {
                    if !descriptor.provides(service) {
                        return Err(IocError::validation(format!(
                            "component {} requests next {} but does not provide it",
                            descriptor.key().name(),
                            service.name()
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
