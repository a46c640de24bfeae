//! Component descriptors and injection-point metadata
//!
//! A [`ComponentDescriptor`] is the declarative record of one candidate
//! implementation class: the services it satisfies, its priority, its
//! declared scope, its injection points and its lifecycle hooks. The set of
//! descriptors is handed to the [`ClassRepository`](crate::ClassRepository)
//! by whatever discovery mechanism the embedding application uses; the
//! container never scans for components itself.
//!
//! Descriptors are built once during the registration phase and are
//! immutable afterwards. There is no runtime reflection: service
//! assignability is enforced at compile time by the unsized coercion inside
//! the cast closure handed to [`DescriptorBuilder::provides`].

use crate::error::{IocError, Result};
use crate::instantiator::ResolvedDeps;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Priority assigned to components that do not declare one.
///
/// Lower values resolve first; the default sits mid-range so that explicit
/// high-priority components sort ahead of unprioritized ones and explicit
/// low-priority components sort behind them.
pub const DEFAULT_PRIORITY: i32 = i32::MAX / 2;

/// A type-erased component instance as held in context caches.
pub(crate) type ErasedInstance = Arc<dyn Any + Send + Sync>;

/// A type-erased service handle: a `Box` holding an `Arc<S>` where `S` is
/// the (possibly unsized) service type the caller asked for.
pub(crate) type BoxedHandle = Box<dyn Any + Send + Sync>;

/// Converts a cached component instance into a service handle.
pub(crate) type CastFn = Arc<dyn Fn(ErasedInstance) -> BoxedHandle + Send + Sync>;

/// Type-erased component constructor.
pub(crate) type CtorFn = Arc<dyn Fn(&mut ResolvedDeps) -> Result<ErasedInstance> + Send + Sync>;

/// Type-erased post-construct lifecycle hook.
pub(crate) type HookFn = Arc<dyn Fn(&ErasedInstance) -> Result<()> + Send + Sync>;

/// Downcast an `Arc<dyn Any + Send + Sync>` to `Arc<T>` without runtime
/// type checking.
///
/// # Safety
///
/// The caller must guarantee the `Arc` was created from a value of type `T`.
/// Inside this crate that holds because instances are keyed by
/// `TypeId::of::<T>()` at registration and looked up by the same id.
#[inline]
pub(crate) unsafe fn downcast_arc_unchecked<T: Send + Sync + 'static>(
    arc: Arc<dyn Any + Send + Sync>,
) -> Arc<T> {
    let ptr = Arc::into_raw(arc);
    // SAFETY: ptr came from Arc::into_raw and the caller guarantees T is correct
    unsafe { Arc::from_raw(ptr as *const T) }
}

// =============================================================================
// Keys
// =============================================================================

/// Identity of a service type callers request by.
///
/// Any `'static` type works, including trait objects: the usual service key
/// is `ServiceKey::of::<dyn MyService>()`.
#[derive(Clone, Copy, Debug)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Key for the service type `S`.
    #[inline]
    pub fn of<S: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
        }
    }

    /// Human-readable type name for diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for ServiceKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl std::hash::Hash for ServiceKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Identity of a concrete implementation class.
#[derive(Clone, Copy, Debug)]
pub struct ComponentKey {
    id: TypeId,
    name: &'static str,
}

impl ComponentKey {
    /// Key for the component type `C`.
    #[inline]
    pub fn of<C: Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Human-readable type name for diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for ComponentKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentKey {}

impl std::hash::Hash for ComponentKey {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A named lifetime boundary governing where instances are cached.
///
/// The root context runs in [`ScopeKey::APPLICATION`] unless told otherwise;
/// request-style child scopes use whatever key the embedding layer picks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ScopeKey(&'static str);

impl ScopeKey {
    /// The application-wide singleton scope.
    pub const APPLICATION: ScopeKey = ScopeKey("application");

    /// A scope with an arbitrary label.
    #[inline]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The scope label.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

// =============================================================================
// Dependency requests
// =============================================================================

#[derive(Clone, Copy, Debug)]
pub(crate) enum RequestKind {
    /// One instance of a service, possibly optional or "next in chain".
    Single {
        service: ServiceKey,
        next: bool,
        optional: bool,
    },
    /// Every implementation of a service, in resolution order.
    All { service: ServiceKey },
    /// The owning context itself.
    Context,
}

/// One injection point on a component.
///
/// Requests are declared on the descriptor and materialized by the
/// container into the [`ResolvedDeps`] bundle handed to the constructor,
/// keyed by slot name.
#[derive(Clone, Copy, Debug)]
pub struct DependencyRequest {
    slot: &'static str,
    kind: RequestKind,
}

impl DependencyRequest {
    /// A required single-instance request.
    #[inline]
    pub fn single<S: ?Sized + 'static>(slot: &'static str) -> Self {
        Self {
            slot,
            kind: RequestKind::Single {
                service: ServiceKey::of::<S>(),
                next: false,
                optional: false,
            },
        }
    }

    /// An optional single-instance request; resolves to an absent slot when
    /// no implementation exists.
    #[inline]
    pub fn optional<S: ?Sized + 'static>(slot: &'static str) -> Self {
        Self {
            slot,
            kind: RequestKind::Single {
                service: ServiceKey::of::<S>(),
                next: false,
                optional: true,
            },
        }
    }

    /// A request for the implementation immediately after the requesting
    /// component in priority order. Only valid on components that provide
    /// the same service themselves; absent when the requester is last.
    #[inline]
    pub fn next<S: ?Sized + 'static>(slot: &'static str) -> Self {
        Self {
            slot,
            kind: RequestKind::Single {
                service: ServiceKey::of::<S>(),
                next: true,
                optional: true,
            },
        }
    }

    /// A request for every implementation of a service.
    #[inline]
    pub fn all<S: ?Sized + 'static>(slot: &'static str) -> Self {
        Self {
            slot,
            kind: RequestKind::All {
                service: ServiceKey::of::<S>(),
            },
        }
    }

    /// A request for the owning context handle.
    #[inline]
    pub fn context(slot: &'static str) -> Self {
        Self {
            slot,
            kind: RequestKind::Context,
        }
    }

    /// The target slot name.
    #[inline]
    pub fn slot(&self) -> &'static str {
        self.slot
    }

    #[inline]
    pub(crate) fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// The service this request targets, if any.
    #[inline]
    pub fn service(&self) -> Option<ServiceKey> {
        match self.kind {
            RequestKind::Single { service, .. } | RequestKind::All { service } => Some(service),
            RequestKind::Context => None,
        }
    }

    /// Whether this is a next-in-chain request.
    #[inline]
    pub fn is_next(&self) -> bool {
        matches!(self.kind, RequestKind::Single { next: true, .. })
    }
}

/// A method carrying a marker tag, discoverable through
/// [`ClassRepository::methods_with`](crate::ClassRepository::methods_with).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodTag {
    /// Method name on the component.
    pub method: &'static str,
    /// Marker label.
    pub marker: &'static str,
}

// =============================================================================
// ComponentDescriptor
// =============================================================================

/// The declarative record of one discoverable implementation class.
///
/// Created through [`ComponentDescriptor::for_type`], immutable once the
/// repository is built.
pub struct ComponentDescriptor {
    key: ComponentKey,
    scope: ScopeKey,
    priority: i32,
    services: Vec<(ServiceKey, CastFn)>,
    requests: Vec<DependencyRequest>,
    markers: Vec<&'static str>,
    methods: Vec<MethodTag>,
    ctor: Option<CtorFn>,
    hook: Option<HookFn>,
}

impl ComponentDescriptor {
    /// Start building a descriptor for the component type `C`.
    ///
    /// The component is always retrievable by its own concrete type; the
    /// self-binding is added here.
    pub fn for_type<C: Send + Sync + 'static>() -> DescriptorBuilder<C> {
        let self_cast: CastFn = Arc::new(|any: ErasedInstance| -> BoxedHandle {
            // SAFETY: instances under this descriptor are produced by its own
            // constructor, which returns the concrete component type C.
            let concrete = unsafe { downcast_arc_unchecked::<C>(any) };
            Box::new(concrete)
        });

        DescriptorBuilder {
            inner: ComponentDescriptor {
                key: ComponentKey::of::<C>(),
                scope: ScopeKey::APPLICATION,
                priority: DEFAULT_PRIORITY,
                services: vec![(ServiceKey::of::<C>(), self_cast)],
                requests: Vec::new(),
                markers: Vec::new(),
                methods: Vec::new(),
                ctor: None,
                hook: None,
            },
            _component: PhantomData,
        }
    }

    /// Identity of the implementation class.
    #[inline]
    pub fn key(&self) -> ComponentKey {
        self.key
    }

    /// The scope this component's instances live in.
    #[inline]
    pub fn scope(&self) -> ScopeKey {
        self.scope
    }

    /// Resolution priority; lower resolves first.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The services this component satisfies (self-binding included).
    pub fn service_keys(&self) -> impl Iterator<Item = ServiceKey> + '_ {
        self.services.iter().map(|(key, _)| *key)
    }

    /// Whether this component satisfies the given service.
    #[inline]
    pub fn provides(&self, service: ServiceKey) -> bool {
        self.services.iter().any(|(key, _)| *key == service)
    }

    /// Declared injection points, in declaration order.
    #[inline]
    pub fn requests(&self) -> &[DependencyRequest] {
        &self.requests
    }

    /// Class-level marker tags.
    #[inline]
    pub fn markers(&self) -> &[&'static str] {
        &self.markers
    }

    /// Whether the class carries the given marker.
    #[inline]
    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| *m == marker)
    }

    /// Method-level marker tags.
    #[inline]
    pub fn methods(&self) -> &[MethodTag] {
        &self.methods
    }

    #[inline]
    pub(crate) fn caster_for(&self, service: ServiceKey) -> Option<&CastFn> {
        self.services
            .iter()
            .find(|(key, _)| *key == service)
            .map(|(_, cast)| cast)
    }

    #[inline]
    pub(crate) fn ctor(&self) -> Option<&CtorFn> {
        self.ctor.as_ref()
    }

    #[inline]
    pub(crate) fn hook(&self) -> Option<&HookFn> {
        self.hook.as_ref()
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("component", &self.key.name())
            .field("scope", &self.scope)
            .field("priority", &self.priority)
            .field(
                "services",
                &self.services.iter().map(|(k, _)| k.name()).collect::<Vec<_>>(),
            )
            .field("requests", &self.requests.len())
            .finish()
    }
}

/// Fluent builder for [`ComponentDescriptor`].
pub struct DescriptorBuilder<C> {
    inner: ComponentDescriptor,
    _component: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> DescriptorBuilder<C> {
    /// Set the resolution priority (lower resolves first).
    #[inline]
    pub fn priority(mut self, priority: i32) -> Self {
        self.inner.priority = priority;
        self
    }

    /// Set the declared scope. Defaults to [`ScopeKey::APPLICATION`].
    #[inline]
    pub fn scope(mut self, scope: ScopeKey) -> Self {
        self.inner.scope = scope;
        self
    }

    /// Declare that this component satisfies the service `S`.
    ///
    /// The cast is an unsized coercion, so `C` failing to implement the
    /// service trait is a compile error — the assignability invariant holds
    /// by construction.
    ///
    /// ```
    /// # use wirebox::ComponentDescriptor;
    /// # use std::sync::Arc;
    /// trait Greeter: Send + Sync { fn hello(&self) -> String; }
    /// struct English;
    /// impl Greeter for English {
    ///     fn hello(&self) -> String { "hello".into() }
    /// }
    ///
    /// let descriptor = ComponentDescriptor::for_type::<English>()
    ///     .provides(|c| c as Arc<dyn Greeter>)
    ///     .constructor(|_| Ok(English))
    ///     .finish();
    /// ```
    pub fn provides<S: ?Sized + Send + Sync + 'static>(
        mut self,
        cast: fn(Arc<C>) -> Arc<S>,
    ) -> Self {
        let key = ServiceKey::of::<S>();
        let erased: CastFn = Arc::new(move |any: ErasedInstance| -> BoxedHandle {
            // SAFETY: instances under this descriptor are produced by its own
            // constructor, which returns the concrete component type C.
            let concrete = unsafe { downcast_arc_unchecked::<C>(any) };
            Box::new(cast(concrete))
        });

        // Re-declaring a service replaces the previous binding.
        if let Some(entry) = self.inner.services.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = erased;
        } else {
            self.inner.services.push((key, erased));
        }
        self
    }

    /// Set the constructor. The container materializes the declared
    /// dependency requests into `deps` before invoking it.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResolvedDeps) -> Result<C> + Send + Sync + 'static,
    {
        self.inner.ctor = Some(Arc::new(move |deps: &mut ResolvedDeps| {
            Ok(Arc::new(f(deps)?) as ErasedInstance)
        }));
        self
    }

    /// Set a hook invoked once, right after construction, before the
    /// instance becomes observable to any caller.
    pub fn post_construct<F>(mut self, f: F) -> Self
    where
        F: Fn(&C) -> Result<()> + Send + Sync + 'static,
    {
        let component = std::any::type_name::<C>();
        self.inner.hook = Some(Arc::new(move |any: &ErasedInstance| {
            match any.downcast_ref::<C>() {
                Some(instance) => f(instance),
                None => Err(IocError::construction(
                    component,
                    "post-construct hook received an instance of a different type",
                )),
            }
        }));
        self
    }

    /// Declare an injection point.
    #[inline]
    pub fn inject(mut self, request: DependencyRequest) -> Self {
        self.inner.requests.push(request);
        self
    }

    /// Attach a class-level marker tag.
    #[inline]
    pub fn marker(mut self, marker: &'static str) -> Self {
        self.inner.markers.push(marker);
        self
    }

    /// Attach a marker tag to a named method.
    #[inline]
    pub fn method_marker(mut self, method: &'static str, marker: &'static str) -> Self {
        self.inner.methods.push(MethodTag { method, marker });
        self
    }

    /// Finish the descriptor. Structural validation happens when the
    /// descriptor is registered with a repository builder.
    #[inline]
    pub fn finish(self) -> ComponentDescriptor {
        self.inner
    }
}

// =============================================================================
// Manual service registration
// =============================================================================

/// An explicit service-to-implementation binding that bypasses
/// repository-based discovery for `find` of that exact service.
///
/// The cast closure carries the compile-time proof that the implementation
/// satisfies the service; whether the implementation is a registered
/// component is validated when the repository is built.
pub struct ServiceRegistration {
    service: ServiceKey,
    component: ComponentKey,
    cast: CastFn,
}

impl ServiceRegistration {
    /// Bind service `S` to implementation `C`.
    ///
    /// ```
    /// # use wirebox::ServiceRegistration;
    /// # use std::sync::Arc;
    /// trait Mailer: Send + Sync {}
    /// struct SmtpMailer;
    /// impl Mailer for SmtpMailer {}
    ///
    /// let binding = ServiceRegistration::of(|c: Arc<SmtpMailer>| c as Arc<dyn Mailer>);
    /// ```
    pub fn of<C, S>(cast: fn(Arc<C>) -> Arc<S>) -> Self
    where
        C: Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        let erased: CastFn = Arc::new(move |any: ErasedInstance| -> BoxedHandle {
            // SAFETY: the binding targets component C; the repository only
            // hands this caster instances constructed under C's descriptor.
            let concrete = unsafe { downcast_arc_unchecked::<C>(any) };
            Box::new(cast(concrete))
        });
        Self {
            service: ServiceKey::of::<S>(),
            component: ComponentKey::of::<C>(),
            cast: erased,
        }
    }

    /// The bound service.
    #[inline]
    pub fn service(&self) -> ServiceKey {
        self.service
    }

    /// The implementation the service is bound to.
    #[inline]
    pub fn component(&self) -> ComponentKey {
        self.component
    }

    #[inline]
    pub(crate) fn caster(&self) -> &CastFn {
        &self.cast
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service", &self.service.name())
            .field("component", &self.component.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Speaker: Send + Sync {
        fn word(&self) -> &'static str;
    }

    struct Quiet;

    impl Speaker for Quiet {
        fn word(&self) -> &'static str {
            "shh"
        }
    }

    #[test]
    fn test_service_key_identity() {
        assert_eq!(ServiceKey::of::<dyn Speaker>(), ServiceKey::of::<dyn Speaker>());
        assert_ne!(ServiceKey::of::<dyn Speaker>(), ServiceKey::of::<Quiet>());
        assert!(ServiceKey::of::<dyn Speaker>().name().contains("Speaker"));
    }

    #[test]
    fn test_builder_defaults() {
        let descriptor = ComponentDescriptor::for_type::<Quiet>()
            .constructor(|_| Ok(Quiet))
            .finish();

        assert_eq!(descriptor.priority(), DEFAULT_PRIORITY);
        assert_eq!(descriptor.scope(), ScopeKey::APPLICATION);
        // Self-binding is implicit.
        assert!(descriptor.provides(ServiceKey::of::<Quiet>()));
        assert!(!descriptor.provides(ServiceKey::of::<dyn Speaker>()));
    }

    #[test]
    fn test_provides_and_cast() {
        let descriptor = ComponentDescriptor::for_type::<Quiet>()
            .provides(|c| c as Arc<dyn Speaker>)
            .constructor(|_| Ok(Quiet))
            .finish();

        assert!(descriptor.provides(ServiceKey::of::<dyn Speaker>()));

        let instance: ErasedInstance = Arc::new(Quiet);
        let cast = descriptor
            .caster_for(ServiceKey::of::<dyn Speaker>())
            .unwrap();
        let handle = cast(instance);
        let speaker = handle.downcast::<Arc<dyn Speaker>>().unwrap();
        assert_eq!(speaker.word(), "shh");
    }

    #[test]
    fn test_request_kinds() {
        let single = DependencyRequest::single::<dyn Speaker>("speaker");
        assert_eq!(single.slot(), "speaker");
        assert!(!single.is_next());
        assert_eq!(single.service(), Some(ServiceKey::of::<dyn Speaker>()));

        let next = DependencyRequest::next::<dyn Speaker>("after");
        assert!(next.is_next());

        let ctx = DependencyRequest::context("ctx");
        assert_eq!(ctx.service(), None);
    }

    #[test]
    fn test_markers() {
        let descriptor = ComponentDescriptor::for_type::<Quiet>()
            .marker("controller")
            .method_marker("handle", "route")
            .constructor(|_| Ok(Quiet))
            .finish();

        assert!(descriptor.has_marker("controller"));
        assert!(!descriptor.has_marker("service"));
        assert_eq!(
            descriptor.methods(),
            &[MethodTag {
                method: "handle",
                marker: "route"
            }]
        );
    }

    #[test]
    fn test_manual_registration_keys() {
        let binding = ServiceRegistration::of(|c: Arc<Quiet>| c as Arc<dyn Speaker>);
        assert_eq!(binding.service(), ServiceKey::of::<dyn Speaker>());
        assert_eq!(binding.component(), ComponentKey::of::<Quiet>());
    }
}
