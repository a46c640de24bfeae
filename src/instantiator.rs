//! Component construction, dependency materialization and cycle detection
//!
//! Construction for a component happens at most once per owning context:
//! the context cache holds a `OnceCell` per component type, and the first
//! resolver to reach an empty cell runs the constructor while later ones
//! block and observe the finished instance. A failed constructor leaves
//! the cell empty, so a later request retries cleanly.
//!
//! Cycles are caught before entering the cell: a thread-local stack
//! records every component whose constructor is running on this thread,
//! and a repeat entry aborts with [`IocError::Cycle`] instead of
//! deadlocking on a cell the thread already holds. Being thread-local, it
//! also covers constructors that loop back through a fresh public lookup
//! on an injected context handle, not just the direct recursion inside
//! one resolution call.

use crate::context::Context;
use crate::descriptor::{
    BoxedHandle, ComponentDescriptor, ComponentKey, ErasedInstance, RequestKind,
};
use crate::error::{IocError, Result};
use crate::resolver;
use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Downcast a type-erased service handle back to the `Arc<S>` it carries.
pub(crate) fn downcast_handle<S: ?Sized + Send + Sync + 'static>(
    handle: BoxedHandle,
) -> Result<Arc<S>> {
    match handle.downcast::<Arc<S>>() {
        Ok(boxed) => Ok(*boxed),
        Err(_) => Err(IocError::construction(
            std::any::type_name::<S>(),
            "service handle does not match the requested type",
        )),
    }
}

// =============================================================================
// Construction stack
// =============================================================================

thread_local! {
    /// Components whose constructors are running on this thread, outermost
    /// first. Cross-thread waiting on a cell is legitimate; same-thread
    /// re-entry is always a cycle.
    static CONSTRUCTING: RefCell<Vec<ComponentKey>> = const { RefCell::new(Vec::new()) };
}

fn under_construction(component: TypeId) -> bool {
    CONSTRUCTING.with(|stack| stack.borrow().iter().any(|key| key.id() == component))
}

/// Render the in-flight path as `A -> B -> C` with `tail` appended, for
/// cycle diagnostics.
fn construction_path(tail: &'static str) -> String {
    CONSTRUCTING.with(|stack| {
        let mut path = String::new();
        for frame in stack.borrow().iter() {
            path.push_str(frame.name());
            path.push_str(" -> ");
        }
        path.push_str(tail);
        path
    })
}

/// Pops its frame when dropped, so the stack unwinds with the call even
/// when a constructor errors or panics.
struct Frame;

impl Frame {
    fn enter(component: ComponentKey) -> Self {
        CONSTRUCTING.with(|stack| stack.borrow_mut().push(component));
        Frame
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// ResolvedDeps
// =============================================================================

pub(crate) enum SlotValue {
    One(BoxedHandle),
    Many(Vec<BoxedHandle>),
    Absent,
    Ctx(Context),
    Taken,
}

/// The materialized dependency bundle handed to a component constructor.
///
/// Slots are keyed by the names given in the descriptor's
/// [`DependencyRequest`](crate::DependencyRequest)s; each slot is consumed
/// once by the matching `take_*` call.
///
/// ```
/// # use wirebox::{ClassRepository, ComponentDescriptor, Context, DependencyRequest};
/// # use std::sync::Arc;
/// struct Engine;
/// struct Car { engine: Arc<Engine> }
///
/// let repo = ClassRepository::builder()
///     .component(
///         ComponentDescriptor::for_type::<Engine>()
///             .constructor(|_| Ok(Engine))
///             .finish(),
///     )
///     .component(
///         ComponentDescriptor::for_type::<Car>()
///             .inject(DependencyRequest::single::<Engine>("engine"))
///             .constructor(|deps| Ok(Car { engine: deps.take::<Engine>("engine")? }))
///             .finish(),
///     )
///     .build()
///     .unwrap();
///
/// let ctx = Context::root(Arc::new(repo));
/// let car = ctx.find::<Car>().unwrap();
/// assert!(Arc::ptr_eq(&car.engine, &ctx.find::<Engine>().unwrap()));
/// ```
pub struct ResolvedDeps {
    slots: Vec<(&'static str, SlotValue)>,
}

impl ResolvedDeps {
    #[inline]
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    #[inline]
    pub(crate) fn insert(&mut self, slot: &'static str, value: SlotValue) {
        self.slots.push((slot, value));
    }

    fn take_value(&mut self, slot: &'static str) -> Result<SlotValue> {
        match self.slots.iter_mut().find(|(name, _)| *name == slot) {
            Some(entry) => match std::mem::replace(&mut entry.1, SlotValue::Taken) {
                SlotValue::Taken => Err(IocError::injection(slot, "slot was already taken")),
                value => Ok(value),
            },
            None => Err(IocError::injection(
                slot,
                "slot was not declared as a dependency of this component",
            )),
        }
    }

    /// Take a required single instance out of the named slot.
    pub fn take<S: ?Sized + Send + Sync + 'static>(
        &mut self,
        slot: &'static str,
    ) -> Result<Arc<S>> {
        match self.take_value(slot)? {
            SlotValue::One(handle) => downcast_slot::<S>(slot, handle),
            SlotValue::Absent => Err(IocError::injection(
                slot,
                "dependency resolved to nothing; declare it optional and use take_opt",
            )),
            _ => Err(IocError::injection(slot, "slot does not hold a single instance")),
        }
    }

    /// Take an optional single instance out of the named slot.
    pub fn take_opt<S: ?Sized + Send + Sync + 'static>(
        &mut self,
        slot: &'static str,
    ) -> Result<Option<Arc<S>>> {
        match self.take_value(slot)? {
            SlotValue::One(handle) => Ok(Some(downcast_slot::<S>(slot, handle)?)),
            SlotValue::Absent => Ok(None),
            _ => Err(IocError::injection(slot, "slot does not hold a single instance")),
        }
    }

    /// Take every resolved implementation out of the named slot, in
    /// resolution order.
    pub fn take_all<S: ?Sized + Send + Sync + 'static>(
        &mut self,
        slot: &'static str,
    ) -> Result<Vec<Arc<S>>> {
        match self.take_value(slot)? {
            SlotValue::Many(handles) => handles
                .into_iter()
                .map(|handle| downcast_slot::<S>(slot, handle))
                .collect(),
            _ => Err(IocError::injection(slot, "slot does not hold an instance list")),
        }
    }

    /// Take the owning context handle out of the named slot.
    pub fn take_context(&mut self, slot: &'static str) -> Result<Context> {
        match self.take_value(slot)? {
            SlotValue::Ctx(ctx) => Ok(ctx),
            _ => Err(IocError::injection(slot, "slot does not hold a context")),
        }
    }
}

fn downcast_slot<S: ?Sized + Send + Sync + 'static>(
    slot: &'static str,
    handle: BoxedHandle,
) -> Result<Arc<S>> {
    match handle.downcast::<Arc<S>>() {
        Ok(boxed) => Ok(*boxed),
        Err(_) => Err(IocError::injection(
            slot,
            "requested type does not match the declared dependency service",
        )),
    }
}

// =============================================================================
// Construction
// =============================================================================

/// The instance of `descriptor` in its owning context, constructing it on
/// first use.
pub(crate) fn instance_of(
    owner: &Context,
    descriptor: &ComponentDescriptor,
) -> Result<ErasedInstance> {
    owner.ensure_active()?;

    let component = descriptor.key();
    if let Some(instance) = owner.cached(component.id()) {
        return Ok(instance);
    }

    // Re-entering a component this thread is already constructing would
    // deadlock on its own cell; report the cycle instead. This catches
    // both nested dependency requests and constructors that call back in
    // through an injected context.
    if under_construction(component.id()) {
        return Err(IocError::Cycle {
            path: construction_path(component.name()),
        });
    }

    let _frame = Frame::enter(component);
    let cell = owner.cache_cell(component.id());
    cell.get_or_try_init(|| construct(owner, descriptor)).cloned()
}

/// Materialize the declared dependency requests and run the constructor,
/// then the post-construct hook. Called under the component's cell, so the
/// instance is observable only after the hook succeeds.
fn construct(owner: &Context, descriptor: &ComponentDescriptor) -> Result<ErasedInstance> {
    #[cfg(feature = "logging")]
    debug!(
        target: "wirebox",
        component = descriptor.key().name(),
        scope = %owner.scope(),
        requests = descriptor.requests().len(),
        "Constructing component"
    );

    let mut deps = ResolvedDeps::new();
    for request in descriptor.requests() {
        let value = match request.kind() {
            RequestKind::Single {
                service,
                next,
                optional,
            } => {
                let handle = if *next {
                    resolver::resolve_next(owner, descriptor.key().id(), *service)?
                } else {
                    resolver::resolve_one(owner, *service)?
                };
                match handle {
                    Some(handle) => SlotValue::One(handle),
                    None if *optional => SlotValue::Absent,
                    None => {
                        return Err(IocError::injection(
                            request.slot(),
                            format!(
                                "no implementation found for required service {}",
                                service.name()
                            ),
                        ));
                    }
                }
            }
            RequestKind::All { service } => {
                SlotValue::Many(resolver::resolve_all(owner, *service)?)
            }
            RequestKind::Context => SlotValue::Ctx(owner.clone()),
        };
        deps.insert(request.slot(), value);
    }

    let ctor = descriptor.ctor().ok_or_else(|| {
        IocError::construction(descriptor.key().name(), "component has no constructor")
    })?;
    let instance = ctor(&mut deps)?;

    if let Some(hook) = descriptor.hook() {
        hook(&instance)?;
    }

    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DependencyRequest;
    use crate::repository::ClassRepository;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Engine;
    struct Car {
        engine: Arc<Engine>,
    }

    fn car_repo() -> Arc<ClassRepository> {
        Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Engine>()
                        .constructor(|_| Ok(Engine))
                        .finish(),
                )
                .component(
                    ComponentDescriptor::for_type::<Car>()
                        .inject(DependencyRequest::single::<Engine>("engine"))
                        .constructor(|deps| {
                            Ok(Car {
                                engine: deps.take::<Engine>("engine")?,
                            })
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_transitive_injection_shares_instances() {
        let ctx = Context::root(car_repo());
        let car = ctx.find::<Car>().unwrap();
        let engine = ctx.find::<Engine>().unwrap();
        assert!(Arc::ptr_eq(&car.engine, &engine));
    }

    #[test]
    fn test_construct_at_most_once_across_threads() {
        struct Counted;
        let built = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&built);

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Counted>()
                        .constructor(move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(Counted)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    Arc::as_ptr(&ctx.find::<Counted>().unwrap()) as usize
                })
            })
            .collect();

        let pointers: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(pointers.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_cycle_reports_the_path() {
        struct Chicken;
        struct Egg;

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Chicken>()
                        .inject(DependencyRequest::single::<Egg>("egg"))
                        .constructor(|deps| {
                            deps.take::<Egg>("egg")?;
                            Ok(Chicken)
                        })
                        .finish(),
                )
                .component(
                    ComponentDescriptor::for_type::<Egg>()
                        .inject(DependencyRequest::single::<Chicken>("chicken"))
                        .constructor(|deps| {
                            deps.take::<Chicken>("chicken")?;
                            Ok(Egg)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        let err = ctx.find::<Chicken>().map(|_| ()).unwrap_err();
        match err {
            IocError::Cycle { path } => {
                assert!(path.contains("Chicken"));
                assert!(path.contains("Egg"));
                assert!(path.contains(" -> "));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_lookup_of_self_reports_cycle() {
        // A constructor that loops back through its injected context is the
        // same cycle as a declared self-dependency, it just arrives through
        // a fresh lookup call. It must error, not block on its own cell.
        struct SelfCaller;

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<SelfCaller>()
                        .inject(DependencyRequest::context("ctx"))
                        .constructor(|deps| {
                            let ctx = deps.take_context("ctx")?;
                            ctx.find::<SelfCaller>()?;
                            Ok(SelfCaller)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        let err = ctx.find::<SelfCaller>().map(|_| ()).unwrap_err();
        match err {
            IocError::Cycle { path } => assert!(path.contains("SelfCaller")),
            other => panic!("expected cycle error, got {other:?}"),
        }

        // The failure unwinds the construction stack, so a retry runs the
        // constructor again instead of tripping over a stale frame.
        let again = ctx.find::<SelfCaller>().map(|_| ()).unwrap_err();
        assert!(matches!(again, IocError::Cycle { .. }));
    }

    #[test]
    fn test_indirect_lookup_cycle_reports_both_components() {
        // A -> (context lookup) -> B -> (declared dependency) -> A.
        struct Alpha;
        struct Beta;

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Alpha>()
                        .inject(DependencyRequest::context("ctx"))
                        .constructor(|deps| {
                            let ctx = deps.take_context("ctx")?;
                            ctx.find::<Beta>()?;
                            Ok(Alpha)
                        })
                        .finish(),
                )
                .component(
                    ComponentDescriptor::for_type::<Beta>()
                        .inject(DependencyRequest::single::<Alpha>("alpha"))
                        .constructor(|deps| {
                            deps.take::<Alpha>("alpha")?;
                            Ok(Beta)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        let err = ctx.find::<Alpha>().map(|_| ()).unwrap_err();
        match err {
            IocError::Cycle { path } => {
                assert!(path.contains("Alpha"));
                assert!(path.contains("Beta"));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_failed_constructor_retries() {
        struct Flaky;
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Flaky>()
                        .constructor(move |_| {
                            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                                Err(IocError::construction("Flaky", "warming up"))
                            } else {
                                Ok(Flaky)
                            }
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        assert!(matches!(
            ctx.find::<Flaky>(),
            Err(IocError::Construction { .. })
        ));
        // The cell stays empty after a failure, so the next request retries.
        assert!(ctx.find::<Flaky>().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_post_construct_runs_once_before_visibility() {
        struct Hooked;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Hooked>()
                        .constructor(|_| Ok(Hooked))
                        .post_construct(move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        ctx.find::<Hooked>().unwrap();
        ctx.find::<Hooked>().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_hook_fails_construction() {
        struct BadHook;
        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<BadHook>()
                        .constructor(|_| Ok(BadHook))
                        .post_construct(|_| {
                            Err(IocError::construction("BadHook", "hook refused"))
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        assert!(matches!(
            ctx.find::<BadHook>(),
            Err(IocError::Construction { .. })
        ));
    }

    #[test]
    fn test_optional_and_all_slots() {
        trait Plugin: Send + Sync {}
        struct Missing;
        struct Host {
            fallback: Option<Arc<Missing>>,
            plugins: Vec<Arc<dyn Plugin>>,
        }

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Host>()
                        .inject(DependencyRequest::optional::<Missing>("fallback"))
                        .inject(DependencyRequest::all::<dyn Plugin>("plugins"))
                        .constructor(|deps| {
                            Ok(Host {
                                fallback: deps.take_opt::<Missing>("fallback")?,
                                plugins: deps.take_all::<dyn Plugin>("plugins")?,
                            })
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        let host = ctx.find::<Host>().unwrap();
        assert!(host.fallback.is_none());
        assert!(host.plugins.is_empty());
    }

    #[test]
    fn test_required_slot_missing_is_injection_error() {
        struct Lonely;
        struct Needy;

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Needy>()
                        .inject(DependencyRequest::single::<Lonely>("buddy"))
                        .constructor(|deps| {
                            deps.take::<Lonely>("buddy")?;
                            Ok(Needy)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        assert!(matches!(
            ctx.find::<Needy>(),
            Err(IocError::Injection { slot: "buddy", .. })
        ));
    }

    #[test]
    fn test_undeclared_slot_take_fails() {
        struct Sloppy;
        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Sloppy>()
                        .constructor(|deps| {
                            deps.take::<Engine>("never_declared")?;
                            Ok(Sloppy)
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let ctx = Context::root(repo);
        assert!(matches!(
            ctx.find::<Sloppy>(),
            Err(IocError::Injection { .. })
        ));
    }

    #[test]
    fn test_context_slot_is_owning_context() {
        struct Aware {
            ctx: Context,
        }

        let repo = Arc::new(
            ClassRepository::builder()
                .component(
                    ComponentDescriptor::for_type::<Aware>()
                        .inject(DependencyRequest::context("ctx"))
                        .constructor(|deps| {
                            Ok(Aware {
                                ctx: deps.take_context("ctx")?,
                            })
                        })
                        .finish(),
                )
                .build()
                .unwrap(),
        );

        let root = Context::root(repo);
        let aware = root.find::<Aware>().unwrap();
        assert_eq!(aware.ctx.scope(), root.scope());
        // Same cached instance through the injected handle.
        let again = aware.ctx.find::<Aware>().unwrap();
        assert!(Arc::ptr_eq(&aware, &again));
    }
}
