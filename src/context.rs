//! Contexts: the live object graph for one scope
//!
//! A [`Context`] is a cheap-clone handle over one scope's instance cache,
//! with an optional parent forming a chain up to the root. Lookups consult
//! the local cache, then the repository descriptors declared for the local
//! scope, then escalate to the parent. Instances are cached only in the
//! context owning their declared scope, so a child resolving an
//! application-scoped singleton observes the exact instance the root holds.
//!
//! A context is active from creation until [`close`](Context::close);
//! closing is idempotent, releases the local cache and fails every later
//! operation with [`IocError::ScopeClosed`]. Closing a child never touches
//! instances owned by an ancestor.

use crate::descriptor::{ErasedInstance, ScopeKey, ServiceKey};
use crate::error::{IocError, Result};
use crate::instantiator::downcast_handle;
use crate::repository::ClassRepository;
use crate::resolver;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

struct ContextInner {
    scope: ScopeKey,
    repository: Arc<ClassRepository>,
    parent: Option<Context>,
    /// Component type id → at-most-once instance slot. The cell serializes
    /// first-time construction per key; populated entries read lock-free.
    cache: DashMap<TypeId, Arc<OnceCell<ErasedInstance>>, RandomState>,
    closed: AtomicBool,
    depth: u32,
}

/// The runtime object graph holder for one scope.
///
/// ```
/// # use wirebox::{ClassRepository, ComponentDescriptor, Context};
/// # use std::sync::Arc;
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
///
/// let ctx = Context::root(Arc::new(repo));
/// let clock = ctx.find::<Clock>().unwrap();
/// let again = ctx.find::<Clock>().unwrap();
/// assert!(Arc::ptr_eq(&clock, &again));
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create the root context in [`ScopeKey::APPLICATION`].
    #[inline]
    pub fn root(repository: Arc<ClassRepository>) -> Self {
        Self::root_in(repository, ScopeKey::APPLICATION)
    }

    /// Create a root context in an explicit scope.
    pub fn root_in(repository: Arc<ClassRepository>, scope: ScopeKey) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "wirebox",
            scope = %scope,
            components = repository.len(),
            "Creating root context"
        );

        Self {
            inner: Arc::new(ContextInner {
                scope,
                repository,
                parent: None,
                cache: DashMap::with_hasher(RandomState::new()),
                closed: AtomicBool::new(false),
                depth: 0,
            }),
        }
    }

    /// Enter a child scope. The child shares the repository and resolves
    /// through this context for services it cannot satisfy locally.
    pub fn enter_scope(&self, scope: ScopeKey) -> Result<Context> {
        self.ensure_active()?;

        #[cfg(feature = "logging")]
        debug!(
            target: "wirebox",
            scope = %scope,
            parent_scope = %self.scope(),
            depth = self.depth() + 1,
            "Entering child scope"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                scope,
                repository: Arc::clone(&self.inner.repository),
                parent: Some(self.clone()),
                cache: DashMap::with_hasher(RandomState::new()),
                closed: AtomicBool::new(false),
                depth: self.inner.depth + 1,
            }),
        })
    }

    /// Tear down this scope: release every locally cached instance and
    /// reject all further operations. Idempotent. Instances owned by
    /// ancestor scopes are untouched.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.inner.cache.len();
        self.inner.cache.clear();

        #[cfg(feature = "logging")]
        debug!(
            target: "wirebox",
            scope = %self.scope(),
            depth = self.depth(),
            released = released,
            "Scope closed"
        );
        #[cfg(not(feature = "logging"))]
        let _ = released;
    }

    /// Whether this context has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The scope this context runs in.
    #[inline]
    pub fn scope(&self) -> ScopeKey {
        self.inner.scope
    }

    /// The parent context, if this is not the root.
    #[inline]
    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// Chain depth; the root is 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// The shared class repository.
    #[inline]
    pub fn repository(&self) -> &Arc<ClassRepository> {
        &self.inner.repository
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the highest-priority implementation of `S` visible from this
    /// scope, constructing and caching it in its owning context if needed.
    pub fn find<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        match resolver::resolve_one(self, ServiceKey::of::<S>())? {
            Some(handle) => downcast_handle::<S>(handle),
            None => Err(IocError::not_found::<S>()),
        }
    }

    /// Like [`find`](Self::find), but an absent implementation is the
    /// explicit `Ok(None)` value rather than an error. Construction
    /// failures and cycles still surface as `Err`.
    pub fn try_find<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<S>>> {
        match resolver::resolve_one(self, ServiceKey::of::<S>())? {
            Some(handle) => Ok(Some(downcast_handle::<S>(handle)?)),
            None => Ok(None),
        }
    }

    /// Resolve every visible implementation of `S` in resolution order:
    /// nearest scope first, then priority ascending, ties in registration
    /// order. An empty vec is a valid result.
    pub fn find_all<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<S>>> {
        let handles = resolver::resolve_all(self, ServiceKey::of::<S>())?;
        handles.into_iter().map(downcast_handle::<S>).collect()
    }

    /// Resolve the implementation of `S` immediately after component `C`'s
    /// position in resolution order. `Ok(None)` when `C` is the last (or
    /// not an) implementation of `S`.
    pub fn find_next<S, C>(&self) -> Result<Option<Arc<S>>>
    where
        S: ?Sized + Send + Sync + 'static,
        C: 'static,
    {
        match resolver::resolve_next(self, TypeId::of::<C>(), ServiceKey::of::<S>())? {
            Some(handle) => Ok(Some(downcast_handle::<S>(handle)?)),
            None => Ok(None),
        }
    }

    /// Whether any implementation of `S` is visible from this scope.
    /// Returns `false` on a closed context.
    pub fn contains<S: ?Sized + Send + Sync + 'static>(&self) -> bool {
        resolver::has_candidates(self, ServiceKey::of::<S>()).unwrap_or(false)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    #[inline]
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_closed() {
            return Err(IocError::ScopeClosed {
                scope: self.scope().name(),
            });
        }
        Ok(())
    }

    /// The at-most-once construction slot for a component type in this
    /// context's cache.
    pub(crate) fn cache_cell(&self, component: TypeId) -> Arc<OnceCell<ErasedInstance>> {
        let entry = self
            .inner
            .cache
            .entry(component)
            .or_insert_with(|| Arc::new(OnceCell::new()));
        Arc::clone(entry.value())
    }

    /// A populated cache entry, if present. Never constructs.
    pub(crate) fn cached(&self, component: TypeId) -> Option<ErasedInstance> {
        self.inner
            .cache
            .get(&component)
            .and_then(|cell| cell.get().cloned())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.scope().name())
            .field("depth", &self.depth())
            .field("cached", &self.inner.cache.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
