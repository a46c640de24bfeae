//! # wirebox
//!
//! A priority-ordered, scope-aware inversion-of-control container.
//!
//! Applications declare their implementation classes as
//! [`ComponentDescriptor`]s: which service types each class satisfies, its
//! resolution priority, its declared scope and its injection points. The
//! descriptors are collected into an immutable [`ClassRepository`], and a
//! [`Context`] resolves services against it at runtime, constructing each
//! component at most once per scope and wiring its dependencies first.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use wirebox::{ClassRepository, ComponentDescriptor, Context, DependencyRequest};
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".into()
//!     }
//! }
//!
//! struct App {
//!     greeter: Arc<dyn Greeter>,
//! }
//!
//! let repo = ClassRepository::builder()
//!     .component(
//!         ComponentDescriptor::for_type::<English>()
//!             .provides(|c| c as Arc<dyn Greeter>)
//!             .constructor(|_| Ok(English))
//!             .finish(),
//!     )
//!     .component(
//!         ComponentDescriptor::for_type::<App>()
//!             .inject(DependencyRequest::single::<dyn Greeter>("greeter"))
//!             .constructor(|deps| {
//!                 Ok(App {
//!                     greeter: deps.take::<dyn Greeter>("greeter")?,
//!                 })
//!             })
//!             .finish(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let ctx = Context::root(Arc::new(repo));
//! let app = ctx.find::<App>().unwrap();
//! assert_eq!(app.greeter.greet(), "hello");
//! ```
//!
//! ## Resolution order
//!
//! When several components provide the same service, [`Context::find`]
//! returns the one with the lowest priority value and
//! [`Context::find_all`] returns all of them in order. Components in a
//! nearer scope always precede inherited ones, and ties within a scope
//! keep registration order. A component can ask for the implementation
//! ranked directly after itself with [`DependencyRequest::next`], which is
//! how decorator chains over a shared service type are built.
//!
//! ## Scopes
//!
//! Every context runs in a named scope and caches exactly the components
//! declared for that scope. [`Context::enter_scope`] derives a child that
//! resolves locally first and escalates to its parent, so an
//! application-scoped singleton observed from a request scope is the same
//! instance the root holds. [`Context::close`] tears down one scope
//! without touching its ancestors.
//!
//! ## Features
//!
//! - `logging` (default) - trace container events through [`tracing`]
//! - `logging-pretty` - colorful console output via `tracing-subscriber`
//! - `logging-json` - JSON structured output via `tracing-subscriber`

mod context;
mod descriptor;
mod error;
mod instantiator;
pub mod logging;
mod repository;
mod resolver;

pub use context::Context;
pub use descriptor::{
    ComponentDescriptor, ComponentKey, DEFAULT_PRIORITY, DependencyRequest, DescriptorBuilder,
    MethodTag, ScopeKey, ServiceKey, ServiceRegistration,
};
pub use error::{IocError, Result};
pub use instantiator::ResolvedDeps;
pub use repository::{ClassRepository, RepositoryBuilder};

/// Convenience re-exports for the common registration and lookup surface.
pub mod prelude {
    pub use crate::{
        ClassRepository, ComponentDescriptor, Context, DependencyRequest, IocError, ResolvedDeps,
        Result, ScopeKey, ServiceRegistration,
    };
}

#[cfg(feature = "logging")]
pub use tracing;
