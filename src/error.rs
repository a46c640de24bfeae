//! Error types for container operations

use thiserror::Error;

/// Errors produced by repository construction and component resolution.
///
/// Repository-build failures (`Validation`) are startup-fatal by caller
/// policy; the remaining variants are per-request and leave the container
/// and sibling scopes fully usable.
#[derive(Error, Debug, Clone)]
pub enum IocError {
    /// Malformed component declaration or incompatible manual binding.
    #[error("invalid registration: {reason}")]
    Validation { reason: String },

    /// No implementation matched a required service at request time.
    #[error("no implementation found for service: {service}")]
    NotFound { service: &'static str },

    /// A construction cycle was detected while resolving.
    #[error("cyclic dependency detected: {path}")]
    Cycle { path: String },

    /// A constructor or post-construct hook failed.
    #[error("failed to construct component {component}: {reason}")]
    Construction {
        component: &'static str,
        reason: String,
    },

    /// A constructor asked for a slot that was missing or of the wrong type.
    #[error("injection slot '{slot}' error: {reason}")]
    Injection {
        slot: &'static str,
        reason: String,
    },

    /// Operation attempted on a context after teardown.
    #[error("scope '{scope}' is closed")]
    ScopeClosed { scope: &'static str },
}

impl IocError {
    /// Create a NotFound error for a service type
    #[inline]
    pub fn not_found<S: ?Sized + 'static>() -> Self {
        Self::NotFound {
            service: std::any::type_name::<S>(),
        }
    }

    /// Create a Validation error
    #[inline]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Create a Construction error for a component type
    #[inline]
    pub fn construction(component: &'static str, reason: impl Into<String>) -> Self {
        Self::Construction {
            component,
            reason: reason.into(),
        }
    }

    /// Create an Injection error for a slot
    #[inline]
    pub fn injection(slot: &'static str, reason: impl Into<String>) -> Self {
        Self::Injection {
            slot,
            reason: reason.into(),
        }
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, IocError>;
