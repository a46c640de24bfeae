//! Logging setup for container events
//!
//! Every event the container emits carries the `wirebox` target plus
//! structured fields describing the resolution: the service looked up,
//! the component chosen, and the scope that owns it. Repository build and
//! scope lifecycle log at `debug`, per-lookup decisions at `trace`.
//!
//! This module wires a `tracing-subscriber` formatter for those events.
//! It is a convenience for binaries and tests; an embedding application
//! that already installs its own subscriber should skip it, since the
//! events flow through whatever subscriber is global.
//!
//! # Features
//!
//! - `logging` - emit container tracing events (default)
//! - `logging-json` - enable the JSON formatter
//! - `logging-pretty` - enable the pretty console formatter
//!
//! # Example
//!
//! ```rust,ignore
//! // Container events only, at trace level, human-readable:
//! wirebox::logging::builder()
//!     .level(tracing::Level::TRACE)
//!     .pretty()
//!     .init();
//!
//! // Everything the process logs, as JSON:
//! wirebox::logging::builder().all_targets().json().init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// How container events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log aggregation.
    #[default]
    Json,
    /// Multi-line colorful output for a development console.
    Pretty,
}

/// Configures and installs the global subscriber for container events.
///
/// By default only the `wirebox` target is let through, at `DEBUG`, in
/// JSON.
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    all_targets: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            all_targets: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level. `TRACE` additionally shows every candidate
    /// decision the resolver makes; `DEBUG` covers construction, scope
    /// lifecycle and repository builds.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Let events from every target through, not just `wirebox`.
    pub fn all_targets(mut self) -> Self {
        self.all_targets = true;
        self
    }

    /// Render events as JSON.
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Render events for a development console.
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Install the global subscriber.
    ///
    /// Requires `logging-json` or `logging-pretty`; without a formatter
    /// feature this is a no-op and events go to whatever subscriber the
    /// application installs itself.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if self.all_targets {
            EnvFilter::new(self.level.to_string())
        } else {
            EnvFilter::new(format!("wirebox={}", self.level))
        };

        match self.format {
            LogFormat::Json => {
                #[cfg(feature = "logging-json")]
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_target(true))
                    .init();
                // Without the json formatter compiled in, fall back to the
                // plain one rather than silently dropping events.
                #[cfg(not(feature = "logging-json"))]
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_target(true))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty().with_target(true))
                    .init();
            }
        }
    }

    /// No-op without a formatter feature.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Start configuring the container log output.
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install the default subscriber: container events at `DEBUG`, JSON when
/// the `logging-json` formatter is compiled in, pretty otherwise.
#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().init();
    #[cfg(all(feature = "logging-pretty", not(feature = "logging-json")))]
    builder().pretty().init();
}

/// No-op without a formatter feature.
#[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
pub fn init() {}
