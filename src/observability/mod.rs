//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → tracing.rs (root span per sampled request)
//!     → trace.rs (child spans around handler phases and helpers)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics recorder installed by the host
//!     → Span exporter installed by the host subscriber
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all subsystems
//! - Metrics are cheap (atomic increments)
//! - Tracing is optional; disabled requests pay one branch per wrapper

pub mod logging;
pub mod metrics;
pub mod trace;
pub mod tracing;

pub use self::trace::{trace_error, trace_func, trace_in, trace_void, trace_with, Traceable};
pub use self::tracing::{global_manager, set_global_manager, TracingConfig, TracingManager};
