//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     RuntimeConfig → database → request log store → header config
//!         → tracing config → remote APIs → Runtime → config watcher
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: the database comes first because the request log
//!   store may depend on it
//! - Fail fast: any startup error is fatal
//! - The config watcher only hot-reloads message tables

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, Started, StartupError};
