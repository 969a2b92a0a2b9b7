//! Request log and audit store.
//!
//! # Data Flow
//! ```text
//! pipeline parse ok
//!     → trail::initialize (check duplicate → insert → attach `reqLog` local)
//! handler
//!     → trail::log_start / add_log_event / log_end (events + entries)
//! response emitted
//!     → trail::update_request (outgoing + result → store update)
//! ```
//!
//! # Design Decisions
//! - Stores are pluggable behind one trait: nothing, structured logs, or the
//!   `request` table
//! - The record lives behind one shared pointer in the parser's locals; a
//!   request is the only writer of its record

pub mod model;
pub mod stores;
pub mod trail;

use async_trait::async_trait;

use crate::errors::Result;

pub use model::{Event, LogEntry, RequestLog, SharedRequestLog};
pub use stores::{DbRequestStore, NoRequestStore, TracingRequestStore};
pub use trail::RequestPtr;

/// Local holding the request's [`SharedRequestLog`].
pub const REQ_LOG: &str = "reqLog";

/// Persistence behind the audit trail.
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// `DUPLICATE_REQUEST` when a record with `id` already exists.
    async fn check_duplicate(&self, id: &str) -> Result<()>;

    async fn insert(&self, log: &RequestLog) -> Result<()>;

    async fn update(&self, log: &RequestLog) -> Result<()>;
}
