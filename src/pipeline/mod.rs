//! Typed handler pipeline.
//!
//! # Data Flow
//! ```text
//! axum route
//!     → handler() closure → Pipeline::execute
//!     → AxumParser (header, body, locals, span)
//!     → parse (body mode) → validate → request log insert
//!     → Handler::initializer → Handler::handler (traced when enabled)
//!     → WsResponse envelope | receipt | file attachment
//!     → request log update → log tags flushed
//!     → Handler::finalizer on a spawned task
//! ```
//!
//! # Design Decisions
//! - One `HandlerRequest` per request, owned by the executor and lent to
//!   each phase; the handler never holds the runtime by embedding
//! - Panics anywhere in the phases are caught once; the fault response is
//!   returned, or the panic resumed when the runtime says so
//! - Finalizers run after the response on every path that reached the
//!   initializer, exactly once

pub mod executor;
pub mod handler;
pub mod log_tags;
pub mod recovery;
pub mod request;

use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::runtime::Runtime;

pub use executor::Pipeline;
pub use handler::{BodyMode, FileResponse, Handler, HandlerParameters, RecoveryHandler};
pub use log_tags::LogTags;
pub use request::{HandlerRequest, Stage};

/// Lift a handler into an axum handler closure.
///
/// ```ignore
/// let app = Router::new().route("/transfer", post(pipeline::handler(runtime, Transfer)));
/// ```
pub fn handler<H: Handler>(
    runtime: Arc<Runtime>,
    handler: H,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    let pipeline = Pipeline::new(runtime, handler);
    move |req: Request| {
        let pipeline = pipeline.clone();
        Box::pin(async move { pipeline.execute(req).await })
    }
}
