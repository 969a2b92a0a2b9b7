//! Typed request-handling core for axum services.
//!
//! A handler declares its request and response types and its phases; the
//! pipeline parses and validates the request, keeps the request log, calls
//! the phases, and answers with the uniform response envelope.

// Core subsystems
pub mod config;
pub mod errors;
pub mod http;
pub mod pipeline;
pub mod runtime;
pub mod validation;

// Collaborators
pub mod crypto;
pub mod db;
pub mod endpoints;
pub mod request_log;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::schema::RuntimeConfig;
pub use errors::{Error, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{BodyMode, Handler, HandlerParameters, HandlerRequest};
pub use runtime::Runtime;
