//! Remote API calls.
//!
//! # Data Flow
//! ```text
//! RemoteCallHandler::initializer
//!     → headers (forwarded Authorization | Basic | cached bearer token)
//!     → path (base path + URL params, `*` → `/`)
//!     → parser locals `remoteHeaders`, `remotePath`
//! RemoteCallHandler::handler
//!     → next query (query stack head | static query)
//!     → RemoteApi::send (reqwest, per-call timeout and TLS mode)
//!     → builder | envelope decode → typed response
//! ```
//!
//! # Design Decisions
//! - One reqwest client pair (verifying, non-verifying) and one token cache
//!   per API, shared by every request
//! - Transport failures are classified once into `RemoteError`, then mapped
//!   onto the error taxonomy

pub mod client;
pub mod handler;
pub mod token;

use serde_json::Value;
use thiserror::Error;

use crate::errors::{self, Error};

pub use client::{body_value, ApiRegistry, CallParams, RemoteApi, RemoteResponse, ResponseBuilder};
pub use handler::{call_api, decode_envelope, RemoteCallHandler, REMOTE_HEADERS_LOCAL, REMOTE_PATH_LOCAL};
pub use token::{AccessToken, AuthSystem, ClientCredentialsLogin, StaticToken, TokenCache};

/// Failure of a remote call.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("api '{0}' is not configured")]
    UnknownApi(String),

    #[error("connect timed out: {0}")]
    ConnectTimeout(String),

    #[error("read timed out: {0}")]
    ReadTimeout(String),

    #[error("unable to call: {0}")]
    Call(String),

    #[error("unable to read response: {0}")]
    Read(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote returned {status}")]
    Nok { status: u16, body: Value },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("client setup failed: {0}")]
    Client(String),
}

impl RemoteError {
    /// Classify a reqwest transport error.
    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            if e.is_connect() {
                RemoteError::ConnectTimeout(e.to_string())
            } else {
                RemoteError::ReadTimeout(e.to_string())
            }
        } else if e.is_body() || e.is_decode() {
            RemoteError::Read(e.to_string())
        } else {
            RemoteError::Call(e.to_string())
        }
    }

    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            RemoteError::UnknownApi(_) | RemoteError::Client(_) => "config_error",
            RemoteError::ConnectTimeout(_) => "connect_timeout",
            RemoteError::ReadTimeout(_) => "read_timeout",
            RemoteError::Call(_) => "call_error",
            RemoteError::Read(_) => "read_error",
            RemoteError::NotFound(_) => "not_found",
            RemoteError::Nok { .. } => "nok",
            RemoteError::Auth(_) => "auth_error",
        }
    }
}

impl From<RemoteError> for Error {
    #[track_caller]
    fn from(err: RemoteError) -> Self {
        let message = err.to_string();
        match err {
            RemoteError::UnknownApi(_) | RemoteError::Client(_) => {
                Error::internal(errors::REMOTE_CALL_ERROR, message)
            }
            RemoteError::ConnectTimeout(_) => Error::new(408, errors::API_CONNECT_TIMED_OUT, message),
            RemoteError::ReadTimeout(_) => Error::new(408, errors::API_READ_TIMED_OUT, message),
            RemoteError::Call(_) => Error::internal(errors::API_UNABLE_TO_CALL, message),
            RemoteError::Read(_) => Error::internal(errors::API_UNABLE_TO_READ, message),
            RemoteError::NotFound(_) => Error::new(404, errors::API_NOT_FOUND, message),
            RemoteError::Nok { status, body } => {
                let status = if (400..600).contains(&status) { status } else { 500 };
                Error::new(status, errors::API_NOK, body)
            }
            RemoteError::Auth(_) => Error::new(401, errors::API_AUTH_FAILED, message),
        }
    }
}
