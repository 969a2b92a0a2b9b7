//! The handler contract and its per-endpoint parameters.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{self, Error, Result};
use crate::pipeline::request::HandlerRequest;
use crate::validation::Validate;

/// Where the typed request is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyMode {
    #[default]
    Json,
    Query,
    Uri,
    QueryPagination,
    UriPagination,
}

impl BodyMode {
    pub fn is_paginated(self) -> bool {
        matches!(self, BodyMode::QueryPagination | BodyMode::UriPagination)
    }
}

/// Builds the response sent after a panic, given the panic message.
pub type RecoveryHandler = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Registration options of one endpoint.
#[derive(Clone)]
pub struct HandlerParameters {
    pub title: String,
    pub body_mode: BodyMode,
    pub validate_header: bool,
    pub save_to_request_log: bool,
    pub path: String,
    pub has_receipt: bool,
    pub recovery_handler: Option<RecoveryHandler>,
    /// The handler's response is a [`FileResponse`] streamed as an attachment.
    pub file_response: bool,
    /// Array groups pre-declared in the request's log tags.
    pub log_arrays: Vec<String>,
    /// Tag groups pre-declared in the request's log tags.
    pub log_tags: Vec<String>,
    pub enable_tracing: bool,
    /// Root span name; the title when empty.
    pub tracing_span_name: String,
    /// HTTP status of a successful response.
    pub status: u16,
}

impl HandlerParameters {
    pub fn new(title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body_mode: BodyMode::Json,
            validate_header: true,
            save_to_request_log: false,
            path: path.into(),
            has_receipt: false,
            recovery_handler: None,
            file_response: false,
            log_arrays: Vec::new(),
            log_tags: Vec::new(),
            enable_tracing: false,
            tracing_span_name: String::new(),
            status: 200,
        }
    }

    pub fn body_mode(mut self, mode: BodyMode) -> Self {
        self.body_mode = mode;
        self
    }

    pub fn validate_header(mut self, validate: bool) -> Self {
        self.validate_header = validate;
        self
    }

    pub fn save_to_request_log(mut self, save: bool) -> Self {
        self.save_to_request_log = save;
        self
    }

    pub fn has_receipt(mut self, receipt: bool) -> Self {
        self.has_receipt = receipt;
        self
    }

    pub fn file_response(mut self, file: bool) -> Self {
        self.file_response = file;
        self
    }

    pub fn recovery_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.recovery_handler = Some(Arc::new(f));
        self
    }

    pub fn tracing(mut self, span_name: impl Into<String>) -> Self {
        self.enable_tracing = true;
        self.tracing_span_name = span_name.into();
        self
    }

    pub fn log_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn log_arrays<I, S>(mut self, arrays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_arrays = arrays.into_iter().map(Into::into).collect();
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn span_name(&self) -> &str {
        if self.tracing_span_name.is_empty() {
            &self.title
        } else {
            &self.tracing_span_name
        }
    }
}

impl fmt::Debug for HandlerParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerParameters")
            .field("title", &self.title)
            .field("body_mode", &self.body_mode)
            .field("validate_header", &self.validate_header)
            .field("save_to_request_log", &self.save_to_request_log)
            .field("path", &self.path)
            .field("has_receipt", &self.has_receipt)
            .field("recovery_handler", &self.recovery_handler.is_some())
            .field("file_response", &self.file_response)
            .field("enable_tracing", &self.enable_tracing)
            .field("status", &self.status)
            .finish()
    }
}

/// Response of a file-response handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    pub path: PathBuf,
    /// File name offered to the client.
    pub name: String,
}

/// One endpoint: the phases the pipeline drives.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Request: DeserializeOwned + Serialize + Validate + Send + Sync + 'static;
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn parameters(&self) -> HandlerParameters;

    /// Post-parse setup.
    async fn initializer(
        &self,
        _trx: &mut HandlerRequest<Self::Request, Self::Response>,
    ) -> Result<()> {
        Ok(())
    }

    async fn handler(
        &self,
        trx: &mut HandlerRequest<Self::Request, Self::Response>,
    ) -> Result<Self::Response>;

    /// Best-effort work after the response; runs once per request that
    /// reached the initializer.
    async fn finalizer(&self, _trx: &mut HandlerRequest<Self::Request, Self::Response>) {}

    /// Dry run. `trx.response` holds the response-shaped payload the client sent.
    async fn simulation(
        &self,
        trx: &mut HandlerRequest<Self::Request, Self::Response>,
    ) -> Result<Self::Response> {
        trx.response.take().ok_or_else(|| {
            Error::bad_request(errors::JSON_ABSENT, "simulation payload is missing")
        })
    }
}
