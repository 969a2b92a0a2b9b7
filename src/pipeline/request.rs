//! The per-request transaction object handed to every phase.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::db::Database;
use crate::errors::{self, Error, Result};
use crate::http::header::RequestHeader;
use crate::http::parser::{local_as, RequestParser, HEADER_LOCAL};
use crate::http::response::{Receipt, RECEIPT_LOCAL};
use crate::http::pagination::{PaginationData, PAGINATION_LOCAL};
use crate::observability::trace::Traceable;
use crate::observability::tracing::TracingManager;
use crate::pipeline::log_tags::LogTags;
use crate::runtime::Runtime;

/// How far a request got; decides whether the finalizer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Parsed,
    Initialized,
    Handled,
    Responded,
}

/// State of one request, owned by the pipeline.
pub struct HandlerRequest<Req, Resp> {
    pub title: String,
    pub runtime: Arc<Runtime>,
    pub header: RequestHeader,
    /// Absent on the simulation path and before parsing.
    pub request: Option<Req>,
    pub response: Option<Resp>,
    pub parser: Box<dyn RequestParser>,
    /// Free-form values shared between phases.
    pub args: Map<String, Value>,
    /// Set once the response has been produced.
    pub resp_sent: bool,
    pub tags: LogTags,
    pub(crate) stage: Stage,
}

impl<Req, Resp> HandlerRequest<Req, Resp> {
    pub fn new(title: impl Into<String>, runtime: Arc<Runtime>, parser: Box<dyn RequestParser>) -> Self {
        Self {
            title: title.into(),
            runtime,
            header: RequestHeader::default(),
            request: None,
            response: None,
            parser,
            args: Map::new(),
            resp_sent: false,
            tags: LogTags::default(),
            stage: Stage::Received,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The parsed request.
    #[track_caller]
    pub fn request(&self) -> Result<&Req> {
        self.request
            .as_ref()
            .ok_or_else(|| Error::bad_request(errors::JSON_ABSENT, "request was not parsed"))
    }

    pub fn parser(&self) -> &dyn RequestParser {
        self.parser.as_ref()
    }

    pub fn parser_mut(&mut self) -> &mut dyn RequestParser {
        self.parser.as_mut()
    }

    /// The runtime's database handle.
    #[track_caller]
    pub fn db(&self) -> Result<Arc<dyn Database>> {
        self.runtime
            .db()
            .ok_or_else(|| Error::internal(errors::DB_NOT_CONFIGURED, "no database configured"))
    }

    /// Change the header and republish it to the parser's `header` local.
    pub fn update_header<F: FnOnce(&mut RequestHeader)>(&mut self, f: F) {
        f(&mut self.header);
        self.parser
            .set_local(HEADER_LOCAL, Arc::new(self.header.clone()));
    }

    pub fn set_user(&mut self, user: &str) {
        self.update_header(|h| h.set_user(user));
    }

    pub fn set_program(&mut self, program: &str) {
        self.update_header(|h| h.set_program(program));
    }

    pub fn set_module(&mut self, module: &str) {
        self.update_header(|h| h.set_module(module));
    }

    pub fn set_method(&mut self, method: &str) {
        self.update_header(|h| h.set_method(method));
    }

    /// Attach the receipt emitted with a successful response.
    pub fn set_receipt(&mut self, receipt: Receipt) {
        self.parser.set_local(RECEIPT_LOCAL, Arc::new(receipt));
    }

    /// Pagination values of a paginated body mode.
    pub fn pagination(&self) -> Option<Arc<PaginationData>> {
        local_as::<PaginationData>(self.parser(), PAGINATION_LOCAL)
    }
}

impl<Req: Send, Resp: Send> Traceable for HandlerRequest<Req, Resp> {
    fn trace_parser(&self) -> &dyn RequestParser {
        self.parser.as_ref()
    }

    fn trace_parser_mut(&mut self) -> &mut dyn RequestParser {
        self.parser.as_mut()
    }

    fn trace_manager(&self) -> Option<Arc<TracingManager>> {
        self.runtime.tracing_manager()
    }
}
