//! Drives one request through a [`Handler`]'s phases.
//!
//! ```text
//! bootstrap → (simulation | parse → request log → initializer → handler)
//!           → envelope / receipt / file → request log update
//!           → finalizer (spawned, once) → panic resumed when configured
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::response::Response;
use futures_util::FutureExt;
use serde_json::Value;

use crate::errors::{self, Error, Result};
use crate::http::axum_parser::AxumParser;
use crate::http::header::{RequestHeader, REQUEST_ID};
use crate::http::pagination::{PaginationData, PAGINATION_LOCAL};
use crate::http::parser::{local_as, read_json, read_query, read_uri, HEADER_LOCAL};
use crate::http::response::{Receipt, WsResponse, RECEIPT_LOCAL};
use crate::observability::metrics;
use crate::observability::trace::{trace_func, trace_void};
use crate::pipeline::handler::{BodyMode, FileResponse, Handler, HandlerParameters};
use crate::pipeline::log_tags::{LogTags, ERROR_LIST, HANDLER_GROUP};
use crate::pipeline::recovery::{fault_response, panic_message};
use crate::pipeline::request::{HandlerRequest, Stage};
use crate::request_log::{trail, REQ_LOG};
use crate::runtime::Runtime;

type Trx<H> = HandlerRequest<<H as Handler>::Request, <H as Handler>::Response>;

/// One registered endpoint: the handler, its parameters and the runtime.
pub struct Pipeline<H: Handler> {
    runtime: Arc<Runtime>,
    handler: Arc<H>,
    params: Arc<HandlerParameters>,
}

impl<H: Handler> Clone for Pipeline<H> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            handler: self.handler.clone(),
            params: self.params.clone(),
        }
    }
}

impl<H: Handler> Pipeline<H> {
    pub fn new(runtime: Arc<Runtime>, handler: H) -> Self {
        let params = Arc::new(handler.parameters());
        Self {
            runtime,
            handler: Arc::new(handler),
            params,
        }
    }

    pub fn parameters(&self) -> &HandlerParameters {
        &self.params
    }

    /// Serve one request.
    pub async fn execute(&self, req: Request) -> Response {
        let start = Instant::now();
        let parser = AxumParser::new(req, self.runtime.body_limit()).await;
        let mut trx: Trx<H> = HandlerRequest::new(&self.params.title, self.runtime.clone(), Box::new(parser));
        self.bootstrap(&mut trx);

        let outcome = AssertUnwindSafe(self.run(&mut trx)).catch_unwind().await;
        let (response, panic) = match outcome {
            Ok(response) => (response, None),
            Err(panic) => {
                let message = panic_message(&*panic);
                (self.recover(&mut trx, message, start).await, Some(panic))
            }
        };

        metrics::record_request(&self.params.title, response.status().as_u16(), start);
        if trx.stage >= Stage::Initialized {
            trx.resp_sent = true;
            self.spawn_finalizer(trx);
        }
        if let Some(panic) = panic {
            if self.runtime.reraise_panics() {
                std::panic::resume_unwind(panic);
            }
        }
        response
    }

    /// Root span and request-log slot.
    fn bootstrap(&self, trx: &mut Trx<H>) {
        trx.tags = LogTags::declared(&self.params.log_tags, &self.params.log_arrays);
        trx.tags.add(HANDLER_GROUP, "title", self.params.title.as_str());
        trx.tags.add(HANDLER_GROUP, "path", trx.parser.path());
        trx.tags.add(HANDLER_GROUP, "method", trx.parser.method());

        if !self.params.save_to_request_log {
            trx.parser.remove_local(REQ_LOG);
        }
        if self.params.enable_tracing {
            if let Some(manager) = self.runtime.tracing() {
                let request_id = trx.parser.header_value(REQUEST_ID).unwrap_or_default();
                let span = manager.root_span(self.params.span_name(), &request_id);
                trx.parser.set_context(span);
            }
        }
    }

    async fn run(&self, trx: &mut Trx<H>) -> Response {
        let response = self.run_phases(trx).await;
        let failed = !response.status().is_success();
        self.finish(trx, failed).await;
        if trx.stage >= Stage::Initialized {
            trx.stage = Stage::Responded;
        }
        response
    }

    async fn run_phases(&self, trx: &mut Trx<H>) -> Response {
        if self.runtime.simulation() {
            return self.simulate(trx).await;
        }

        if let Err(err) = self.parse(trx).await {
            return self.respond_error(trx, &err);
        }
        trx.stage = Stage::Parsed;

        if self.params.save_to_request_log && trail::request_log(trx.parser()).is_none() {
            let incoming = serde_json::to_value(&trx.request).unwrap_or(Value::Null);
            if let Err(err) = trail::initialize(
                trx.parser.as_mut(),
                self.runtime.request_log(),
                &trx.header,
                &self.params.title,
                incoming,
            )
            .await
            {
                return self.respond_error(trx, &err);
            }
        }

        trx.stage = Stage::Initialized;
        let result = self.main_phases(trx).await;
        trx.stage = Stage::Handled;

        match result {
            Ok(resp) => self.respond_success(trx, resp).await,
            Err(err) => self.respond_error(trx, &err),
        }
    }

    async fn main_phases(&self, trx: &mut Trx<H>) -> Result<H::Response> {
        let handler = self.handler.as_ref();
        handler.initializer(trx).await?;
        if self.params.enable_tracing {
            trace_func(trx, "Handler", |trx| handler.handler(trx)).await
        } else {
            handler.handler(trx).await
        }
    }

    /// Header, typed request, validation, pagination.
    async fn parse(&self, trx: &mut Trx<H>) -> Result<()> {
        let header = RequestHeader::parse(
            trx.parser.http_headers(),
            self.runtime.header_config(),
            self.params.validate_header,
            self.runtime.validator(),
        )?;
        trx.tags.add(HANDLER_GROUP, "request_id", header.id.as_str());
        trx.tags.add(HANDLER_GROUP, "user", header.user.as_str());
        trx.parser.set_local(HEADER_LOCAL, Arc::new(header.clone()));
        trx.header = header;

        let request: H::Request = match self.params.body_mode {
            BodyMode::Json => read_json(trx.parser.as_mut()).await?,
            BodyMode::Query | BodyMode::QueryPagination => read_query(trx.parser())?,
            BodyMode::Uri | BodyMode::UriPagination => read_uri(trx.parser())?,
        };
        self.runtime
            .validator()
            .validate(&request)
            .map_err(|list| Error::bad_request(errors::VALIDATION_FAILED, list))?;
        trx.request = Some(request);

        if self.params.body_mode.is_paginated() {
            let pagination = PaginationData::from_query(trx.parser.raw_query());
            trx.parser.set_local(PAGINATION_LOCAL, Arc::new(pagination));
        }
        Ok(())
    }

    /// The response-shaped body goes straight to the simulation phase.
    async fn simulate(&self, trx: &mut Trx<H>) -> Response {
        let parsed = async {
            let header = RequestHeader::parse(
                trx.parser.http_headers(),
                self.runtime.header_config(),
                self.params.validate_header,
                self.runtime.validator(),
            )?;
            trx.parser.set_local(HEADER_LOCAL, Arc::new(header.clone()));
            trx.header = header;
            let payload: H::Response = read_json(trx.parser.as_mut()).await?;
            trx.response = Some(payload);
            Ok::<_, Error>(())
        }
        .await;
        if let Err(err) = parsed {
            return self.respond_error(trx, &err);
        }
        tracing::debug!(handler = %self.params.title, "Simulation");
        match self.handler.simulation(trx).await {
            Ok(resp) => self.respond_success(trx, resp).await,
            Err(err) => self.respond_error(trx, &err),
        }
    }

    async fn respond_success(&self, trx: &mut Trx<H>, resp: H::Response) -> Response {
        if self.params.file_response {
            return match self.attachment(trx, &resp).await {
                Ok(response) => response,
                Err(err) => self.respond_error(trx, &err),
            };
        }

        let result = match serde_json::to_value(&resp) {
            Ok(value) => value,
            Err(e) => {
                let err = Error::internal(errors::RESPONSE_ENCODING_ERROR, e.to_string());
                return self.respond_error(trx, &err);
            }
        };
        let receipt = if self.params.has_receipt {
            let receipt = local_as::<Receipt>(trx.parser(), RECEIPT_LOCAL);
            if receipt.is_none() {
                tracing::warn!(handler = %self.params.title, "Receipt expected but not set");
            }
            receipt.map(|r| (*r).clone())
        } else {
            None
        };
        let envelope = WsResponse::success(Some(result), self.runtime.messages().ok_message(), receipt);
        trx.response = Some(resp);
        trx.tags.add(HANDLER_GROUP, "status", self.params.status);
        trx.parser.send_json(self.params.status, &envelope_value(&envelope))
    }

    async fn attachment(&self, trx: &Trx<H>, resp: &H::Response) -> Result<Response> {
        let file: FileResponse = serde_json::to_value(resp)
            .and_then(serde_json::from_value)
            .map_err(|e| Error::internal(errors::RESPONSE_ENCODING_ERROR, e.to_string()))?;
        trx.parser.file_attachment(&file.path, &file.name).await
    }

    fn respond_error(&self, trx: &mut Trx<H>, err: &Error) -> Response {
        let tables = self.runtime.messages();
        let envelope = WsResponse::failure(err, &tables, self.runtime.description_max_len());
        if let Some(items) = &envelope.errors {
            for item in items {
                trx.tags.push(
                    ERROR_LIST,
                    serde_json::json!({"code": item.code, "description": item.description}),
                );
            }
        }
        trx.tags.add(HANDLER_GROUP, "status", err.status);
        if err.status >= 500 {
            tracing::error!(handler = %self.params.title, error = %err.log_value(), "Request failed");
        } else {
            tracing::debug!(handler = %self.params.title, error = %err.log_value(), "Request rejected");
        }
        trx.parser.send_json(err.status, &envelope_value(&envelope))
    }

    /// Update the request log and flush the log tags.
    async fn finish(&self, trx: &mut Trx<H>, failed: bool) {
        if self.params.save_to_request_log {
            let outgoing = trx
                .response
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok())
                .unwrap_or(Value::Null);
            let result = if failed {
                trx.tags
                    .array(ERROR_LIST)
                    .and_then(|items| items.first())
                    .and_then(|item| item.get("code"))
                    .and_then(Value::as_str)
                    .unwrap_or(errors::SYSTEM_FAULT)
                    .to_string()
            } else {
                "OK".to_string()
            };
            if let Err(err) = trail::update_request(
                trx.parser(),
                self.runtime.request_log(),
                outgoing,
                &result,
            )
            .await
            {
                tracing::warn!(handler = %self.params.title, error = %err, "Request log update failed");
            }
        }
        trx.tags.flush(&self.params.title, failed);
    }

    async fn recover(&self, trx: &mut Trx<H>, message: String, start: Instant) -> Response {
        metrics::record_panic(&self.params.title);
        tracing::error!(
            handler = %self.params.title,
            panic = %message,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Handler panicked"
        );
        trx.tags.add(HANDLER_GROUP, "panic", message.as_str());
        trx.tags.add(HANDLER_GROUP, "status", 500);
        trx.tags.flush(&self.params.title, true);

        if self.params.save_to_request_log {
            if let Err(err) = trail::update_request(
                trx.parser(),
                self.runtime.request_log(),
                Value::Null,
                errors::SYSTEM_FAULT,
            )
            .await
            {
                tracing::warn!(handler = %self.params.title, error = %err, "Request log update failed");
            }
        }
        match &self.params.recovery_handler {
            Some(recovery) => recovery(&message),
            None => fault_response(trx.parser(), &self.runtime, &message),
        }
    }

    /// Run the finalizer once, after the response, isolated from panics.
    fn spawn_finalizer(&self, mut trx: Trx<H>) {
        let handler = self.handler.clone();
        let traced = self.params.enable_tracing;
        let title = self.params.title.clone();
        tokio::spawn(async move {
            let run = async {
                if traced {
                    trace_void(&mut trx, "Finalizer", |trx| handler.finalizer(trx)).await;
                } else {
                    handler.finalizer(&mut trx).await;
                }
            };
            if let Err(panic) = AssertUnwindSafe(run).catch_unwind().await {
                metrics::record_panic(&title);
                tracing::error!(handler = %title, panic = %panic_message(&*panic), "Finalizer panicked");
            }
        });
    }
}

fn envelope_value(envelope: &WsResponse) -> Value {
    serde_json::to_value(envelope).unwrap_or_else(|e| {
        serde_json::json!({
            "status": 500,
            "description": errors::RESPONSE_ENCODING_ERROR,
            "errors": [{"code": errors::RESPONSE_ENCODING_ERROR, "description": e.to_string()}],
        })
    })
}
