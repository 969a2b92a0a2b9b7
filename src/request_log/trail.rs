//! Audit-trail operations over the parser's `reqLog` local.

use chrono::Utc;
use serde_json::Value;

use crate::errors::Result;
use crate::http::header::RequestHeader;
use crate::http::parser::{header_of, local_as, RequestParser};
use crate::request_log::model::{Event, LogEntry, RequestLog, SharedRequestLog};
use crate::request_log::{RequestLogStore, REQ_LOG};

/// Pointer returned by [`log_start`]; empty when the request keeps no log.
#[derive(Clone, Default)]
pub struct RequestPtr(Option<SharedRequestLog>);

impl RequestPtr {
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn log(&self) -> Option<&SharedRequestLog> {
        self.0.as_ref()
    }
}

/// The request log of this request, if one is attached.
pub fn request_log(parser: &dyn RequestParser) -> Option<SharedRequestLog> {
    local_as::<parking_lot::Mutex<RequestLog>>(parser, REQ_LOG)
}

/// Duplicate-check, insert and attach a new record.
pub async fn initialize(
    parser: &mut dyn RequestParser,
    store: &dyn RequestLogStore,
    header: &RequestHeader,
    title: &str,
    incoming: Value,
) -> Result<SharedRequestLog> {
    store.check_duplicate(&header.id).await?;
    let record = RequestLog::new(header, title, incoming);
    store.insert(&record).await?;
    let shared = record.shared();
    parser.set_local(REQ_LOG, shared.clone());
    tracing::debug!(request_id = %header.id, store = store.name(), "Request log initialized");
    Ok(shared)
}

/// Attach a record without touching any store.
pub fn initialize_no_log(
    parser: &mut dyn RequestParser,
    header: &RequestHeader,
    title: &str,
    incoming: Value,
) -> SharedRequestLog {
    let shared = RequestLog::new(header, title, incoming).shared();
    parser.set_local(REQ_LOG, shared.clone());
    shared
}

/// Record the response and update the store.
pub async fn update_request(
    parser: &dyn RequestParser,
    store: &dyn RequestLogStore,
    outgoing: Value,
    result: &str,
) -> Result<()> {
    let Some(shared) = request_log(parser) else {
        return Ok(());
    };
    let snapshot = {
        let mut log = shared.lock();
        log.finish(outgoing, result);
        log.clone()
    };
    store.update(&snapshot).await
}

fn entry(parser: &dyn RequestParser, method: &str, text: &str) -> LogEntry {
    let header = header_of(parser);
    LogEntry {
        dt: Utc::now(),
        program: header.as_ref().map(|h| h.program.clone()).unwrap_or_default(),
        module: header.as_ref().map(|h| h.module.clone()).unwrap_or_default(),
        method: method.to_string(),
        text: text.to_string(),
    }
}

/// Open a new event named `method`.
pub fn log_start(parser: &dyn RequestParser, method: &str, text: &str) -> RequestPtr {
    let Some(shared) = request_log(parser) else {
        return RequestPtr::default();
    };
    let first = entry(parser, method, text);
    {
        let mut log = shared.lock();
        let event = Event {
            dt: first.dt,
            action: method.to_string(),
            branch: log.branch_id.clone(),
            user: log.user_id.clone(),
            logs: vec![first],
        };
        log.events.push(event);
    }
    RequestPtr(Some(shared))
}

/// Close the event opened by [`log_start`]; no-op on an empty pointer.
pub fn log_end(ptr: &RequestPtr, method: &str, text: &str) {
    let Some(shared) = ptr.log() else { return };
    let mut log = shared.lock();
    let program = log
        .events
        .last()
        .and_then(|e| e.logs.first())
        .map(|l| (l.program.clone(), l.module.clone()))
        .unwrap_or_default();
    log.add_log(LogEntry {
        dt: Utc::now(),
        program: program.0,
        module: program.1,
        method: method.to_string(),
        text: text.to_string(),
    });
}

pub fn add_request_event(parser: &dyn RequestParser, event: Event) {
    if let Some(shared) = request_log(parser) {
        shared.lock().events.push(event);
    }
}

pub fn add_request_log(parser: &dyn RequestParser, entry: LogEntry) {
    if let Some(shared) = request_log(parser) {
        shared.lock().add_log(entry);
    }
}

/// Append `text` under `method` to the current event.
pub fn add_log_event(parser: &dyn RequestParser, method: &str, text: &str) {
    let entry = entry(parser, method, text);
    add_request_log(parser, entry);
}
