//! Function-level tracing wrappers.
//!
//! # Responsibilities
//! - Wrap one call in a child span of the request's live span
//! - Record `function.name`, `function.duration_ms`, `function.duration_ns`
//!   and the outcome (`otel.status_code`, error code and message)
//! - Hand the child span to the parser so downstream code nests under it
//!
//! # Design Decisions
//! - Fast path: no manager, a disabled manager, or a parent that is
//!   `Span::none()` runs the call untouched
//! - A request's own runtime manager decides; the process-wide one only
//!   covers values outside a request
//! - The wrapped result is returned as is; tracing never turns a success
//!   into a failure

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::field::Empty;
use tracing::{Instrument, Span};

use crate::errors::Result;
use crate::http::parser::RequestParser;
use crate::observability::tracing::{global_manager, TracingManager};

/// Values whose request context lives in a parser.
pub trait Traceable: Send {
    fn trace_parser(&self) -> &dyn RequestParser;

    fn trace_parser_mut(&mut self) -> &mut dyn RequestParser;

    /// Manager deciding whether child spans are opened.
    fn trace_manager(&self) -> Option<Arc<TracingManager>> {
        global_manager()
    }
}

impl Traceable for Box<dyn RequestParser> {
    fn trace_parser(&self) -> &dyn RequestParser {
        self.as_ref()
    }

    fn trace_parser_mut(&mut self) -> &mut dyn RequestParser {
        self.as_mut()
    }
}

/// How a wrapped call ended, as far as the span is concerned.
pub trait Outcome {
    /// `(code, message)` of a failure.
    fn failure(&self) -> Option<(String, String)>;
}

impl<T> Outcome for Result<T> {
    fn failure(&self) -> Option<(String, String)> {
        self.as_ref()
            .err()
            .map(|e| (e.description.clone(), e.to_string()))
    }
}

impl Outcome for () {
    fn failure(&self) -> Option<(String, String)> {
        None
    }
}

/// `HandleTransfer` → `handle_transfer`; already snake-cased names pass through.
pub fn span_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == ' ' || c == '-' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Child of `parent` when `manager` traces.
fn child_span(
    manager: Option<&TracingManager>,
    parent: &Span,
    name: &str,
    location: &Location<'_>,
) -> Option<Span> {
    let manager = manager?;
    if !manager.is_enabled() || parent.is_none() {
        return None;
    }
    let name = span_name(name);
    Some(tracing::info_span!(
        parent: parent,
        "function",
        otel.name = %name,
        function.name = %name,
        code.location = %format!("{}:{}", location.file(), location.line()),
        function.duration_ms = Empty,
        function.duration_ns = Empty,
        otel.status_code = Empty,
        error.code = Empty,
        error.message = Empty,
    ))
}

fn close(span: &Span, start: Instant, outcome: &dyn Outcome) {
    let elapsed = start.elapsed();
    span.record("function.duration_ms", elapsed.as_millis() as u64);
    span.record("function.duration_ns", elapsed.as_nanos() as u64);
    match outcome.failure() {
        Some((code, message)) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.code", code.as_str());
            span.record("error.message", message.as_str());
        }
        None => {
            span.record("otel.status_code", "OK");
        }
    }
}

async fn traced<'a, A, R, F>(arg: &'a mut A, name: &str, location: &Location<'_>, f: F) -> R
where
    A: Traceable + ?Sized,
    R: Outcome,
    F: FnOnce(&'a mut A) -> BoxFuture<'a, R>,
{
    let parent = arg.trace_parser().context();
    let manager = arg.trace_manager();
    let Some(span) = child_span(manager.as_deref(), &parent, name, location) else {
        return f(arg).await;
    };
    arg.trace_parser_mut().set_context(span.clone());
    let start = Instant::now();
    let result = f(arg).instrument(span.clone()).await;
    close(&span, start, &result);
    result
}

/// Trace a call returning a value or an error.
#[track_caller]
pub fn trace_func<'a, A, T, F>(
    arg: &'a mut A,
    name: &'a str,
    f: F,
) -> impl Future<Output = Result<T>> + Send + 'a
where
    A: Traceable + ?Sized,
    T: Send + 'a,
    F: FnOnce(&'a mut A) -> BoxFuture<'a, Result<T>> + Send + 'a,
{
    let location = Location::caller();
    async move { traced(arg, name, location, f).await }
}

/// Trace a call that only reports failure.
#[track_caller]
pub fn trace_error<'a, A, F>(
    arg: &'a mut A,
    name: &'a str,
    f: F,
) -> impl Future<Output = Result<()>> + Send + 'a
where
    A: Traceable + ?Sized,
    F: FnOnce(&'a mut A) -> BoxFuture<'a, Result<()>> + Send + 'a,
{
    let location = Location::caller();
    async move { traced(arg, name, location, f).await }
}

/// Trace a call with no outcome.
#[track_caller]
pub fn trace_void<'a, A, F>(
    arg: &'a mut A,
    name: &'a str,
    f: F,
) -> impl Future<Output = ()> + Send + 'a
where
    A: Traceable + ?Sized,
    F: FnOnce(&'a mut A) -> BoxFuture<'a, ()> + Send + 'a,
{
    let location = Location::caller();
    async move { traced(arg, name, location, f).await }
}

/// Trace `fut` under the span held by `parser`. The parser's context is
/// left untouched since `fut` was built before the span existed.
#[track_caller]
pub fn trace_with<'a, R, Fut>(
    parser: &dyn RequestParser,
    name: &'a str,
    fut: Fut,
) -> impl Future<Output = R> + Send + 'a
where
    R: Outcome + Send + 'a,
    Fut: Future<Output = R> + Send + 'a,
{
    let location = Location::caller();
    let parent = parser.context();
    async move { trace_in_at(&parent, name, location, fut).await.0 }
}

/// Trace `fut` under an explicit parent. Returns the result and the span
/// downstream work should use (the parent itself on the fast path).
#[track_caller]
pub fn trace_in<'a, R, Fut>(
    parent: &'a Span,
    name: &'a str,
    fut: Fut,
) -> impl Future<Output = (R, Span)> + Send + 'a
where
    R: Outcome + Send + 'a,
    Fut: Future<Output = R> + Send + 'a,
{
    let location = Location::caller();
    trace_in_at(parent, name, location, fut)
}

async fn trace_in_at<R, Fut>(parent: &Span, name: &str, location: &Location<'_>, fut: Fut) -> (R, Span)
where
    R: Outcome,
    Fut: Future<Output = R>,
{
    let manager = global_manager();
    let Some(span) = child_span(manager.as_deref(), parent, name, location) else {
        return (fut.await, parent.clone());
    };
    let start = Instant::now();
    let result = fut.instrument(span.clone()).await;
    close(&span, start, &result);
    (result, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::http::axum_parser::AxumParser;
    use crate::observability::tracing::{set_global_manager, TracingConfig, TracingManager};
    use axum::body::Body;
    use axum::extract::Request;
    use crate::pipeline::HandlerRequest;
    use crate::runtime::Runtime;

    async fn parser() -> Box<dyn RequestParser> {
        Box::new(AxumParser::new(Request::new(Body::empty()), 1024).await)
    }

    fn enable() {
        set_global_manager(Arc::new(TracingManager::new(TracingConfig {
            enabled: true,
            ..TracingConfig::default()
        })));
    }

    #[test]
    fn test_span_name() {
        assert_eq!(span_name("HandleTransfer"), "handle_transfer");
        assert_eq!(span_name("callAPI"), "call_api");
        assert_eq!(span_name("load rows"), "load_rows");
        assert_eq!(span_name("already_snake"), "already_snake");
    }

    #[tokio::test]
    async fn test_fast_path_keeps_result() {
        let mut p = parser().await;
        let ok = trace_func(&mut p, "Lookup", |p| {
            Box::pin(async move { Ok::<_, Error>(p.method().to_string()) })
        })
        .await;
        assert_eq!(ok.unwrap(), "GET");

        let err = trace_error(&mut p, "Fails", |_| {
            Box::pin(async { Err(Error::bad_request("NO_DATA_FOUND", "none")) })
        })
        .await;
        assert_eq!(err.unwrap_err().description, "NO_DATA_FOUND");

        // No live span: context stays `none`.
        assert!(p.context().is_none());
    }

    #[tokio::test]
    async fn test_enabled_tracing_does_not_change_outcome() {
        enable();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let mut p = parser().await;
        let root = tracing::info_span!("request");
        p.set_context(root.clone());

        let err = trace_func(&mut p, "ChargeCard", |_| {
            Box::pin(async { Err::<u32, _>(Error::internal("API_NOK", "declined")) })
        })
        .await;
        assert_eq!(err.unwrap_err().description, "API_NOK");

        // The child span is now the live context.
        assert_ne!(p.context().id(), root.id());

        let mut ran = false;
        let flag = &mut ran;
        trace_void(&mut p, "Flush", move |_| {
            Box::pin(async move {
                *flag = true;
            })
        })
        .await;
        assert!(ran);

        let (value, span) = trace_in(&root, "Explicit", async { Ok::<_, Error>(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert!(!span.is_none());
    }

    async fn request_with(enabled: bool) -> HandlerRequest<(), ()> {
        let manager = TracingManager::new(TracingConfig {
            enabled,
            ..TracingConfig::default()
        });
        let runtime = Runtime::builder().tracing(Arc::new(manager)).build();
        let mut trx = HandlerRequest::new("Lookup", runtime, parser().await);
        trx.parser.set_context(tracing::info_span!("request"));
        trx
    }

    #[tokio::test]
    async fn test_request_runtime_manager_decides() {
        enable();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());

        let mut quiet = request_with(false).await;
        let root = quiet.parser.context();
        trace_void(&mut quiet, "Skip", |_| Box::pin(async {})).await;
        assert_eq!(quiet.parser.context().id(), root.id());

        let mut traced = request_with(true).await;
        let root = traced.parser.context();
        trace_void(&mut traced, "Nest", |_| Box::pin(async {})).await;
        assert_ne!(traced.parser.context().id(), root.id());
    }

    #[tokio::test]
    async fn test_trace_with_parser_leaves_context() {
        let p = parser().await;
        let value = trace_with(p.as_ref(), "Outer", async { Ok::<_, Error>(1) }).await;
        assert_eq!(value.unwrap(), 1);
        assert!(p.context().is_none());
    }
}
