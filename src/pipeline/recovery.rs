//! Panic recovery helpers.

use std::any::Any;

use axum::response::Response;

use crate::errors::{self, Error};
use crate::http::parser::RequestParser;
use crate::http::response::WsResponse;
use crate::runtime::Runtime;

/// Text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The `SYSTEM_FAULT` (500) envelope carrying the panic message.
pub fn fault_response(parser: &dyn RequestParser, runtime: &Runtime, message: &str) -> Response {
    let err = Error::internal(errors::SYSTEM_FAULT, message);
    let envelope = WsResponse::failure(&err, &runtime.messages(), runtime.description_max_len());
    let body = serde_json::to_value(&envelope).unwrap_or_default();
    parser.send_json(err.status, &body)
}
