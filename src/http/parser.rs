//! Toolkit-neutral view of one HTTP request.
//!
//! # Responsibilities
//! - Header, body, query and URL-param extraction
//! - Per-request locals (`reqLog`, `paginationData`, `receipt`, ...)
//! - Response emission (JSON envelope, file attachment)
//! - The tracing seam: the live span travels with the parser
//!
//! # Design Decisions
//! - Object safe, so the pipeline holds `Box<dyn RequestParser>`; typed
//!   extraction lives in the free functions below
//! - Locals are `Arc<dyn Any>` so handlers can share typed state

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::{self, Error, Result};
use crate::http::header::RequestHeader;

/// Shared value stored in the parser's local scope.
pub type Local = Arc<dyn Any + Send + Sync>;

/// Local holding the parsed [`RequestHeader`].
pub const HEADER_LOCAL: &str = "header";

/// Uniform request access implemented once per web toolkit.
#[async_trait]
pub trait RequestParser: Send + Sync {
    fn method(&self) -> &str;

    fn path(&self) -> &str;

    fn uri(&self) -> &Uri;

    /// All incoming HTTP headers.
    fn http_headers(&self) -> &HeaderMap;

    fn header_value(&self, name: &str) -> Option<String> {
        self.http_headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn raw_query(&self) -> &str {
        self.uri().query().unwrap_or("")
    }

    /// The request body; read once and cached.
    async fn body(&mut self) -> Result<Bytes>;

    fn local(&self, name: &str) -> Option<Local>;

    fn set_local(&mut self, name: &str, value: Local);

    fn remove_local(&mut self, name: &str);

    fn local_string(&self, name: &str) -> Option<String> {
        self.local(name)
            .and_then(|v| v.downcast_ref::<String>().cloned())
    }

    fn url_params(&self) -> &BTreeMap<String, String>;

    fn url_param(&self, name: &str) -> Option<String> {
        self.url_params().get(name).cloned()
    }

    /// The URL param, or `HEADER_ABSENT` naming it.
    #[track_caller]
    fn check_url_param(&self, name: &str) -> Result<String> {
        match self.url_param(name) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Error::bad_request(
                errors::HEADER_ABSENT,
                format!("url param '{}' is missing", name),
            )),
        }
    }

    fn set_req_header(&mut self, name: &str, value: &str);

    /// Header added to every response this parser emits.
    fn set_resp_header(&mut self, name: &str, value: &str);

    fn resp_headers(&self) -> &HeaderMap;

    /// A text field of a multipart form.
    async fn form_value(&mut self, name: &str) -> Result<Option<String>>;

    /// Store the uploaded file of `field` at `path`; returns the client's file name.
    async fn save_file(&mut self, field: &str, path: &std::path::Path) -> Result<String>;

    /// JSON response with the accumulated response headers.
    fn send_json(&self, status: u16, body: &Value) -> Response;

    /// Stream a file as an attachment named `name`.
    async fn file_attachment(&self, path: &std::path::Path, name: &str) -> Result<Response>;

    /// Plain response ending the request early.
    fn abort(&self, status: u16, message: &str) -> Response;

    /// The live span (the request context).
    fn context(&self) -> tracing::Span;

    fn set_context(&mut self, span: tracing::Span);
}

/// The parsed header stored by the pipeline, if any.
pub fn header_of(parser: &dyn RequestParser) -> Option<Arc<RequestHeader>> {
    parser
        .local(HEADER_LOCAL)
        .and_then(|v| v.downcast::<RequestHeader>().ok())
}

/// Read a typed local.
pub fn local_as<T: Any + Send + Sync>(parser: &dyn RequestParser, name: &str) -> Option<Arc<T>> {
    parser.local(name).and_then(|v| v.downcast::<T>().ok())
}

/// Parse the JSON body into `T`.
pub async fn read_json<T: DeserializeOwned>(parser: &mut dyn RequestParser) -> Result<T> {
    let body = parser.body().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::bad_request(errors::JSON_ABSENT, "request body is empty"));
    }
    serde_json::from_slice(&body).map_err(|e| deserialize_error(&e.to_string()))
}

/// Parse the URL query string into `T`.
pub fn read_query<T: DeserializeOwned>(parser: &dyn RequestParser) -> Result<T> {
    axum::extract::Query::<T>::try_from_uri(parser.uri())
        .map(|q| q.0)
        .map_err(|e| deserialize_error(&e.body_text()))
}

/// Parse the URL params into `T`.
pub fn read_uri<T: DeserializeOwned>(parser: &dyn RequestParser) -> Result<T> {
    let object: Map<String, Value> = parser
        .url_params()
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect();
    serde_json::from_value(Value::Object(object)).map_err(|e| deserialize_error(&e.to_string()))
}

/// Map a deserializer message onto the validation error shape.
#[track_caller]
fn deserialize_error(message: &str) -> Error {
    let field_error = match missing_field(message) {
        Some(field) => serde_json::json!({
            "code": errors::REQUIRED_FIELD,
            "description": format!("{} is a required field", field),
        }),
        None => serde_json::json!({
            "code": errors::INVALID_INPUT_DATA,
            "description": message,
        }),
    };
    Error::bad_request(errors::VALIDATION_FAILED, vec![field_error])
}

fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next()
}

/// Identity locals plus the selected URL params, as one argument map.
pub fn get_args(parser: &dyn RequestParser, url_params: &[&str]) -> Map<String, Value> {
    let mut args = Map::new();
    if let Some(header) = header_of(parser) {
        for (key, value) in [
            ("user", &header.user),
            ("program", &header.program),
            ("module", &header.module),
            ("method", &header.method),
            ("branch", &header.branch),
            ("bank", &header.bank),
            ("person", &header.person),
        ] {
            args.insert(key.to_string(), Value::from(value.clone()));
        }
    }
    for name in url_params {
        if let Some(value) = parser.url_param(name) {
            args.insert((*name).to_string(), Value::from(value));
        }
    }
    args
}

/// Render a SQL template for the current request.
///
/// Substitutes `{{user}}`, `{{app}}`, `{{path}}`, `{{name}}`,
/// `{{hash:field}}` (hex SHA-256 of a record field) and
/// `{{field:name}}` (rendered by `field_parser`).
pub fn parse_command(
    parser: &dyn RequestParser,
    template: &str,
    title: &str,
    record: &Value,
    field_parser: &dyn Fn(&str, &Value) -> Option<String>,
) -> String {
    let header = header_of(parser);
    let user = header.as_ref().map(|h| h.user.clone()).unwrap_or_default();
    let app = header.as_ref().map(|h| h.program.clone()).unwrap_or_default();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let token = after[..end].trim();
        let rendered = match token {
            "user" => Some(user.clone()),
            "app" => Some(app.clone()),
            "path" => Some(parser.path().to_string()),
            "name" => Some(title.to_string()),
            _ => {
                if let Some(field) = token.strip_prefix("hash:") {
                    record.get(field).map(|v| hash_value(v))
                } else if let Some(field) = token.strip_prefix("field:") {
                    field_parser(field, record)
                } else {
                    None
                }
            }
        };
        match rendered {
            Some(text) => out.push_str(&text),
            None => {
                out.push_str("{{");
                out.push_str(&after[..end]);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn hash_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    hex::encode(Sha256::digest(text.as_bytes()))
}
