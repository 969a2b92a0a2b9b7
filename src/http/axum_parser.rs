//! [`RequestParser`] over an axum request.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, FromRequestParts, Multipart, RawPathParams, Request};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::io::ReaderStream;

use crate::errors::{self, Error, Result};
use crate::http::parser::{Local, RequestParser};
use crate::http::response::http_status;

#[derive(Default)]
struct FormData {
    values: HashMap<String, String>,
    files: HashMap<String, (String, Bytes)>,
}

/// Parser built from the request handed to an axum handler.
pub struct AxumParser {
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    url_params: BTreeMap<String, String>,
    /// `Body` is not `Sync`; the lock is only ever taken through `&mut self`.
    body: Mutex<Option<Body>>,
    body_bytes: Option<Bytes>,
    body_limit: usize,
    form: Option<FormData>,
    locals: HashMap<String, Local>,
    resp_headers: HeaderMap,
    span: tracing::Span,
}

impl AxumParser {
    /// Take the request apart; the body is read lazily, up to `body_limit` bytes.
    pub async fn new(req: Request, body_limit: usize) -> Self {
        let (mut parts, body) = req.into_parts();
        let url_params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => BTreeMap::new(),
        };
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            uri: parts.uri,
            headers: parts.headers,
            url_params,
            body: Mutex::new(Some(body)),
            body_bytes: None,
            body_limit,
            form: None,
            locals: HashMap::new(),
            resp_headers: HeaderMap::new(),
            span: tracing::Span::none(),
        }
    }

    async fn form(&mut self) -> Result<&FormData> {
        if self.form.is_none() {
            let form = self.read_form().await?;
            self.form = Some(form);
        }
        Ok(self.form.get_or_insert_with(FormData::default))
    }

    async fn read_form(&mut self) -> Result<FormData> {
        let body = self.body.get_mut().take().unwrap_or_else(Body::empty);
        let mut req = Request::new(body);
        *req.headers_mut() = self.headers.clone();
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| Error::bad_request(errors::INVALID_INPUT_DATA, e.body_text()))?;

        let mut form = FormData::default();
        loop {
            let field = multipart
                .next_field()
                .await
                .map_err(|e| Error::bad_request(errors::INVALID_INPUT_DATA, e.body_text()))?;
            let Some(field) = field else { break };
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::bad_request(errors::INVALID_INPUT_DATA, e.body_text()))?;
            match file_name {
                Some(file_name) => {
                    form.files.insert(name, (file_name, data));
                }
                None => {
                    form.values
                        .insert(name, String::from_utf8_lossy(&data).into_owned());
                }
            }
        }
        Ok(form)
    }

    fn with_resp_headers(&self, mut response: Response) -> Response {
        for (name, value) in &self.resp_headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

#[async_trait]
impl RequestParser for AxumParser {
    fn method(&self) -> &str {
        self.method.as_str()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn http_headers(&self) -> &HeaderMap {
        &self.headers
    }

    async fn body(&mut self) -> Result<Bytes> {
        if let Some(bytes) = &self.body_bytes {
            return Ok(bytes.clone());
        }
        let body = self.body.get_mut().take().unwrap_or_else(Body::empty);
        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| Error::bad_request(errors::JSON_ABSENT, e.to_string()))?;
        self.body_bytes = Some(bytes.clone());
        Ok(bytes)
    }

    fn local(&self, name: &str) -> Option<Local> {
        self.locals.get(name).cloned()
    }

    fn set_local(&mut self, name: &str, value: Local) {
        self.locals.insert(name.to_string(), value);
    }

    fn remove_local(&mut self, name: &str) {
        self.locals.remove(name);
    }

    fn url_params(&self) -> &BTreeMap<String, String> {
        &self.url_params
    }

    fn set_req_header(&mut self, name: &str, value: &str) {
        match header_pair(name, value) {
            Some((name, value)) => {
                self.headers.insert(name, value);
            }
            None => tracing::warn!(header = %name, "Ignoring invalid request header"),
        }
    }

    fn set_resp_header(&mut self, name: &str, value: &str) {
        match header_pair(name, value) {
            Some((name, value)) => {
                self.resp_headers.insert(name, value);
            }
            None => tracing::warn!(header = %name, "Ignoring invalid response header"),
        }
    }

    fn resp_headers(&self) -> &HeaderMap {
        &self.resp_headers
    }

    async fn form_value(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.form().await?.values.get(name).cloned())
    }

    async fn save_file(&mut self, field: &str, path: &Path) -> Result<String> {
        let (file_name, data) = self
            .form()
            .await?
            .files
            .get(field)
            .cloned()
            .ok_or_else(|| {
                Error::bad_request(errors::REQUIRED_FIELD, format!("file field '{}' is missing", field))
            })?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| Error::internal(errors::FILE_SAVE_ERROR, e.to_string()))?;
        tracing::debug!(field = %field, path = ?path, size = data.len(), "Saved uploaded file");
        Ok(file_name)
    }

    fn send_json(&self, status: u16, body: &Value) -> Response {
        let response = (http_status(status), axum::Json(body.clone())).into_response();
        self.with_resp_headers(response)
    }

    async fn file_attachment(&self, path: &Path, name: &str) -> Result<Response> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::new(404, errors::FILE_NOT_FOUND, e.to_string()))?;
        let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
        let response = (
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response();
        Ok(self.with_resp_headers(response))
    }

    fn abort(&self, status: u16, message: &str) -> Response {
        self.with_resp_headers((http_status(status), message.to_string()).into_response())
    }

    fn context(&self) -> tracing::Span {
        self.span.clone()
    }

    fn set_context(&mut self, span: tracing::Span) {
        self.span = span;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::header::RequestHeader;
    use crate::http::parser::{get_args, parse_command, read_json, read_query, HEADER_LOCAL};
    use serde::Deserialize;
    use std::sync::Arc;

    fn request(uri: &str, body: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header("Request-Id", "0123456789")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct Lookup {
        id: String,
    }

    #[tokio::test]
    async fn test_body_is_cached() {
        let mut parser = AxumParser::new(request("/x", r#"{"id":"1"}"#), 1024).await;
        let first: Lookup = read_json(&mut parser).await.unwrap();
        let second: Lookup = read_json(&mut parser).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_empty_body_is_json_absent() {
        let mut parser = AxumParser::new(request("/x", ""), 1024).await;
        let err = read_json::<Lookup>(&mut parser).await.unwrap_err();
        assert_eq!(err.description, errors::JSON_ABSENT);
    }

    #[tokio::test]
    async fn test_query_and_locals() {
        let mut parser = AxumParser::new(request("/x?id=42", ""), 1024).await;
        let lookup: Lookup = read_query(&parser).unwrap();
        assert_eq!(lookup.id, "42");

        parser.set_local("note", Arc::new("hello".to_string()));
        assert_eq!(parser.local_string("note").as_deref(), Some("hello"));
        parser.remove_local("note");
        assert!(parser.local("note").is_none());
        assert_eq!(parser.header_value("request-id").as_deref(), Some("0123456789"));
    }

    #[tokio::test]
    async fn test_resp_headers_apply_to_json() {
        let mut parser = AxumParser::new(request("/x", ""), 1024).await;
        parser.set_resp_header("X-Total-Count", "7");
        let response = parser.send_json(201, &serde_json::json!({"ok": true}));
        assert_eq!(response.status(), 201);
        assert_eq!(response.headers()["x-total-count"], "7");
    }

    #[tokio::test]
    async fn test_parse_command_and_args() {
        let mut parser = AxumParser::new(request("/accounts", ""), 1024).await;
        let header = RequestHeader {
            user: "alice".into(),
            program: "core".into(),
            ..RequestHeader::default()
        };
        parser.set_local(HEADER_LOCAL, Arc::new(header));

        let record = serde_json::json!({"pan": "abc", "kind": "gold"});
        let sql = parse_command(
            &parser,
            "SELECT '{{user}}', '{{app}}', '{{path}}', '{{name}}', '{{hash:pan}}', {{field:kind}}, {{other}}",
            "List",
            &record,
            &|field, rec| rec.get(field).map(|v| format!("'{}'", v.as_str().unwrap_or_default())),
        );
        assert_eq!(
            sql,
            "SELECT 'alice', 'core', '/accounts', 'List', \
             'ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad', 'gold', {{other}}"
        );

        let args = get_args(&parser, &[]);
        assert_eq!(args["user"], "alice");
    }
}
