//! Ready-made handler proxying one endpoint to a remote API.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, Method};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::endpoints::remote::client::CallParams;
use crate::endpoints::remote::RemoteError;
use crate::errors::{self, Error, Result};
use crate::http::parser::local_as;
use crate::http::response::WsResponse;
use crate::pipeline::log_tags::CALL_API;
use crate::pipeline::{Handler, HandlerParameters, HandlerRequest};
use crate::request_log::trail;
use crate::validation::Validate;

/// Local holding the outgoing headers (`Vec<(String, String)>`).
pub const REMOTE_HEADERS_LOCAL: &str = "remoteHeaders";
/// Local holding the outgoing path (`String`).
pub const REMOTE_PATH_LOCAL: &str = "remotePath";

/// Decode a remote body, unwrapping a response envelope when there is one.
pub fn decode_envelope<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::internal(errors::API_UNABLE_TO_READ, e.to_string()))?;
    let is_envelope = value.get("status").is_some() && value.get("description").is_some();
    let value = if is_envelope {
        let envelope: WsResponse = serde_json::from_value(value.clone())
            .map_err(|e| Error::internal(errors::API_UNABLE_TO_READ, e.to_string()))?;
        if envelope.status != 0 {
            let status = u16::try_from(envelope.status).unwrap_or(status);
            return Err(RemoteError::Nok { status, body: value }.into());
        }
        envelope.result.unwrap_or(Value::Null)
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| Error::internal(errors::API_UNABLE_TO_READ, e.to_string()))
}

/// Run `params` against its API for the current request.
///
/// Uses the prepared `remoteHeaders` / `remotePath` locals when present,
/// the params' own path and headers otherwise.
pub async fn call_api<T, Req, Resp>(
    trx: &mut HandlerRequest<Req, Resp>,
    params: &mut CallParams,
    body: Option<&Value>,
) -> Result<T>
where
    T: DeserializeOwned,
{
    let api = trx.runtime.apis().get(&params.api_ref)?;
    let path = local_as::<String>(trx.parser(), REMOTE_PATH_LOCAL)
        .map(|p| (*p).clone())
        .unwrap_or_else(|| params.path.clone());
    let headers = local_as::<Vec<(String, String)>>(trx.parser(), REMOTE_HEADERS_LOCAL)
        .map(|h| (*h).clone())
        .unwrap_or_else(|| params.headers.clone());
    let query = params.next_query();
    let url = api.url(&path, &query);

    let ptr = trail::log_start(trx.parser(), &params.api_ref, &format!("{} {}", params.method, url));
    let result = api
        .send(params.method.clone(), &url, &headers, body, params)
        .await;
    let status = match &result {
        Ok(response) => response.status,
        Err(RemoteError::Nok { status, .. }) => *status,
        Err(_) => 0,
    };
    trx.tags.push(
        CALL_API,
        serde_json::json!({"api": params.api_ref, "url": url, "status": status}),
    );
    trail::log_end(&ptr, &params.api_ref, &format!("status {}", status));

    let response = result?;
    match &params.builder {
        Some(builder) => {
            let value = builder(response.status, &response.body, &response.headers)?;
            serde_json::from_value(value)
                .map_err(|e| Error::internal(errors::API_UNABLE_TO_READ, e.to_string()))
        }
        None => decode_envelope(response.status, &response.body),
    }
}

/// Proxies the typed request to `call` and returns the typed remote result.
pub struct RemoteCallHandler<Req, Resp> {
    params: HandlerParameters,
    call: Mutex<CallParams>,
    /// URL params appended to the path, in order.
    path_params: Vec<String>,
    _types: PhantomData<fn() -> (Req, Resp)>,
}

impl<Req, Resp> RemoteCallHandler<Req, Resp> {
    pub fn new(params: HandlerParameters, call: CallParams) -> Self {
        Self {
            params,
            call: Mutex::new(call),
            path_params: Vec::new(),
            _types: PhantomData,
        }
    }

    pub fn path_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Remaining planned query suffixes.
    pub fn query_stack(&self) -> Option<Vec<String>> {
        self.call
            .lock()
            .query_stack
            .as_ref()
            .map(|stack| stack.iter().cloned().collect())
    }
}

/// Base path plus each URL param, with `*` standing for `/`.
fn final_path(base: &str, values: &[String]) -> String {
    let mut path = base.trim_end_matches('/').to_string();
    for value in values {
        path.push('/');
        path.push_str(&value.replace('*', "/"));
    }
    path
}

#[async_trait]
impl<Req, Resp> Handler for RemoteCallHandler<Req, Resp>
where
    Req: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
    Resp: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn initializer(&self, trx: &mut HandlerRequest<Req, Resp>) -> Result<()> {
        let (api_ref, base_path, mut headers) = {
            let call = self.call.lock();
            (call.api_ref.clone(), call.path.clone(), call.headers.clone())
        };
        let api = trx.runtime.apis().get(&api_ref)?;

        let forwarded = trx.parser().header_value(header::AUTHORIZATION.as_str());
        let authorization = match api.authorization().await? {
            Some(value) => Some(value),
            None => forwarded,
        };
        if let Some(value) = authorization {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()));
            headers.push((header::AUTHORIZATION.to_string(), value));
        }
        headers.push(("Request-Id".to_string(), trx.header.id.clone()));

        let mut values = Vec::with_capacity(self.path_params.len());
        for name in &self.path_params {
            values.push(trx.parser().check_url_param(name)?);
        }
        let path = final_path(&base_path, &values);

        trx.parser_mut().set_local(REMOTE_HEADERS_LOCAL, Arc::new(headers));
        trx.parser_mut().set_local(REMOTE_PATH_LOCAL, Arc::new(path));
        Ok(())
    }

    async fn handler(&self, trx: &mut HandlerRequest<Req, Resp>) -> Result<Resp> {
        if local_as::<Vec<(String, String)>>(trx.parser(), REMOTE_HEADERS_LOCAL).is_none() {
            return Err(Error::internal(errors::BAD_LOCAL_HEADERS, "remote headers were not prepared"));
        }
        // Snapshot with this call's query; the shared stack advances by one.
        let mut call = {
            let mut shared = self.call.lock();
            let query = shared.next_query();
            let mut snapshot = shared.clone();
            snapshot.query_stack = None;
            snapshot.query = query;
            snapshot
        };
        let body = match call.method {
            Method::GET | Method::HEAD | Method::DELETE => None,
            _ => Some(serde_json::to_value(trx.request()?).map_err(|e| {
                Error::internal(errors::RESPONSE_ENCODING_ERROR, e.to_string())
            })?),
        };
        call_api(trx, &mut call, body.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_path() {
        assert_eq!(final_path("/accounts/", &["42".into()]), "/accounts/42");
        assert_eq!(final_path("/files", &["a*b".into(), "c".into()]), "/files/a/b/c");
        assert_eq!(final_path("/ping", &[]), "/ping");
    }

    #[test]
    fn test_decode_plain_body() {
        let value: Value = decode_envelope(200, br#"{"balance": 10}"#).unwrap();
        assert_eq!(value, json!({"balance": 10}));
    }

    #[test]
    fn test_decode_envelope_result() {
        let body = br#"{"status": 0, "description": "ok", "result": {"id": "7"}}"#;
        let value: Value = decode_envelope(200, body).unwrap();
        assert_eq!(value, json!({"id": "7"}));
    }

    #[test]
    fn test_decode_failed_envelope_keeps_remote_errors() {
        let body = br#"{"status": 400, "description": "Validation Failed", "errors": [{"code": "REQUIRED-FIELD", "description": "x"}]}"#;
        let err = decode_envelope::<Value>(200, body).unwrap_err();
        assert_eq!(err.description, errors::API_NOK);
        assert_eq!(err.status, 400);
        assert_eq!(err.message["errors"][0]["code"], "REQUIRED-FIELD");
    }

    #[test]
    fn test_decode_non_json_is_unreadable() {
        let err = decode_envelope::<Value>(200, b"<html>").unwrap_err();
        assert_eq!(err.description, errors::API_UNABLE_TO_READ);
    }
}
