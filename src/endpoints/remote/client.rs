//! HTTP client side of a remote call.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use base64::Engine;
use serde_json::Value;

use crate::config::{ApiAuth, ApiConfig};
use crate::endpoints::remote::token::{AuthSystem, ClientCredentialsLogin, TokenCache};
use crate::endpoints::remote::RemoteError;
use crate::errors::Result;
use crate::observability::metrics;

/// Replaces the default envelope decode: `(status, raw body, headers) → value`.
pub type ResponseBuilder = Arc<dyn Fn(u16, &[u8], &HeaderMap) -> Result<Value> + Send + Sync>;

/// One remote call site.
#[derive(Clone)]
pub struct CallParams {
    /// Name of the API in the registry.
    pub api_ref: String,
    pub method: Method,
    pub path: String,
    /// Suffix appended after the path when no query stack is planned.
    pub query: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Per-call TLS mode; the API's setting when `None`.
    pub validate_tls: Option<bool>,
    pub enable_log: bool,
    /// Suffixes consumed head first, one per call; `None` once exhausted.
    pub query_stack: Option<VecDeque<String>>,
    pub builder: Option<ResponseBuilder>,
}

impl CallParams {
    pub fn new(api_ref: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            api_ref: api_ref.into(),
            method,
            path: path.into(),
            query: String::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            validate_tls: None,
            enable_log: true,
            query_stack: None,
            builder: None,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn query_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_stack = Some(stack.into_iter().map(Into::into).collect());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn builder<F>(mut self, f: F) -> Self
    where
        F: Fn(u16, &[u8], &HeaderMap) -> Result<Value> + Send + Sync + 'static,
    {
        self.builder = Some(Arc::new(f));
        self
    }

    /// Next query suffix: the head of the stack, or the static query.
    pub fn next_query(&mut self) -> String {
        let Some(stack) = self.query_stack.as_mut() else {
            return self.query.clone();
        };
        let next = stack.pop_front().unwrap_or_default();
        if stack.is_empty() {
            self.query_stack = None;
        }
        next
    }
}

impl fmt::Debug for CallParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallParams")
            .field("api_ref", &self.api_ref)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("query_stack", &self.query_stack)
            .field("builder", &self.builder.is_some())
            .finish()
    }
}

/// What came back from the remote side.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One configured API with its clients and token cache.
pub struct RemoteApi {
    name: String,
    config: ApiConfig,
    verifying: reqwest::Client,
    insecure: reqwest::Client,
    tokens: TokenCache,
    auth: Option<Arc<dyn AuthSystem>>,
}

impl RemoteApi {
    pub fn new(name: impl Into<String>, config: ApiConfig) -> std::result::Result<Self, RemoteError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let build = |insecure: bool| {
            reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| RemoteError::Client(e.to_string()))
        };
        let auth: Option<Arc<dyn AuthSystem>> = match config.auth {
            ApiAuth::Bearer => Some(Arc::new(ClientCredentialsLogin)),
            ApiAuth::None | ApiAuth::Basic => None,
        };
        Ok(Self {
            name: name.into(),
            verifying: build(false)?,
            insecure: build(true)?,
            config,
            tokens: TokenCache::new(),
            auth,
        })
    }

    /// Use a custom login strategy (bearer APIs).
    pub fn with_auth_system(mut self, auth: Arc<dyn AuthSystem>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// `Authorization` value this API needs, if any.
    pub async fn authorization(&self) -> std::result::Result<Option<String>, RemoteError> {
        match self.config.auth {
            ApiAuth::None => Ok(None),
            ApiAuth::Basic => {
                let pair = format!("{}:{}", self.config.username, self.config.password);
                let encoded = base64::engine::general_purpose::STANDARD.encode(pair);
                Ok(Some(format!("Basic {}", encoded)))
            }
            ApiAuth::Bearer => {
                let Some(auth) = &self.auth else {
                    return Err(RemoteError::Auth(format!("api '{}' has no auth system", self.name)));
                };
                let token = self
                    .tokens
                    .authenticate(&self.config, self.client_for(None), auth.as_ref())
                    .await?;
                Ok(Some(token.authorization()))
            }
        }
    }

    /// Client for a call's TLS mode; the API's setting when `None`.
    fn client_for(&self, validate_tls: Option<bool>) -> &reqwest::Client {
        if validate_tls.unwrap_or(self.config.validate_tls) {
            &self.verifying
        } else {
            &self.insecure
        }
    }

    /// Full URL for `path` plus `query` under the base URL.
    pub fn url(&self, path: &str, query: &str) -> String {
        format!(
            "{}/{}{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/'),
            query
        )
    }

    /// Send one request. Transport failures and non-2xx statuses are errors.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
        params: &CallParams,
    ) -> std::result::Result<RemoteResponse, RemoteError> {
        let mut request = self.client_for(params.validate_tls).request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = params.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = RemoteError::from_transport(&e);
                metrics::record_remote_call(&self.name, err.outcome());
                return Err(err);
            }
        };
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            metrics::record_remote_call(&self.name, "read_error");
            RemoteError::from_transport(&e)
        })?;

        if params.enable_log {
            tracing::info!(api = %self.name, %method, url = %url, status, bytes = body.len(), "Remote call");
        }

        if params.builder.is_none() {
            if status == 404 {
                metrics::record_remote_call(&self.name, "not_found");
                return Err(RemoteError::NotFound(url.to_string()));
            }
            if !(200..300).contains(&status) {
                metrics::record_remote_call(&self.name, "nok");
                return Err(RemoteError::Nok {
                    status,
                    body: body_value(&body),
                });
            }
        }
        metrics::record_remote_call(&self.name, "ok");
        Ok(RemoteResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Parsed JSON body, or the body text when it is not JSON.
pub fn body_value(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::from(String::from_utf8_lossy(body).into_owned()))
}

/// APIs addressable by name.
#[derive(Default)]
pub struct ApiRegistry {
    apis: BTreeMap<String, Arc<RemoteApi>>,
}

impl ApiRegistry {
    pub fn from_config(apis: &BTreeMap<String, ApiConfig>) -> std::result::Result<Self, RemoteError> {
        let mut registry = Self::default();
        for (name, config) in apis {
            registry.insert(RemoteApi::new(name, config.clone())?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, api: RemoteApi) {
        self.apis.insert(api.name().to_string(), Arc::new(api));
    }

    pub fn get(&self, name: &str) -> std::result::Result<Arc<RemoteApi>, RemoteError> {
        self.apis
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::UnknownApi(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.apis.keys().map(String::as_str).collect()
    }
}
