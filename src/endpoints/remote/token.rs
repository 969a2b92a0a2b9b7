//! Bearer tokens for remote APIs: the per-API cache and the login strategies.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::ApiConfig;
use crate::endpoints::remote::RemoteError;

/// Token lifetime assumed when the server does not say.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub token_type: String,
    pub taken_at: Instant,
    pub valid_for: Duration,
    pub refresh_token: Option<String>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, valid_for: Duration) -> Self {
        Self {
            token: token.into(),
            token_type: "Bearer".to_string(),
            taken_at: Instant::now(),
            valid_for,
            refresh_token: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.taken_at.elapsed() >= self.valid_for
    }

    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }
}

/// Obtains a token for an API. `previous` is the expired token, if any.
#[async_trait]
pub trait AuthSystem: Send + Sync {
    async fn login(
        &self,
        api: &ApiConfig,
        client: &reqwest::Client,
        previous: Option<&AccessToken>,
    ) -> Result<AccessToken, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth2 client credentials against `token_url`; uses the refresh token of
/// the previous login when there is one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientCredentialsLogin;

#[async_trait]
impl AuthSystem for ClientCredentialsLogin {
    async fn login(
        &self,
        api: &ApiConfig,
        client: &reqwest::Client,
        previous: Option<&AccessToken>,
    ) -> Result<AccessToken, RemoteError> {
        let refresh = previous.and_then(|t| t.refresh_token.as_deref());
        let mut form = vec![
            ("client_id", api.username.as_str()),
            ("client_secret", api.password.as_str()),
        ];
        match refresh {
            Some(token) => {
                form.push(("grant_type", "refresh_token"));
                form.push(("refresh_token", token));
            }
            None => form.push(("grant_type", "client_credentials")),
        }

        let response = client
            .post(&api.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RemoteError::Auth(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let reply: TokenReply = response
            .json()
            .await
            .map_err(|e| RemoteError::Auth(e.to_string()))?;

        Ok(AccessToken {
            token: reply.access_token,
            token_type: reply.token_type.unwrap_or_else(|| "Bearer".to_string()),
            taken_at: Instant::now(),
            valid_for: reply
                .expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TOKEN_LIFETIME),
            refresh_token: reply.refresh_token,
        })
    }
}

/// A fixed token that never expires.
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AuthSystem for StaticToken {
    async fn login(
        &self,
        _api: &ApiConfig,
        _client: &reqwest::Client,
        _previous: Option<&AccessToken>,
    ) -> Result<AccessToken, RemoteError> {
        Ok(AccessToken::new(self.token.clone(), Duration::MAX))
    }
}

/// Current token of one API. Readers never lock while the token is valid.
#[derive(Default)]
pub struct TokenCache {
    current: ArcSwapOption<AccessToken>,
    login: Mutex<()>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn valid(&self) -> Option<Arc<AccessToken>> {
        self.current.load_full().filter(|t| !t.is_expired())
    }

    /// A valid token, logging in when the cached one is missing or expired.
    pub async fn authenticate(
        &self,
        api: &ApiConfig,
        client: &reqwest::Client,
        auth: &dyn AuthSystem,
    ) -> Result<Arc<AccessToken>, RemoteError> {
        if let Some(token) = self.valid() {
            return Ok(token);
        }
        let _guard = self.login.lock().await;
        if let Some(token) = self.valid() {
            return Ok(token);
        }
        let previous = self.current.load_full();
        let token = Arc::new(auth.login(api, client, previous.as_deref()).await?);
        tracing::debug!(token_type = %token.token_type, valid_for = ?token.valid_for, "Token refreshed");
        self.current.store(Some(token.clone()));
        Ok(token)
    }

    pub fn invalidate(&self) {
        self.current.store(None);
    }

    pub fn current(&self) -> Option<Arc<AccessToken>> {
        self.current.load_full()
    }
}
