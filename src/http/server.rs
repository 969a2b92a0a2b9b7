//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the application's pipeline routes with the host middleware
//!   (tracing, timeout, body limit, request id echo, panic catcher)
//! - Bind the server to a listener
//! - Stop accepting and drain on shutdown

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::request::propagate_request_id_layer;
use crate::lifecycle::{signals, Shutdown};

/// HTTP server hosting pipeline routes.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server around the application's routes.
    pub fn new(routes: Router, config: ServerConfig) -> Self {
        let router = Self::build_router(routes, &config);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(routes: Router, config: &ServerConfig) -> Router {
        routes
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until a shutdown signal arrives or `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "HTTP server starting"
        );

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = signals::shutdown_signal() => {}
                    _ = stop.recv() => tracing::info!("Shutdown requested"),
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_missing_request_id_is_not_minted() {
        let routes = Router::new().route("/ping", get(|| async { "pong" }));
        let server = HttpServer::new(routes, ServerConfig::default());

        let response = server
            .router()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().get("request-id").is_none());
    }

    #[tokio::test]
    async fn test_client_request_id_is_kept() {
        let routes = Router::new().route("/ping", get(|| async { "pong" }));
        let server = HttpServer::new(routes, ServerConfig::default());

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header("Request-Id", "0123456789")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["request-id"], "0123456789");
    }
}
