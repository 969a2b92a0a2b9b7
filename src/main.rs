//! Demo server for the request core.
//!
//! ```text
//!     Client Request
//!     ─────────────▶ HttpServer (trace, timeout, request id, panic catcher)
//!                        │
//!                        ▼
//!                    axum Router ──▶ pipeline::handler(runtime, H)
//!                                        │ parse → validate → request log
//!                                        │ initializer → handler
//!                                        ▼
//!     ◀───────────── WsResponse envelope | file attachment
//!                                        │
//!                                        └──▶ finalizer (spawned)
//! ```
//!
//! Usage: `request-core [config.toml]`. Without a config file the defaults
//! are used (no database, request log written to the log).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use request_core::config::load_config;
use request_core::endpoints::attachment::{DownloadHandler, UploadHandler};
use request_core::lifecycle::{bootstrap, signals, Shutdown};
use request_core::observability::logging;
use request_core::pipeline::{self, Handler, HandlerParameters, HandlerRequest};
use request_core::validation::{FieldRule, Validate};
use request_core::{HttpServer, Result, RuntimeConfig};

#[derive(Debug, Serialize, Deserialize)]
struct EchoRequest {
    message: String,
}

impl Validate for EchoRequest {
    fn rules() -> Vec<FieldRule> {
        vec![FieldRule::new("message", "required,max=256")]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EchoResponse {
    message: String,
    request_id: String,
    user: String,
}

/// Answers with the message and the caller's identity.
struct Echo;

#[async_trait]
impl Handler for Echo {
    type Request = EchoRequest;
    type Response = EchoResponse;

    fn parameters(&self) -> HandlerParameters {
        HandlerParameters::new("Echo", "/echo").tracing("HandleEcho")
    }

    async fn handler(&self, trx: &mut HandlerRequest<EchoRequest, EchoResponse>) -> Result<EchoResponse> {
        Ok(EchoResponse {
            message: trx.request()?.message.clone(),
            request_id: trx.header.id.clone(),
            user: trx.header.user.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => RuntimeConfig::default(),
    };

    logging::init(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-core starting");

    let started = bootstrap(&config, config_path.as_deref()).await?;
    let runtime = started.runtime;

    let files = std::env::var("FILES_DIR").unwrap_or_else(|_| "./files".to_string());
    let routes = Router::new()
        .route("/echo", post(pipeline::handler(runtime.clone(), Echo)))
        .route(
            "/files",
            post(pipeline::handler(
                runtime.clone(),
                UploadHandler::new(HandlerParameters::new("Upload", "/files"), &files),
            )),
        )
        .route(
            "/files/{name}",
            get(pipeline::handler(
                runtime.clone(),
                DownloadHandler::new(HandlerParameters::new("Download", "/files/{name}"), &files),
            )),
        );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    HttpServer::new(routes, config.server.clone())
        .run(listener, &shutdown)
        .await?;

    drop(started.watcher);
    tracing::info!("Shutdown complete");
    Ok(())
}
