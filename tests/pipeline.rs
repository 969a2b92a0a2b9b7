//! End-to-end tests of the handler pipeline over an axum router.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tracing_subscriber::layer::SubscriberExt;

use request_core::config::{RequestLogConfig, ServerConfig};
use request_core::errors::{self, Error, Result};
use request_core::http::{HttpServer, Receipt, ReceiptRow};
use request_core::observability::{TracingConfig, TracingManager};
use request_core::pipeline::{self, Handler, HandlerParameters, HandlerRequest};
use request_core::request_log::stores::DbRequestStore;
use request_core::runtime::Runtime;
use request_core::testing::{row, MockDatabase};
use request_core::validation::{FieldRule, Validate};

mod common;

#[derive(Debug, Serialize, Deserialize)]
struct Lookup {
    id: String,
}

impl Validate for Lookup {
    fn rules() -> Vec<FieldRule> {
        vec![FieldRule::new("id", "required")]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LookupResult {
    result: String,
}

#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Fail,
    Panic,
}

#[derive(Default)]
struct Counters {
    handled: AtomicUsize,
    finalized: AtomicUsize,
    sent_before_finalize: AtomicBool,
}

struct LookupHandler {
    params: HandlerParameters,
    behavior: Behavior,
    counters: Arc<Counters>,
}

impl LookupHandler {
    fn new(params: HandlerParameters, behavior: Behavior) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                params,
                behavior,
                counters: counters.clone(),
            },
            counters,
        )
    }
}

#[async_trait]
impl Handler for LookupHandler {
    type Request = Lookup;
    type Response = LookupResult;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn handler(&self, trx: &mut HandlerRequest<Lookup, LookupResult>) -> Result<LookupResult> {
        self.counters.handled.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Answer => {
                if self.params.has_receipt {
                    trx.set_receipt(Receipt {
                        id: trx.header.id.clone(),
                        title: "Lookup".into(),
                        rows: vec![ReceiptRow {
                            key: "id".into(),
                            value: trx.request()?.id.clone(),
                        }],
                    });
                }
                Ok(LookupResult { result: "a".into() })
            }
            Behavior::Fail => Err(Error::bad_request(errors::NO_DATA_FOUND, "nothing for this id")),
            Behavior::Panic => panic!("ledger unavailable"),
        }
    }

    async fn finalizer(&self, trx: &mut HandlerRequest<Lookup, LookupResult>) {
        self.counters
            .sent_before_finalize
            .store(trx.resp_sent, Ordering::SeqCst);
        self.counters.finalized.fetch_add(1, Ordering::SeqCst);
    }
}

fn params() -> HandlerParameters {
    HandlerParameters::new("Lookup", "/lookup")
}

fn router(runtime: Arc<Runtime>, handler: LookupHandler) -> Router {
    Router::new().route("/lookup", post(pipeline::handler(runtime, handler)))
}

#[tokio::test]
async fn test_successful_json_handler() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Answer);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], 0);
    assert_eq!(body["description"], "Operation completed successfully");
    assert_eq!(body["result"], json!({"result": "a"}));
    assert!(body.get("errors").is_none());

    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);
    assert!(counters.sent_before_finalize.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_invalid_body_is_required_field() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Answer);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"ss": "a"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 400);
    assert_eq!(body["status"], 400);
    assert_eq!(body["description"], errors::VALIDATION_FAILED);
    assert_eq!(body["errors"][0]["code"], errors::REQUIRED_FIELD);

    // Never reached the initializer: no handler, no finalizer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.handled.load(Ordering::SeqCst), 0);
    assert_eq!(counters.finalized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_request_id() {
    let (handler, _) = LookupHandler::new(params(), Behavior::Answer);
    let app = router(Runtime::builder().build(), handler);

    let request = common::json_request_with("POST", "/lookup", &json!({"id": "1"}), &[("User-Id", "testuser")]);
    let (status, body) = common::json_body(common::send(&app, request).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::HEADER_ABSENT);
}

#[tokio::test]
async fn test_missing_request_id_behind_the_server() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Answer);
    let server = HttpServer::new(router(Runtime::builder().build(), handler), ServerConfig::default());

    let request = common::json_request_with("POST", "/lookup", &json!({"id": "1"}), &[("User-Id", "testuser")]);
    let (status, body) = common::json_body(common::send(&server.router(), request).await).await;

    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::HEADER_ABSENT);
    assert_eq!(counters.handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_header_validation_can_be_disabled() {
    let (handler, _) = LookupHandler::new(params().validate_header(false), Behavior::Answer);
    let app = router(Runtime::builder().build(), handler);

    let request = common::json_request_with("POST", "/lookup", &json!({"id": "1"}), &[]);
    let (status, _) = common::json_body(common::send(&app, request).await).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_handler_error_still_finalizes_once() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Fail);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::NO_DATA_FOUND);
    assert_eq!(body["errors"][0]["description"], "nothing for this id");

    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panic_becomes_system_fault() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Panic);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 500);
    assert_eq!(body["status"], 500);
    assert_eq!(body["errors"][0]["code"], errors::SYSTEM_FAULT);
    assert_eq!(body["errors"][0]["description"], "ledger unavailable");
    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_recovery_handler_answers_panics() {
    let params = params().recovery_handler(|message| {
        (StatusCode::SERVICE_UNAVAILABLE, format!("recovered: {}", message)).into_response()
    });
    let (handler, _) = LookupHandler::new(params, Behavior::Panic);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"recovered: ledger unavailable");
}

#[tokio::test]
async fn test_reraised_panic_reaches_outer_layer() {
    let caught: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen = caught.clone();
    let (handler, counters) = LookupHandler::new(params(), Behavior::Panic);
    let app = router(Runtime::builder().reraise_panics(true).build(), handler).layer(CatchPanicLayer::custom(
        move |panic: Box<dyn Any + Send + 'static>| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            *seen.lock() = Some(message);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    ));

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(caught.lock().as_deref(), Some("ledger unavailable"));
    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_tracing_opens_request_and_handler_spans() {
    let capture = common::SpanCapture::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));
    let manager = TracingManager::new(TracingConfig {
        enabled: true,
        ..TracingConfig::default()
    });
    let runtime = Runtime::builder().tracing(Arc::new(manager)).build();
    let (handler, counters) = LookupHandler::new(params().tracing("HandleLookup"), Behavior::Fail);
    let app = router(runtime, handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    let (status, _) = common::json_body(response).await;
    assert_eq!(status, 400);
    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);

    let spans = capture.spans();
    let root = spans
        .iter()
        .find(|span| span.name == "request")
        .expect("request span");
    assert_eq!(root.field("otel.name"), Some("HandleLookup"));
    assert_eq!(root.field("request_id"), Some("0123456789"));

    let main = spans
        .iter()
        .find(|span| span.field("function.name") == Some("handler"))
        .expect("handler span");
    assert_eq!(main.parent, Some(root.id));
    assert_eq!(main.field("otel.status_code"), Some("ERROR"));
    assert_eq!(main.field("error.code"), Some(errors::NO_DATA_FOUND));
}

#[tokio::test]
async fn test_receipt_and_declared_status() {
    let (handler, _) = LookupHandler::new(params().has_receipt(true).status(201), Behavior::Answer);
    let app = router(Runtime::builder().build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "7"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 201);
    assert_eq!(body["printReceipt"]["id"], "0123456789");
    assert_eq!(body["printReceipt"]["rows"][0], json!({"key": "id", "value": "7"}));
}

#[tokio::test]
async fn test_simulation_answers_with_the_payload() {
    let (handler, counters) = LookupHandler::new(params(), Behavior::Panic);
    let app = router(Runtime::builder().simulation(true).build(), handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"result": "simulated"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"], json!({"result": "simulated"}));
    assert_eq!(counters.handled.load(Ordering::SeqCst), 0);
}

/// Request log backed by the scripted database: inserted ids become visible
/// to the duplicate check.
fn duplicate_aware_db() -> (Arc<MockDatabase>, Arc<Mutex<Vec<String>>>) {
    let db = Arc::new(MockDatabase::default());
    let inserted: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let seen = inserted.clone();
    db.on_query_with("FROM request WHERE id", move |args| {
        let id = args[0].as_str().unwrap_or_default().to_string();
        if seen.lock().contains(&id) {
            vec![row([("id", Value::from(id))])]
        } else {
            Vec::new()
        }
    });
    let record = inserted.clone();
    db.on_execute_with("INSERT INTO request", move |args| {
        let id = args[0]["id"].as_str().unwrap_or_default().to_string();
        record.lock().push(id);
        Ok(1)
    });
    (db, inserted)
}

#[tokio::test]
async fn test_duplicate_request_is_rejected() {
    let (db, inserted) = duplicate_aware_db();
    let runtime = Runtime::builder()
        .db(db.clone())
        .request_log(Arc::new(DbRequestStore::new(db.clone(), RequestLogConfig::default())))
        .build();
    let (handler, _) = LookupHandler::new(params().save_to_request_log(true), Behavior::Answer);
    let app = router(runtime, handler);

    let headers = [("Request-Id", "aaaaaaaaaa"), ("User-Id", "testuser")];
    let first = common::json_request_with("POST", "/lookup", &json!({"id": "1"}), &headers);
    let (status, _) = common::json_body(common::send(&app, first).await).await;
    assert_eq!(status, 200);

    let second = common::json_request_with("POST", "/lookup", &json!({"id": "1"}), &headers);
    let (status, body) = common::json_body(common::send(&app, second).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::DUPLICATE_REQUEST);
    assert_eq!(body["errors"][0]["code"], errors::DUPLICATE_REQUEST);

    assert_eq!(inserted.lock().as_slice(), ["aaaaaaaaaa".to_string()]);
    // One update, for the first request only.
    let updates = db
        .committed()
        .into_iter()
        .filter(|stmt| stmt.sql.starts_with("UPDATE request"))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test]
async fn test_panic_survives_a_failing_request_log_update() {
    let (db, inserted) = duplicate_aware_db();
    db.fail_on("UPDATE request");
    let runtime = Runtime::builder()
        .db(db.clone())
        .request_log(Arc::new(DbRequestStore::new(db.clone(), RequestLogConfig::default())))
        .build();
    let (handler, counters) = LookupHandler::new(params().save_to_request_log(true), Behavior::Panic);
    let app = router(runtime, handler);

    let response = common::send(&app, common::json_request("POST", "/lookup", &json!({"id": "1"}))).await;
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 500);
    assert_eq!(body["errors"][0]["code"], errors::SYSTEM_FAULT);
    assert_eq!(inserted.lock().len(), 1);
    assert!(db
        .transactions()
        .iter()
        .any(|tx| !tx.committed && tx.statements.iter().any(|stmt| stmt.sql.starts_with("UPDATE request"))));
    assert!(common::eventually(|| counters.finalized.load(Ordering::SeqCst) == 1).await);
}
