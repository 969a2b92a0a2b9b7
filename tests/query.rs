//! Query endpoints: pagination headers, empty results and the result cache.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use request_core::endpoints::query::{QueryCommand, QueryHandler, QueryType};
use request_core::errors;
use request_core::pipeline::{self, BodyMode, HandlerParameters};
use request_core::runtime::Runtime;
use request_core::testing::{row, MockDatabase};
use request_core::validation::{FieldRule, Validate};

mod common;

const BY_BRANCH: &str = "SELECT id, name FROM accounts WHERE branch = $1";

#[derive(Debug, Serialize, Deserialize)]
struct ByBranch {
    branch: String,
}

impl Validate for ByBranch {
    fn rules() -> Vec<FieldRule> {
        vec![FieldRule::new("branch", "required")]
    }
}

fn scripted_db() -> Arc<MockDatabase> {
    let db = Arc::new(MockDatabase::default());
    db.on_query("AS total_rows", vec![row([("total_rows", json!(42))])]);
    db.on_query_with("FROM accounts", |args| {
        if args[0] == json!("12345") {
            vec![
                row([("id", json!("a1")), ("name", json!("ali"))]),
                row([("id", json!("a2")), ("name", json!("sara"))]),
            ]
        } else {
            Vec::new()
        }
    });
    db
}

fn get_request(uri: &str) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in common::HEADERS {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

fn command() -> QueryCommand {
    QueryCommand::new("accounts_by_branch", QueryType::All, BY_BRANCH).args(["branch"])
}

#[tokio::test]
async fn test_paginated_query_sets_total_count() {
    let db = scripted_db();
    let params = HandlerParameters::new("Accounts", "/accounts").body_mode(BodyMode::QueryPagination);
    let handler: QueryHandler<ByBranch> = QueryHandler::new(params, command());
    let app = Router::new().route(
        "/accounts",
        get(pipeline::handler(Runtime::builder().db(db.clone()).build(), handler)),
    );

    let response = common::send(&app, get_request("/accounts?branch=12345&page=2&pageSize=2")).await;
    assert_eq!(response.headers()["x-total-count"], "42");
    let (status, body) = common::json_body(response).await;

    assert_eq!(status, 200);
    assert_eq!(body["result"][1], json!({"id": "a2", "name": "sara"}));

    let page = db
        .queries()
        .into_iter()
        .find(|q| q.sql.contains("LIMIT"))
        .unwrap();
    assert!(page.sql.ends_with("LIMIT 2 OFFSET 2"));
    assert_eq!(page.args, vec![json!("12345")]);
}

#[tokio::test]
async fn test_empty_result() {
    let db = scripted_db();
    let strict: QueryHandler<ByBranch> =
        QueryHandler::new(HandlerParameters::new("Accounts", "/strict").body_mode(BodyMode::Query), command());
    let lenient: QueryHandler<ByBranch> =
        QueryHandler::new(HandlerParameters::new("Accounts", "/lenient").body_mode(BodyMode::Query), command())
            .on_empty_200(true);
    let runtime = Runtime::builder().db(db).build();
    let app = Router::new()
        .route("/strict", get(pipeline::handler(runtime.clone(), strict)))
        .route("/lenient", get(pipeline::handler(runtime, lenient)));

    let (status, body) = common::json_body(common::send(&app, get_request("/strict?branch=99999")).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::NO_DATA_FOUND);

    let (status, body) = common::json_body(common::send(&app, get_request("/lenient?branch=99999")).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"], json!([]));
}

#[tokio::test]
async fn test_cache_answers_repeat_queries() {
    let db = scripted_db();
    let handler: QueryHandler<ByBranch> = QueryHandler::new(
        HandlerParameters::new("Accounts", "/accounts").body_mode(BodyMode::Query),
        command(),
    )
    .cache(Duration::from_secs(60));
    let app = Router::new().route(
        "/accounts",
        get(pipeline::handler(Runtime::builder().db(db.clone()).build(), handler)),
    );

    for _ in 0..3 {
        let (status, _) = common::json_body(common::send(&app, get_request("/accounts?branch=12345")).await).await;
        assert_eq!(status, 200);
    }
    assert_eq!(db.queries().len(), 1);
}

#[tokio::test]
async fn test_missing_database() {
    let handler: QueryHandler<ByBranch> = QueryHandler::new(
        HandlerParameters::new("Accounts", "/accounts").body_mode(BodyMode::Query),
        command(),
    );
    let app = Router::new().route(
        "/accounts",
        get(pipeline::handler(Runtime::builder().build(), handler)),
    );

    let (status, body) = common::json_body(common::send(&app, get_request("/accounts?branch=12345")).await).await;
    assert_eq!(status, 500);
    assert_eq!(body["description"], errors::DB_NOT_CONFIGURED);
}
