//! Upload then download through the attachment endpoints.

use axum::body::Body;
use axum::http::{header, Request};
use axum::routing::{get, post};
use axum::Router;

use request_core::endpoints::attachment::{DownloadHandler, UploadHandler};
use request_core::errors;
use request_core::pipeline::{self, HandlerParameters};
use request_core::runtime::Runtime;

mod common;

const BOUNDARY: &str = "XBOUNDARYX";

fn app(dir: &std::path::Path) -> Router {
    let runtime = Runtime::builder().build();
    Router::new()
        .route(
            "/files",
            post(pipeline::handler(
                runtime.clone(),
                UploadHandler::new(HandlerParameters::new("Upload", "/files"), dir),
            )),
        )
        .route(
            "/files/{name}",
            get(pipeline::handler(
                runtime,
                DownloadHandler::new(HandlerParameters::new("Download", "/files/{name}"), dir),
            )),
        )
}

fn with_headers(mut builder: axum::http::request::Builder) -> axum::http::request::Builder {
    for (name, value) in common::HEADERS {
        builder = builder.header(name, value);
    }
    builder
}

fn upload(file_name: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        c = content
    );
    with_headers(Request::builder().method("POST").uri("/files"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn download(name: &str) -> Request<Body> {
    with_headers(Request::builder().method("GET").uri(format!("/files/{}", name)))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_upload_then_download() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = common::json_body(common::send(&app, upload("statement.txt", "balance: 10")).await).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["file_name"], "statement.txt");
    let id = body["result"]["id"].as_str().unwrap().to_string();
    assert_eq!(std::fs::read_to_string(dir.path().join(&id)).unwrap(), "balance: 10");

    let response = common::send(&app, download(&id)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}\"", id).as_str()
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"balance: 10");
}

#[tokio::test]
async fn test_download_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = common::json_body(common::send(&app, download("nothing.pdf")).await).await;
    assert_eq!(status, 404);
    assert_eq!(body["description"], errors::FILE_NOT_FOUND);
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = with_headers(Request::builder().method("POST").uri("/files"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap();

    let (status, body) = common::json_body(common::send(&app, request).await).await;
    assert_eq!(status, 400);
    assert_eq!(body["description"], errors::REQUIRED_FIELD);
}
