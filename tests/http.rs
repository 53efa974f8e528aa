use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use docsearch::config::Config;
use docsearch::parser::LocalParser;
use docsearch::server::router;
use docsearch::services::Services;
use docsearch_core::dense::hashing::HashingEmbedder;
use docsearch_core::dense::memory::InMemoryVectorIndex;
use docsearch_core::dense::DenseRetrieval;
use docsearch_core::storage::memory::InMemoryBlobStore;

fn app(dense: bool) -> Router {
    let dense = dense.then(|| {
        DenseRetrieval::new(
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(InMemoryVectorIndex::new()),
            16,
        )
    });
    router(Services::assemble(
        Config::default(),
        Arc::new(InMemoryBlobStore::new()),
        dense,
        Arc::new(LocalParser),
        None,
    ))
}

async fn call(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn json_call(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, method, uri, Body::from(body.to_string())).await
}

async fn upload(app: &Router, name: &str, content: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::PUT,
        &format!("/documents/{}", name),
        Body::from(content.to_string()),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let app = app(false);
    let (status, body) = call(&app, Method::GET, "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_document_lifecycle_over_http() {
    let app = app(true);

    let (status, body) = upload(&app, "notes.txt", "The invoice is due in thirty days.").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["document"], "notes.txt");

    let (status, body) = call(&app, Method::POST, "/documents/notes.txt/ingest", Body::empty()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "not_parsed");

    let (status, body) = call(&app, Method::POST, "/documents/notes.txt/parse", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "The invoice is due in thirty days.");

    let (status, body) = call(&app, Method::POST, "/documents/notes.txt/ingest", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dense_indexed"], true);
    assert_eq!(body["vector_ids"], json!(["notes.txt#0"]));

    let (status, body) = call(&app, Method::GET, "/documents", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploads"], json!(["notes.txt"]));
    assert_eq!(body["parsed"], json!(["notes.txt"]));
    assert_eq!(body["indexed"], json!(["notes.txt"]));

    let (status, body) =
        json_call(&app, Method::POST, "/search", json!({"query": "invoice"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    assert_eq!(body["results"][0]["document"], "notes.txt");
    assert!(body.get("answer").is_none());
    assert!(body.get("diagnostics").is_none());

    let (status, body) = call(&app, Method::DELETE, "/documents/notes.txt", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upload"], true);
    assert_eq!(body["parsed"], true);
    assert_eq!(body["keyword_record"], true);
    assert_eq!(body["vectors"], true);

    let (status, body) = call(&app, Method::GET, "/documents/notes.txt/content", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_edit_and_ingest() {
    let app = app(false);

    let (status, _) = json_call(
        &app,
        Method::PUT,
        "/documents/draft.md/content",
        json!({"content": "first version"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/documents/draft.md/content", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "first version");

    let (status, body) = json_call(
        &app,
        Method::POST,
        "/documents/draft.md/content/ingest",
        json!({"content": "second version with warranty terms"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dense_indexed"], false);

    let (_, body) = json_call(
        &app,
        Method::POST,
        "/search",
        json!({"query": "warranty", "debug": true}),
    )
    .await;
    assert_eq!(body["results"][0]["document"], "draft.md");
    assert!(body["results"][0]["explain"].is_object());
    assert_eq!(body["diagnostics"]["records_loaded"], 1);
    assert_eq!(body["diagnostics"]["dense_enabled"], false);
}

#[tokio::test]
async fn test_error_codes() {
    let app = app(false);

    let (status, body) = upload(&app, "malware.exe", "MZ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = json_call(&app, Method::POST, "/search", json!({"query": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("query must not be empty"));

    let (status, _) = json_call(
        &app,
        Method::POST,
        "/search",
        json!({"query": "x", "top_k": 500}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_call(
        &app,
        Method::POST,
        "/documents/blank.md/content/ingest",
        json!({"content": "   "}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "empty_document");

    let (status, _) = call(&app, Method::POST, "/documents/ghost.pdf/parse", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/documents/x.md/summary", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not configured"));
}

#[tokio::test]
async fn test_search_empty_corpus() {
    let app = app(true);
    let (status, body) =
        json_call(&app, Method::POST, "/search", json!({"query": "anything"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_results");
    assert_eq!(body["results"], json!([]));
}
