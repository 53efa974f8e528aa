//! HTTP JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/documents` | Uploaded, parsed and indexed document names |
//! | `PUT`    | `/documents/{name}` | Upload raw bytes (request body) |
//! | `DELETE` | `/documents/{name}` | Delete every form of a document |
//! | `POST`   | `/documents/{name}/parse` | Parse the upload, return markdown |
//! | `GET`    | `/documents/{name}/content` | Read parsed text |
//! | `PUT`    | `/documents/{name}/content` | Save edited text `{content}` |
//! | `POST`   | `/documents/{name}/content/ingest` | Save edited text, then ingest |
//! | `POST`   | `/documents/{name}/ingest` | Ingest the parsed text |
//! | `POST`   | `/search` | Hybrid search, optional generated answer |
//! | `GET`    | `/documents/{name}/summary` | Summarize |
//! | `GET`    | `/documents/{name}/questions?count=` | Generate questions |
//! | `GET`    | `/documents/{name}/faq?count=` | Generate an FAQ |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: a.pdf" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `not_parsed` (409),
//! `empty_document` (422), `upstream` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use docsearch_core::error::Error;
use docsearch_core::DocumentName;

use crate::ingest::IngestReport;
use crate::services::{
    DeleteReport, DocumentListing, ParseReport, SearchQuery, SearchResponse, Services,
};

/// Bind to `bind_addr` and serve until the process ends.
pub async fn run_server(services: Services, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "docsearch listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// The full route table over `services`.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    // Headroom over the upload limit so oversize bodies reach the size check
    // and get a JSON error instead of a bare 413.
    let body_limit = services.config().documents.max_upload_bytes.saturating_add(1);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list))
        .route(
            "/documents/{name}",
            put(handle_upload).delete(handle_delete),
        )
        .route("/documents/{name}/parse", post(handle_parse))
        .route(
            "/documents/{name}/content",
            get(handle_read_content).put(handle_save_content),
        )
        .route(
            "/documents/{name}/content/ingest",
            post(handle_save_and_ingest),
        )
        .route("/documents/{name}/ingest", post(handle_ingest))
        .route("/documents/{name}/summary", get(handle_summary))
        .route("/documents/{name}/questions", get(handle_questions))
        .route("/documents/{name}/faq", get(handle_faq))
        .route("/search", post(handle_search))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match err.downcast_ref::<Error>() {
            Some(Error::InvalidRequest(_)) => (StatusCode::BAD_REQUEST, "bad_request"),
            Some(Error::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Some(Error::DocumentNotParsed(_)) => (StatusCode::CONFLICT, "not_parsed"),
            Some(Error::EmptyDocument(_)) => (StatusCode::UNPROCESSABLE_ENTITY, "empty_document"),
            Some(Error::ExternalService { .. }) => (StatusCode::BAD_GATEWAY, "upstream"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %format!("{:#}", err), "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_list(State(services): State<Services>) -> ApiResult<DocumentListing> {
    Ok(Json(services.list().await?))
}

#[derive(Serialize)]
struct UploadResponse {
    document: DocumentName,
    bytes: usize,
}

async fn handle_upload(
    State(services): State<Services>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let document = services.upload(&name, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document,
            bytes: body.len(),
        }),
    ))
}

async fn handle_delete(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> ApiResult<DeleteReport> {
    Ok(Json(services.delete(&name).await?))
}

async fn handle_parse(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> ApiResult<ParseReport> {
    Ok(Json(services.parse(&name).await?))
}

#[derive(Serialize)]
struct ContentResponse {
    document: String,
    content: String,
}

async fn handle_read_content(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> ApiResult<ContentResponse> {
    let content = services.read_content(&name).await?;
    Ok(Json(ContentResponse {
        document: name,
        content,
    }))
}

#[derive(Deserialize)]
struct ContentBody {
    content: String,
}

#[derive(Serialize)]
struct SavedResponse {
    document: DocumentName,
    saved: bool,
}

async fn handle_save_content(
    State(services): State<Services>,
    Path(name): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<SavedResponse> {
    let document = services.save_content(&name, &body.content).await?;
    Ok(Json(SavedResponse {
        document,
        saved: true,
    }))
}

async fn handle_save_and_ingest(
    State(services): State<Services>,
    Path(name): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<IngestReport> {
    Ok(Json(services.save_and_ingest(&name, &body.content).await?))
}

async fn handle_ingest(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> ApiResult<IngestReport> {
    Ok(Json(services.ingest(&name).await?))
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    query: String,
    top_k: Option<usize>,
    #[serde(default)]
    documents: Vec<String>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    answer: bool,
}

async fn handle_search(
    State(services): State<Services>,
    Json(body): Json<SearchBody>,
) -> ApiResult<SearchResponse> {
    let query = SearchQuery {
        query: body.query,
        top_k: body.top_k,
        documents: body.documents,
        debug: body.debug,
        answer: body.answer,
    };
    Ok(Json(services.search(query).await?))
}

#[derive(Serialize)]
struct SummaryResponse {
    document: String,
    summary: String,
}

async fn handle_summary(
    State(services): State<Services>,
    Path(name): Path<String>,
) -> ApiResult<SummaryResponse> {
    let summary = services.summarize(&name).await?;
    Ok(Json(SummaryResponse {
        document: name,
        summary,
    }))
}

#[derive(Deserialize)]
struct CountParams {
    count: Option<usize>,
}

#[derive(Serialize)]
struct QuestionsResponse {
    document: String,
    questions: Vec<String>,
}

async fn handle_questions(
    State(services): State<Services>,
    Path(name): Path<String>,
    Query(params): Query<CountParams>,
) -> ApiResult<QuestionsResponse> {
    let questions = services.questions(&name, params.count).await?;
    Ok(Json(QuestionsResponse {
        document: name,
        questions,
    }))
}

#[derive(Serialize)]
struct FaqResponse {
    document: String,
    faq: String,
}

async fn handle_faq(
    State(services): State<Services>,
    Path(name): Path<String>,
    Query(params): Query<CountParams>,
) -> ApiResult<FaqResponse> {
    let faq = services.faq(&name, params.count).await?;
    Ok(Json(FaqResponse {
        document: name,
        faq,
    }))
}
