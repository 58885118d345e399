//! HTTP API server.
//!
//! Thin axum layer over [`Assistant`]. Handlers parse input, call one
//! assistant operation, and map the outcome to a JSON body. Every request
//! gets a terminal response; upstream failures are never surfaced as a bare
//! 500 without a body.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness text |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | `{message}` → `{response}` against the search index |
//! | `POST` | `/upload_and_ask` | multipart `file` + `question` → `{answer}` |
//! | `POST` | `/extract_text` | multipart `file` → `{text}` |
//! | `POST` | `/followup_chat` | `{doc, history}` → `{answer}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "question must not be empty", "code": "bad_request" }
//! ```
//!
//! `/chat` is the exception: it always answers `200` with a `response`
//! string, degrading errors into that string.
//!
//! | Condition | Status |
//! |-----------|--------|
//! | missing/invalid input | 400 |
//! | `/extract_text` with no extracted text | 400 |
//! | `/upload_and_ask` with no extracted text | 422 |
//! | storage, extraction, or completion failure | 500 |

use axum::{
    extract::{multipart::Multipart, rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::assistant::{AssistError, Assistant, UploadedFile};
use crate::config::Config;
use crate::session::ConversationSession;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config, assistant: Arc<Assistant>) -> anyhow::Result<()> {
    let app = router(assistant, config.server.max_upload_bytes);

    tracing::info!(bind = %config.server.bind, "docent listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed so tests and embedders can serve it themselves.
pub fn router(assistant: Arc<Assistant>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_home))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/upload_and_ask", post(handle_upload_and_ask))
        .route("/extract_text", post(handle_extract_text))
        .route("/followup_chat", post(handle_followup))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { assistant })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Maps assistant failures onto statuses. The empty-document status differs by
/// endpoint, so the caller supplies it.
fn classify(err: AssistError, empty_document_status: StatusCode) -> AppError {
    let status = match &err {
        AssistError::EmptyDocument => empty_document_status,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, code = err.code(), "request failed");
    } else {
        tracing::warn!(error = %err, code = err.code(), "request rejected");
    }
    AppError {
        status,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

// ============ GET / and /health ============

async fn handle_home() -> &'static str {
    "Docent chatbot API is running!"
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Never fails: a malformed body is answered like any other error, inside `response`.
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<ChatResponse> {
    let response = match body {
        Ok(Json(req)) => state.assistant.chat(&req.message).await,
        Err(rejection) => format!("Error retrieving insights: {}", rejection.body_text()),
    };
    Json(ChatResponse { response })
}

// ============ Multipart uploads ============

struct UploadForm {
    file: Option<UploadedFile>,
    question: Option<String>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        file: None,
        question: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?
                    .to_vec();
                form.file = Some(UploadedFile {
                    name,
                    content_type,
                    bytes,
                });
            }
            Some("question") => {
                form.question = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("Read error: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    Ok(form)
}

// ============ POST /upload_and_ask ============

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
}

async fn handle_upload_and_ask(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnswerResponse>, AppError> {
    let form = read_upload_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| bad_request("Missing file in multipart form"))?;
    let question = form
        .question
        .ok_or_else(|| bad_request("Missing question in multipart form"))?;

    let answer = state
        .assistant
        .upload_and_ask(file, &question)
        .await
        .map_err(|e| classify(e, StatusCode::UNPROCESSABLE_ENTITY))?;

    Ok(Json(AnswerResponse { answer }))
}

// ============ POST /extract_text ============

#[derive(Serialize)]
struct ExtractResponse {
    text: String,
}

async fn handle_extract_text(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, AppError> {
    let form = read_upload_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| bad_request("Missing file in multipart form"))?;

    let document = state
        .assistant
        .extract_text(file)
        .await
        .map_err(|e| match e {
            AssistError::EmptyDocument => bad_request("No text extracted from document"),
            other => classify(other, StatusCode::BAD_REQUEST),
        })?;

    Ok(Json(ExtractResponse {
        text: document.body_text,
    }))
}

// ============ POST /followup_chat ============

#[derive(Deserialize)]
struct FollowupRequest {
    doc: String,
    history: ConversationSession,
}

async fn handle_followup(
    State(state): State<AppState>,
    body: Result<Json<FollowupRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(req) = body.map_err(|rejection| bad_request(rejection.body_text()))?;

    let answer = state
        .assistant
        .followup(&req.doc, &req.history)
        .await
        .map_err(|e| classify(e, StatusCode::BAD_REQUEST))?;

    Ok(Json(AnswerResponse { answer }))
}
