//! HTTP surface for the knowledge base.
//!
//! JSON API consumed by the FlowFactor site's widgets:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/knowledge/upload` | Ingest an extracted document |
//! | `GET`  | `/knowledge/list` | List ingested filenames |
//! | `DELETE` | `/knowledge/delete` | Remove a document and its chunks |
//! | `POST` | `/knowledge/category` | Re-categorize a document |
//! | `POST` | `/chat` | Ask the knowledge base a question |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Knowledge endpoints return `{"error": ...}` with 400 for missing or
//! malformed fields and 500 for processing failures. The chat endpoint is
//! different by design: it always answers 200 with a `response` string,
//! masking pipeline failures behind a friendly apology so conversational
//! UIs never render raw error chrome.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::StoreError;
use crate::format;
use crate::ingest;
use crate::models::Category;
use crate::search;
use crate::store::KnowledgeStore;

/// Shared state passed to all handlers via axum's `State` extractor.
/// The store is an injected trait object, not a module-level singleton.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn KnowledgeStore>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config, store: Arc<dyn KnowledgeStore>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
    };

    let app = router(state);

    info!(addr = %bind_addr, "knowledge-base server listening");
    println!("kb server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/knowledge/upload", post(handle_upload))
        .route("/knowledge/list", get(handle_list))
        .route("/knowledge/delete", delete(handle_delete))
        .route("/knowledge/category", post(handle_category))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// Flat `{"error": ...}` body used by the knowledge endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            // DuplicateKey is handled as a skip by the ingest pipeline;
            // reaching here means a caller hit it directly.
            StoreError::DuplicateKey(_) => StatusCode::CONFLICT,
            StoreError::ProviderUnavailable(_) | StoreError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ /knowledge/upload ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    message: String,
    chunks_created: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let file_name = req
        .file_name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("fileName is required"))?;
    let text = req
        .text
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("text is required"))?;

    let category = match req.category.as_deref() {
        Some(raw) => raw.parse::<Category>().map_err(AppError::from)?,
        None => Category::default(),
    };

    let outcome = ingest::ingest_document(
        state.store.as_ref(),
        &state.config,
        file_name,
        text,
        req.file_url.as_deref(),
        category,
    )
    .await?;

    let message = if outcome.skipped_duplicate {
        format!("'{}' already ingested, skipped", file_name)
    } else {
        format!(
            "'{}' ingested as {} chunks",
            file_name, outcome.chunks_created
        )
    };

    Ok(Json(UploadResponse {
        success: true,
        message,
        chunks_created: outcome.chunks_created,
    }))
}

// ============ /knowledge/list ============

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<String>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ListResponse>, AppError> {
    let documents = state.store.list_documents().await?;
    Ok(Json(ListResponse { documents }))
}

// ============ /knowledge/delete ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let file_name = req
        .file_name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("fileName is required"))?;

    let removed = state.store.delete_document(file_name).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("'{}' deleted ({} chunks removed)", file_name, removed),
    }))
}

// ============ /knowledge/category ============

#[derive(Deserialize)]
struct CategoryRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

async fn handle_category(
    State(state): State<AppState>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = req
        .id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("id is required"))?;
    let category = req
        .category
        .as_deref()
        .ok_or_else(|| bad_request("category is required"))?
        .parse::<Category>()
        .map_err(AppError::from)?;

    state.store.update_category(id, category).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("category set to {}", category),
    }))
}

// ============ /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let message = req.message.unwrap_or_default();

    let response =
        match search::search_chunks(state.store.as_ref(), &state.config, &message, None).await {
            Ok((results, _mode)) => {
                format::format_answer(&results, &message, state.config.retrieval.snippet_chars)
            }
            Err(e) => {
                error!(error = %e, "chat search failed");
                format::apology()
            }
        };

    Json(ChatResponse { response })
}

// ============ /health ============

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
