//! JSON HTTP API for the document library.
//!
//! Exposes the catalog, shelves, and background uploads under the `/api`
//! prefix for browser frontends and scripts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/api/documents` | List or search (query: `sort_by`, `search`, `field`, `shelf`) |
//! | `GET`    | `/api/documents/{id}` | Full record with live shelf membership |
//! | `GET`    | `/api/documents/{id}/text` | Extracted plain text |
//! | `GET`    | `/api/documents/{id}/pdf` | Archived PDF bytes |
//! | `DELETE` | `/api/documents/{id}` | Delete record, artifacts, and index entry |
//! | `GET`    | `/api/shelves` | List shelves (Unsorted first) |
//! | `POST`   | `/api/shelves` | Create a shelf |
//! | `GET`/`PUT`/`DELETE` | `/api/shelves/{id}` | Get / rename / delete |
//! | `PUT`    | `/api/documents/{id}/shelves` | Replace membership |
//! | `POST`/`DELETE` | `/api/documents/{id}/shelves/{shelf_id}` | Add / remove one |
//! | `POST`   | `/api/upload` | Multipart PDF upload, returns `{task_id}` |
//! | `GET`    | `/api/tasks`, `/api/tasks/{id}` | Background task status |
//! | `GET`    | `/api/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document: report" } }
//! ```
//!
//! Codes: `not_found` (404), `conflict` (409), `invalid_operation` (400),
//! `extraction_failed` / `reader_failed` (422), `storage_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends can
//! talk to a locally running server.

use std::io::Write;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::error::ShelfError;
use crate::index::Library;
use crate::readers;
use crate::search::{sort_documents, SearchField, SortKey};
use crate::tasks::TaskRegistry;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    library: Arc<Library>,
    tasks: TaskRegistry,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, library: Library) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        library: Arc::new(library),
        tasks: TaskRegistry::new(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/documents", get(handle_list_documents))
        .route(
            "/api/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/api/documents/{id}/text", get(handle_get_text))
        .route("/api/documents/{id}/pdf", get(handle_get_pdf))
        .route(
            "/api/documents/{id}/shelves",
            put(handle_set_document_shelves),
        )
        .route(
            "/api/documents/{id}/shelves/{shelf_id}",
            post(handle_add_to_shelf).delete(handle_remove_from_shelf),
        )
        .route(
            "/api/shelves",
            get(handle_list_shelves).post(handle_create_shelf),
        )
        .route(
            "/api/shelves/{id}",
            get(handle_get_shelf)
                .put(handle_update_shelf)
                .delete(handle_delete_shelf),
        )
        .route("/api/upload", post(handle_upload))
        .route("/api/tasks", get(handle_list_tasks))
        .route("/api/tasks/{id}", get(handle_get_task))
        .route("/api/health", get(handle_health))
        // The axum default of 2 MB rejects most scanned PDFs.
        .layer(DefaultBodyLimit::max(
            config.server.max_upload_mb * 1024 * 1024,
        ))
        .layer(cors)
        .with_state(state);

    info!("doc shelf server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
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

impl From<ShelfError> for AppError {
    fn from(err: ShelfError) -> Self {
        let (status, code) = match &err {
            ShelfError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ShelfError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ShelfError::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "invalid_operation"),
            ShelfError::Extraction(_) | ShelfError::NoExtractableText => {
                (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed")
            }
            ShelfError::Reader(_) => (StatusCode::UNPROCESSABLE_ENTITY, "reader_failed"),
            ShelfError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_operation".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ Documents ============

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    shelf: Option<String>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let shelf = query.shelf.as_deref();
    let mut documents = match query.search.as_deref().filter(|s| !s.is_empty()) {
        Some(needle) => {
            let field = SearchField::parse(query.field.as_deref().unwrap_or("all"))?;
            state.library.search(needle, field, shelf)?
        }
        None => state.library.list_documents(shelf)?,
    };

    let sort = SortKey::parse(query.sort_by.as_deref().unwrap_or("date"))?;
    sort_documents(&mut documents, sort);

    Ok(Json(serde_json::json!({
        "documents": documents,
        "total": documents.len(),
    })))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record = state.library.store().read(&id)?;
    let shelves = state
        .library
        .load_index()?
        .find_document(&id)
        .map(|entry| entry.shelves.clone())
        .unwrap_or_default();

    let mut body = serde_json::to_value(&record)
        .map_err(|e| ShelfError::storage("serializing record", e))?;
    if let Some(object) = body.as_object_mut() {
        object.insert("shelves".to_string(), serde_json::json!(shelves));
    }
    Ok(Json(body))
}

async fn handle_get_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let text = state.library.store().read_text(&id)?;
    Ok(Json(serde_json::json!({ "text": text })))
}

async fn handle_get_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let store = state.library.store();
    let record = store.read(&id)?;

    if !record.source_type.is_empty() && record.source_type != "pdf" {
        return Err(bad_request(format!("document is not a PDF: {}", id)));
    }

    let mut pdf_path = None;
    if let Some(source_file) = &record.source_file {
        if source_file.to_lowercase().ends_with(".pdf") {
            pdf_path = store.resolve_source_path(source_file);
        }
    }
    if pdf_path.is_none() {
        let fallback = store.archive_path(&id, "pdf");
        if fallback.exists() {
            pdf_path = Some(fallback);
        }
    }
    let pdf_path = pdf_path.ok_or_else(|| not_found(format!("PDF not found: {}", id)))?;

    let bytes = std::fs::read(&pdf_path)
        .map_err(|e| ShelfError::storage(format!("reading {}", pdf_path.display()), e))?;
    // No Content-Disposition: ids can be non-ASCII and header encoding is
    // not worth the trouble for inline viewing.
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes).into_response())
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.library.delete_document(&id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ============ Shelves ============

#[derive(Deserialize)]
struct ShelfCreate {
    name: String,
    #[serde(default)]
    name_ja: String,
}

#[derive(Deserialize)]
struct ShelfUpdate {
    name: String,
    #[serde(default)]
    name_ja: Option<String>,
}

#[derive(Deserialize)]
struct DocumentShelvesUpdate {
    shelf_ids: Vec<String>,
}

async fn handle_list_shelves(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(serde_json::json!(state.library.list_shelves()?)))
}

async fn handle_create_shelf(
    State(state): State<AppState>,
    Json(body): Json<ShelfCreate>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let shelf = state.library.create_shelf(&body.name, &body.name_ja)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(shelf))))
}

async fn handle_get_shelf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let shelf = state.library.get_shelf(&id)?;
    Ok(Json(serde_json::json!(shelf)))
}

async fn handle_update_shelf(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ShelfUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    let shelf = state
        .library
        .rename_shelf(&id, &body.name, body.name_ja.as_deref())?;
    Ok(Json(serde_json::json!(shelf)))
}

async fn handle_delete_shelf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.library.delete_shelf(&id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn handle_set_document_shelves(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DocumentShelvesUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .library
        .assign_document_to_shelves(&id, body.shelf_ids)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn handle_add_to_shelf(
    State(state): State<AppState>,
    Path((id, shelf_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.library.add_document_to_shelf(&id, &shelf_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn handle_remove_from_shelf(
    State(state): State<AppState>,
    Path((id, shelf_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.library.remove_document_from_shelf(&id, &shelf_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// ============ Upload & tasks ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut file_name = None;
    let mut file_bytes = None;
    let mut shelves_raw = String::new();
    let mut reader_choice = state.config.readers.default_choice.clone();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?,
                );
            }
            "shelves" => {
                shelves_raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid shelves field: {}", e)))?;
            }
            "reader" => {
                reader_choice = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid reader field: {}", e)))?;
            }
            _ => {}
        }
    }

    let file_name = file_name.filter(|n| !n.is_empty());
    let (Some(file_name), Some(file_bytes)) = (file_name, file_bytes) else {
        return Err(bad_request("missing file field"));
    };
    if !file_name.to_lowercase().ends_with(".pdf") {
        return Err(bad_request("only PDF files are accepted"));
    }

    // Reject an unknown reader choice before spawning anything.
    let readers = readers::readers_for(&reader_choice, &state.config.readers)?;

    let shelves: Vec<String> = shelves_raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let shelves = if shelves.is_empty() {
        None
    } else {
        Some(shelves)
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ShelfError::storage("creating upload temp file", e))?;
    tmp.write_all(&file_bytes)
        .map_err(|e| ShelfError::storage("writing upload temp file", e))?;

    let task_id = state.tasks.create();
    let sink = state.tasks.sink_for(&task_id);
    let library = state.library.clone();

    tokio::spawn(async move {
        // The temp path is owned by this task; the file is deleted when it
        // drops, on every exit path.
        let temp_path = tmp.into_temp_path();
        let _ = crate::ingest::run_pipeline(
            &library,
            &temp_path,
            &file_name,
            &readers,
            shelves,
            &sink,
        )
        .await;
        drop(temp_path);
    });

    Ok(Json(serde_json::json!({ "task_id": task_id })))
}

async fn handle_get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let task = state
        .tasks
        .get(&id)
        .ok_or_else(|| not_found(format!("task not found: {}", id)))?;
    Ok(Json(serde_json::json!(task)))
}

async fn handle_list_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.tasks.all()))
}

// ============ GET /api/health ============

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shelf_errors_map_to_documented_statuses() {
        let cases = [
            (
                ShelfError::not_found("document: x"),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ShelfError::Conflict("dup".to_string()),
                StatusCode::CONFLICT,
                "conflict",
            ),
            (
                ShelfError::InvalidOperation("nope".to_string()),
                StatusCode::BAD_REQUEST,
                "invalid_operation",
            ),
            (
                ShelfError::Extraction("bad pdf".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "extraction_failed",
            ),
            (
                ShelfError::NoExtractableText,
                StatusCode::UNPROCESSABLE_ENTITY,
                "extraction_failed",
            ),
            (
                ShelfError::Reader("cli died".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "reader_failed",
            ),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }
}
