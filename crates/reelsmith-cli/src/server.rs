//! HTTP surface for the render service.
//!
//! Every handler returns `Result<T, ApiError>`; `ApiError` turns the library
//! error into a JSON body with a matching status code.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reelsmith_core::{BridgeContent, BridgeStore, ReelError};
use reelsmith_tasks::{RenderRequest, RenderTask, TaskManager};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

pub struct AppState {
    pub manager: TaskManager,
    pub bridge: Arc<dyn BridgeStore>,
}

pub fn router(state: Arc<AppState>, output_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/status/{id}", get(status))
        .route("/api/download/{id}", get(download))
        .route("/api/tasks", get(list_tasks))
        .route("/bridge/{id}", get(bridge))
        .route("/overlay", get(overlay_index))
        .route("/overlay/{*path}", get(overlay_asset))
        .route("/health", get(health))
        .nest_service("/videos", ServeDir::new(output_dir))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError(ReelError);

impl From<ReelError> for ApiError {
    fn from(e: ReelError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            ReelError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": format!("{what} not found") }),
            ),
            ReelError::NotReady { id, status } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_ready",
                    "message": format!("task {id} has no result yet"),
                    "status": status,
                }),
            ),
            ReelError::InvalidArgument(m) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "bad_request", "message": m }),
            ),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal", "message": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RenderRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let task_id = state.manager.submit(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "taskId": task_id, "status": "queued" })),
    ))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RenderTask>, ApiError> {
    Ok(Json(state.manager.status(&id)?))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<RenderTask>>, ApiError> {
    Ok(Json(state.manager.list()?))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let locator = state.manager.result_locator(&id)?;
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return Ok(Redirect::temporary(&locator).into_response());
    }

    if let Err(e) = tokio::fs::metadata(&locator).await {
        tracing::warn!(task_id = %id, locator = %locator, error = %e, "stored render is missing");
        return Err(ReelError::NotFound(format!("output of task {id}")).into());
    }
    let name = std::path::Path::new(&locator)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reel.mp4")
        .to_string();

    // ServeFile streams the body and answers Range requests.
    let served = ServeFile::new(&locator)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    let mut response = served.map(Body::new);
    if response.status().is_success() {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    }
    Ok(response)
}

async fn bridge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BridgeContent>, ApiError> {
    state
        .bridge
        .read(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(ReelError::NotFound(format!("bridge content for task {id}"))))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Bundled overlay document ────────────────────────────────────────

#[derive(rust_embed::RustEmbed)]
#[folder = "overlay/"]
struct OverlayAsset;

async fn overlay_index() -> Response {
    serve_overlay("index.html")
}

async fn overlay_asset(Path(path): Path<String>) -> Response {
    serve_overlay(&path)
}

fn serve_overlay(path: &str) -> Response {
    match OverlayAsset::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                content.data,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}
