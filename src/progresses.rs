use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};
use crate::subjects::Subject;

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Progress {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub subject: Option<i64>,
    #[serde(default)]
    pub subject_details: Option<Subject>,
    #[serde(default)]
    pub sequence: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProgressPayload {
    pub name: String,
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProgressWithCount {
    #[serde(flatten)]
    pub progress: Progress,
    pub problem_count: i64,
}

pub enum ProgressError {
    MissingName,
    Backend(BackendError),
}

impl From<BackendError> for ProgressError {
    fn from(e: BackendError) -> Self {
        ProgressError::Backend(e)
    }
}

impl IntoResponse for ProgressError {
    fn into_response(self) -> Response {
        match self {
            ProgressError::MissingName => {
                (StatusCode::BAD_REQUEST, "Progress name is required").into_response()
            }
            ProgressError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_progresses(backend: &Backend) -> Result<ListPage<Progress>, BackendError> {
    let value: Value = backend.get("/admin/progresses/").await?;
    Ok(unwrap_list(value))
}

pub async fn create_progress(
    backend: &Backend,
    payload: &ProgressPayload,
) -> Result<Progress, BackendError> {
    backend.post("/admin/progresses/", payload).await
}

/// The problem list endpoint reports a total count in its envelope, so a
/// filtered fetch doubles as a count lookup.
pub async fn count_problems(backend: &Backend, progress_id: i64) -> Result<i64, BackendError> {
    let value: Value = backend
        .get(&format!("/admin/problems/?progress={}", progress_id))
        .await?;
    let page: ListPage<Value> = unwrap_list(value);
    Ok(page.count)
}

async fn list_progresses(State(state): State<AppState>) -> Result<impl IntoResponse, ProgressError> {
    let page = fetch_progresses(&state.backend).await?;
    log::debug!("Found {} progresses", page.items.len());
    Ok(Json(page))
}

/// One count lookup per progress, all in flight together.
async fn list_progresses_with_counts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ProgressError> {
    let page = fetch_progresses(&state.backend).await?;

    let counts = join_all(
        page.items
            .iter()
            .map(|p| count_problems(&state.backend, p.id)),
    )
    .await;

    let mut rows = Vec::with_capacity(page.items.len());
    for (progress, count) in page.items.into_iter().zip(counts) {
        rows.push(ProgressWithCount {
            progress,
            problem_count: count?,
        });
    }

    log::debug!("Resolved problem counts for {} progresses", rows.len());
    Ok(Json(rows))
}

async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ProgressError> {
    let progress: Progress = state
        .backend
        .get(&format!("/admin/progresses/{}/", id))
        .await?;
    Ok(Json(progress))
}

async fn create_progress_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProgressPayload>,
) -> Result<impl IntoResponse, ProgressError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to create progress with empty name");
        return Err(ProgressError::MissingName);
    }

    let created = create_progress(&state.backend, &payload).await?;
    log::info!("Created progress: id={}, name={}", created.id, created.name);

    let page = fetch_progresses(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProgressPayload>,
) -> Result<impl IntoResponse, ProgressError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to update progress {} with empty name", id);
        return Err(ProgressError::MissingName);
    }

    let _: Progress = state
        .backend
        .put(&format!("/admin/progresses/{}/", id), &payload)
        .await?;
    log::info!("Updated progress: id={}", id);

    let page = fetch_progresses(&state.backend).await?;
    Ok(Json(page))
}

async fn delete_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ProgressError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/progresses/{}/", id))
        .await?;
    log::info!("Deleted progress: id={}", id);

    let page = fetch_progresses(&state.backend).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/progresses",
            get(list_progresses).post(create_progress_handler),
        )
        .route("/progresses/counts", get(list_progresses_with_counts))
        .route(
            "/progresses/:id",
            get(get_progress).put(update_progress).delete(delete_progress),
        )
        .with_state(state)
}
