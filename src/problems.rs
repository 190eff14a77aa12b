use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{query_string, AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};
use crate::progresses::Progress;
use crate::uploads::{backend_form, collect_form, UploadError};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Problem {
    pub id: i64,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub progress_details: Option<Progress>,
    pub problem: String,
    #[serde(default)]
    pub answer: Option<i64>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub exam_year: Option<i64>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub sequence: Option<i64>,
}

/// Choice row attached to a problem.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct ProblemSelect {
    pub id: i64,
    pub problem: i64,
    pub content: String,
    pub sequence: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewProblem {
    pub progress: i64,
    pub problem: String,
    pub answer: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub sequence: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewProblemSelect {
    pub problem: i64,
    pub content: String,
    pub sequence: i64,
}

#[derive(Deserialize)]
pub struct ListProblemsQuery {
    #[serde(default)]
    progress: Option<i64>,
    #[serde(default)]
    page: Option<i64>,
}

pub enum ProblemError {
    MissingContent,
    InvalidUpload(String),
    Backend(BackendError),
}

impl From<BackendError> for ProblemError {
    fn from(e: BackendError) -> Self {
        ProblemError::Backend(e)
    }
}

impl From<UploadError> for ProblemError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Backend(inner) => ProblemError::Backend(inner),
            UploadError::MissingFile => ProblemError::InvalidUpload("No file in upload".to_string()),
            UploadError::InvalidForm(msg) => ProblemError::InvalidUpload(msg),
        }
    }
}

impl IntoResponse for ProblemError {
    fn into_response(self) -> Response {
        match self {
            ProblemError::MissingContent => {
                (StatusCode::BAD_REQUEST, "Problem content is required").into_response()
            }
            ProblemError::InvalidUpload(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid form data: {}", msg)).into_response()
            }
            ProblemError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_problems(
    backend: &Backend,
    progress: Option<i64>,
    page: Option<i64>,
) -> Result<ListPage<Problem>, BackendError> {
    let qs = query_string(&[
        ("progress", progress.map(|p| p.to_string())),
        ("page", page.map(|p| p.to_string())),
    ]);
    let value: Value = backend.get(&format!("/admin/problems/{}", qs)).await?;
    Ok(unwrap_list(value))
}

/// One call, many problems: the backend answers with the created records
/// in request order, ids assigned.
pub async fn bulk_create_problems(
    backend: &Backend,
    rows: &[NewProblem],
) -> Result<Vec<Problem>, BackendError> {
    backend.post("/admin/problems/bulk_create/", rows).await
}

pub async fn bulk_create_selects(
    backend: &Backend,
    rows: &[NewProblemSelect],
) -> Result<Vec<ProblemSelect>, BackendError> {
    backend
        .post("/admin/problem-selects/bulk_create/", rows)
        .await
}

async fn list_problems(
    State(state): State<AppState>,
    Query(query): Query<ListProblemsQuery>,
) -> Result<impl IntoResponse, ProblemError> {
    let page = fetch_problems(&state.backend, query.progress, query.page).await?;
    log::debug!("Found {} problems (count={})", page.items.len(), page.count);
    Ok(Json(page))
}

async fn get_problem(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ProblemError> {
    let problem: Problem = state
        .backend
        .get(&format!("/admin/problems/{}/", id))
        .await?;
    Ok(Json(problem))
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ProblemPayload {
    pub progress: i64,
    pub problem: String,
    pub answer: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

async fn create_problem(
    State(state): State<AppState>,
    Json(payload): Json<ProblemPayload>,
) -> Result<impl IntoResponse, ProblemError> {
    if payload.problem.trim().is_empty() {
        log::warn!("Attempted to create problem with empty content");
        return Err(ProblemError::MissingContent);
    }

    let created: Problem = state.backend.post("/admin/problems/", &payload).await?;
    log::info!("Created problem: id={}", created.id);

    let page = fetch_problems(&state.backend, Some(payload.progress), None).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

/// Multipart variant for problems with an attached image. Text fields
/// from the console form pass through as-is; the image file rides along
/// as a binary part.
async fn create_problem_with_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ProblemError> {
    let (fields, image) = collect_form(&mut multipart).await?;

    let content = fields
        .iter()
        .find(|(name, _)| name == "problem")
        .map(|(_, value)| value.trim())
        .unwrap_or_default();
    if content.is_empty() {
        log::warn!("Attempted to create problem (with image) without content");
        return Err(ProblemError::MissingContent);
    }
    let progress = fields
        .iter()
        .find(|(name, _)| name == "progress")
        .and_then(|(_, value)| value.parse::<i64>().ok());

    let form = backend_form(fields, "image", image)?;
    let created: Problem = state
        .backend
        .send_multipart(reqwest::Method::POST, "/admin/problems/", form)
        .await?;
    log::info!("Created problem with image: id={}", created.id);

    let page = fetch_problems(&state.backend, progress, None).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_problem(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProblemPayload>,
) -> Result<impl IntoResponse, ProblemError> {
    if payload.problem.trim().is_empty() {
        log::warn!("Attempted to update problem {} with empty content", id);
        return Err(ProblemError::MissingContent);
    }

    let _: Problem = state
        .backend
        .put(&format!("/admin/problems/{}/", id), &payload)
        .await?;
    log::info!("Updated problem: id={}", id);

    let page = fetch_problems(&state.backend, Some(payload.progress), None).await?;
    Ok(Json(page))
}

async fn update_problem_with_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ProblemError> {
    let (fields, image) = collect_form(&mut multipart).await?;
    let progress = fields
        .iter()
        .find(|(name, _)| name == "progress")
        .and_then(|(_, value)| value.parse::<i64>().ok());

    let form = backend_form(fields, "image", image)?;
    let _: Problem = state
        .backend
        .send_multipart(
            reqwest::Method::PUT,
            &format!("/admin/problems/{}/", id),
            form,
        )
        .await?;
    log::info!("Updated problem with image: id={}", id);

    let page = fetch_problems(&state.backend, progress, None).await?;
    Ok(Json(page))
}

/// Partial update; the body passes through untouched.
async fn patch_problem(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ProblemError> {
    let updated: Problem = state
        .backend
        .patch(&format!("/admin/problems/{}/", id), &payload)
        .await?;
    log::info!("Patched problem: id={}", id);
    Ok(Json(updated))
}

async fn delete_problem(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ProblemError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/problems/{}/", id))
        .await?;
    log::info!("Deleted problem: id={}", id);

    let page = fetch_problems(&state.backend, None, None).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/problems", get(list_problems).post(create_problem))
        .route("/problems/with-image", post(create_problem_with_image))
        .route(
            "/problems/:id",
            get(get_problem)
                .put(update_problem)
                .patch(patch_problem)
                .delete(delete_problem),
        )
        .route("/problems/:id/with-image", put(update_problem_with_image))
        .with_state(state)
}
