use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};
use crate::uploads::{backend_form, collect_form, UploadError};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_important: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct NoticePayload {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
}

pub enum NoticeError {
    MissingTitle,
    InvalidUpload(String),
    Backend(BackendError),
}

impl From<BackendError> for NoticeError {
    fn from(e: BackendError) -> Self {
        NoticeError::Backend(e)
    }
}

impl From<UploadError> for NoticeError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Backend(inner) => NoticeError::Backend(inner),
            UploadError::MissingFile => NoticeError::InvalidUpload("No file in upload".to_string()),
            UploadError::InvalidForm(msg) => NoticeError::InvalidUpload(msg),
        }
    }
}

impl IntoResponse for NoticeError {
    fn into_response(self) -> Response {
        match self {
            NoticeError::MissingTitle => {
                (StatusCode::BAD_REQUEST, "Notice title is required").into_response()
            }
            NoticeError::InvalidUpload(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid form data: {}", msg)).into_response()
            }
            NoticeError::Backend(e) => e.into_response(),
        }
    }
}

/// Notices are the one endpoint that wraps its rows in `{data: [...]}`;
/// the normalizer smooths that over.
pub async fn fetch_notices(backend: &Backend) -> Result<ListPage<Notice>, BackendError> {
    let value: Value = backend.get("/admin/notices/").await?;
    Ok(unwrap_list(value))
}

async fn list_notices(State(state): State<AppState>) -> Result<impl IntoResponse, NoticeError> {
    let page = fetch_notices(&state.backend).await?;
    log::debug!("Found {} notices", page.items.len());
    Ok(Json(page))
}

async fn get_notice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, NoticeError> {
    let notice: Notice = state.backend.get(&format!("/admin/notices/{}/", id)).await?;
    Ok(Json(notice))
}

async fn create_notice(
    State(state): State<AppState>,
    Json(payload): Json<NoticePayload>,
) -> Result<impl IntoResponse, NoticeError> {
    if payload.title.trim().is_empty() {
        log::warn!("Attempted to create notice with empty title");
        return Err(NoticeError::MissingTitle);
    }

    let created: Notice = state.backend.post("/admin/notices/", &payload).await?;
    log::info!("Created notice: id={}, title={}", created.id, created.title);

    let page = fetch_notices(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn create_notice_with_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, NoticeError> {
    let (fields, image) = collect_form(&mut multipart).await?;

    let title = fields
        .iter()
        .find(|(name, _)| name == "title")
        .map(|(_, value)| value.trim())
        .unwrap_or_default();
    if title.is_empty() {
        log::warn!("Attempted to create notice (with image) without title");
        return Err(NoticeError::MissingTitle);
    }

    let form = backend_form(fields, "image", image)?;
    let created: Notice = state
        .backend
        .send_multipart(reqwest::Method::POST, "/admin/notices/", form)
        .await?;
    log::info!("Created notice with image: id={}", created.id);

    let page = fetch_notices(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_notice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<NoticePayload>,
) -> Result<impl IntoResponse, NoticeError> {
    if payload.title.trim().is_empty() {
        log::warn!("Attempted to update notice {} with empty title", id);
        return Err(NoticeError::MissingTitle);
    }

    let _: Notice = state
        .backend
        .put(&format!("/admin/notices/{}/", id), &payload)
        .await?;
    log::info!("Updated notice: id={}", id);

    let page = fetch_notices(&state.backend).await?;
    Ok(Json(page))
}

async fn update_notice_with_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, NoticeError> {
    let (fields, image) = collect_form(&mut multipart).await?;

    let form = backend_form(fields, "image", image)?;
    let _: Notice = state
        .backend
        .send_multipart(
            reqwest::Method::PUT,
            &format!("/admin/notices/{}/", id),
            form,
        )
        .await?;
    log::info!("Updated notice with image: id={}", id);

    let page = fetch_notices(&state.backend).await?;
    Ok(Json(page))
}

async fn delete_notice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, NoticeError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/notices/{}/", id))
        .await?;
    log::info!("Deleted notice: id={}", id);

    let page = fetch_notices(&state.backend).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/notices", get(list_notices).post(create_notice))
        .route("/notices/with-image", post(create_notice_with_image))
        .route(
            "/notices/:id",
            get(get_notice).put(update_notice).delete(delete_notice),
        )
        .route("/notices/:id/with-image", put(update_notice_with_image))
        .with_state(state)
}
