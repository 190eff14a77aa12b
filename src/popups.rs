use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};
use crate::uploads::{backend_form, collect_form, UploadError};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Popup {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PopupPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ActivePayload {
    is_active: bool,
}

pub enum PopupError {
    MissingTitle,
    InvalidUpload(String),
    Backend(BackendError),
}

impl From<BackendError> for PopupError {
    fn from(e: BackendError) -> Self {
        PopupError::Backend(e)
    }
}

impl From<UploadError> for PopupError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Backend(inner) => PopupError::Backend(inner),
            UploadError::MissingFile => PopupError::InvalidUpload("No file in upload".to_string()),
            UploadError::InvalidForm(msg) => PopupError::InvalidUpload(msg),
        }
    }
}

impl IntoResponse for PopupError {
    fn into_response(self) -> Response {
        match self {
            PopupError::MissingTitle => {
                (StatusCode::BAD_REQUEST, "Popup title is required").into_response()
            }
            PopupError::InvalidUpload(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid form data: {}", msg)).into_response()
            }
            PopupError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_popups(backend: &Backend) -> Result<ListPage<Popup>, BackendError> {
    let value: Value = backend.get("/admin/popups/").await?;
    Ok(unwrap_list(value))
}

async fn list_popups(State(state): State<AppState>) -> Result<impl IntoResponse, PopupError> {
    let page = fetch_popups(&state.backend).await?;
    log::debug!("Found {} popups", page.items.len());
    Ok(Json(page))
}

async fn create_popup(
    State(state): State<AppState>,
    Json(payload): Json<PopupPayload>,
) -> Result<impl IntoResponse, PopupError> {
    if payload.title.trim().is_empty() {
        log::warn!("Attempted to create popup with empty title");
        return Err(PopupError::MissingTitle);
    }

    let created: Popup = state.backend.post("/admin/popups/", &payload).await?;
    log::info!("Created popup: id={}, title={}", created.id, created.title);

    let page = fetch_popups(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn create_popup_with_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PopupError> {
    let (fields, image) = collect_form(&mut multipart).await?;

    let title = fields
        .iter()
        .find(|(name, _)| name == "title")
        .map(|(_, value)| value.trim())
        .unwrap_or_default();
    if title.is_empty() {
        log::warn!("Attempted to create popup (with image) without title");
        return Err(PopupError::MissingTitle);
    }

    let form = backend_form(fields, "image", image)?;
    let created: Popup = state
        .backend
        .send_multipart(reqwest::Method::POST, "/admin/popups/", form)
        .await?;
    log::info!("Created popup with image: id={}", created.id);

    let page = fetch_popups(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_popup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<PopupPayload>,
) -> Result<impl IntoResponse, PopupError> {
    if payload.title.trim().is_empty() {
        log::warn!("Attempted to update popup {} with empty title", id);
        return Err(PopupError::MissingTitle);
    }

    let _: Popup = state
        .backend
        .put(&format!("/admin/popups/{}/", id), &payload)
        .await?;
    log::info!("Updated popup: id={}", id);

    let page = fetch_popups(&state.backend).await?;
    Ok(Json(page))
}

async fn update_popup_with_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PopupError> {
    let (fields, image) = collect_form(&mut multipart).await?;

    let form = backend_form(fields, "image", image)?;
    let _: Popup = state
        .backend
        .send_multipart(
            reqwest::Method::PUT,
            &format!("/admin/popups/{}/", id),
            form,
        )
        .await?;
    log::info!("Updated popup with image: id={}", id);

    let page = fetch_popups(&state.backend).await?;
    Ok(Json(page))
}

async fn set_popup_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ActivePayload>,
) -> Result<impl IntoResponse, PopupError> {
    let _: Popup = state
        .backend
        .patch(
            &format!("/admin/popups/{}/", id),
            &json!({"is_active": payload.is_active}),
        )
        .await?;
    log::info!("Set popup {} active={}", id, payload.is_active);

    let page = fetch_popups(&state.backend).await?;
    Ok(Json(page))
}

async fn delete_popup(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, PopupError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/popups/{}/", id))
        .await?;
    log::info!("Deleted popup: id={}", id);

    let page = fetch_popups(&state.backend).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/popups", get(list_popups).post(create_popup))
        .route("/popups/with-image", post(create_popup_with_image))
        .route("/popups/:id", put(update_popup).delete(delete_popup))
        .route("/popups/:id/with-image", put(update_popup_with_image))
        .route("/popups/:id/active", patch(set_popup_active))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::db;
    use axum_test::TestServer;
    use httpmock::MockServer;

    async fn test_state(server: &MockServer) -> AppState {
        let pool = db::create_test_pool().await;
        let backend = Backend::new(&server.base_url(), TokenStore::new(pool.clone()));
        AppState { pool, backend }
    }

    #[tokio::test]
    async fn test_toggle_popup_active_patches_backend() {
        let mock_backend = MockServer::start_async().await;
        let patch_mock = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path("/admin/popups/3/")
                .json_body(json!({"is_active": false}));
            then.status(200).json_body(json!({
                "id": 3, "title": "여름 이벤트", "is_active": false
            }));
        });
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/popups/");
            then.status(200).json_body(json!({
                "count": 1, "next": null, "previous": null,
                "results": [{"id": 3, "title": "여름 이벤트", "is_active": false}]
            }));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .patch("/popups/3/active")
            .json(&json!({"is_active": false}))
            .await;

        response.assert_status(StatusCode::OK);
        patch_mock.assert();
        let page: ListPage<Popup> = response.json();
        assert!(!page.items[0].is_active);
    }

    #[tokio::test]
    async fn test_create_popup_requires_title() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server.post("/popups").json(&json!({"title": " "})).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
