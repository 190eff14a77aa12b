use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{query_string, AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct PrepareMajor {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub prepare_major: Option<i64>,
    #[serde(default)]
    pub prepare_major_details: Option<PrepareMajor>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub date_joined: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct UserPayload {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub prepare_major: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    search: Option<String>,
}

pub enum UserError {
    MissingUsername,
    Backend(BackendError),
}

impl From<BackendError> for UserError {
    fn from(e: BackendError) -> Self {
        UserError::Backend(e)
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        match self {
            UserError::MissingUsername => {
                (StatusCode::BAD_REQUEST, "Username is required").into_response()
            }
            UserError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_users(
    backend: &Backend,
    page: Option<i64>,
    search: Option<&str>,
) -> Result<ListPage<User>, BackendError> {
    let qs = query_string(&[
        ("page", page.map(|p| p.to_string())),
        ("search", search.map(|s| s.to_string())),
    ]);
    let value: Value = backend.get(&format!("/admin/users/{}", qs)).await?;
    Ok(unwrap_list(value))
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, UserError> {
    let page = fetch_users(&state.backend, query.page, query.search.as_deref()).await?;
    log::debug!("Found {} users (count={})", page.items.len(), page.count);
    Ok(Json(page))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, UserError> {
    let user: User = state.backend.get(&format!("/admin/users/{}/", id)).await?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> Result<impl IntoResponse, UserError> {
    if payload.username.trim().is_empty() {
        log::warn!("Attempted to create user with empty username");
        return Err(UserError::MissingUsername);
    }

    let created: User = state.backend.post("/admin/users/", &payload).await?;
    log::info!("Created user: id={}, username={}", created.id, created.username);

    let page = fetch_users(&state.backend, None, None).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserPayload>,
) -> Result<impl IntoResponse, UserError> {
    if payload.username.trim().is_empty() {
        log::warn!("Attempted to update user {} with empty username", id);
        return Err(UserError::MissingUsername);
    }

    let _: User = state
        .backend
        .put(&format!("/admin/users/{}/", id), &payload)
        .await?;
    log::info!("Updated user: id={}", id);

    let page = fetch_users(&state.backend, None, None).await?;
    Ok(Json(page))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, UserError> {
    let _: Empty = state.backend.delete(&format!("/admin/users/{}/", id)).await?;
    log::info!("Deleted user: id={}", id);

    let page = fetch_users(&state.backend, None, None).await?;
    Ok(Json(page))
}

/// Reference list for the user form's target-major dropdown.
async fn list_prepare_majors(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, UserError> {
    let value: Value = state.backend.get("/admin/prepare-majors/").await?;
    let page: ListPage<PrepareMajor> = unwrap_list(value);
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/prepare-majors", get(list_prepare_majors))
        .with_state(state)
}
