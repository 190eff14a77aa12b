use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sequence: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct SubjectPayload {
    pub name: String,
    #[serde(default)]
    pub sequence: Option<i64>,
}

pub enum SubjectError {
    MissingName,
    Backend(BackendError),
}

impl From<BackendError> for SubjectError {
    fn from(e: BackendError) -> Self {
        SubjectError::Backend(e)
    }
}

impl IntoResponse for SubjectError {
    fn into_response(self) -> Response {
        match self {
            SubjectError::MissingName => {
                (StatusCode::BAD_REQUEST, "Subject name is required").into_response()
            }
            SubjectError::Backend(e) => e.into_response(),
        }
    }
}

/// Subject list comes back as a bare array on this endpoint.
pub async fn fetch_subjects(backend: &Backend) -> Result<ListPage<Subject>, BackendError> {
    let value: Value = backend.get("/admin/subjects/").await?;
    Ok(unwrap_list(value))
}

async fn list_subjects(State(state): State<AppState>) -> Result<impl IntoResponse, SubjectError> {
    let page = fetch_subjects(&state.backend).await?;
    log::debug!("Found {} subjects", page.items.len());
    Ok(Json(page))
}

async fn create_subject(
    State(state): State<AppState>,
    Json(payload): Json<SubjectPayload>,
) -> Result<impl IntoResponse, SubjectError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to create subject with empty name");
        return Err(SubjectError::MissingName);
    }

    let created: Subject = state.backend.post("/admin/subjects/", &payload).await?;
    log::info!("Created subject: id={}, name={}", created.id, created.name);

    let page = fetch_subjects(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<SubjectPayload>,
) -> Result<impl IntoResponse, SubjectError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to update subject {} with empty name", id);
        return Err(SubjectError::MissingName);
    }

    let _: Subject = state
        .backend
        .put(&format!("/admin/subjects/{}/", id), &payload)
        .await?;
    log::info!("Updated subject: id={}", id);

    let page = fetch_subjects(&state.backend).await?;
    Ok(Json(page))
}

async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, SubjectError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/subjects/{}/", id))
        .await?;
    log::info!("Deleted subject: id={}", id);

    let page = fetch_subjects(&state.backend).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/subjects", get(list_subjects).post(create_subject))
        .route(
            "/subjects/:id",
            put(update_subject).delete(delete_subject),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::db;
    use axum_test::TestServer;
    use httpmock::MockServer;
    use serde_json::json;

    async fn test_state(server: &MockServer) -> AppState {
        let pool = db::create_test_pool().await;
        let backend = Backend::new(&server.base_url(), TokenStore::new(pool.clone()));
        AppState { pool, backend }
    }

    #[tokio::test]
    async fn test_list_subjects_bare_array() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([
                {"id": 1, "name": "해부학"},
                {"id": 2, "name": "생리학"}
            ]));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server.get("/subjects").await;

        response.assert_status(StatusCode::OK);
        let page: ListPage<Subject> = response.json();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.count, 2);
        assert_eq!(page.items[0].name, "해부학");
    }

    #[tokio::test]
    async fn test_create_subject_refetches_list() {
        let mock_backend = MockServer::start_async().await;
        let create = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/subjects/")
                .json_body(json!({"name": "약리학", "sequence": null}));
            then.status(201).json_body(json!({"id": 3, "name": "약리학"}));
        });
        let list = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([
                {"id": 1, "name": "해부학"},
                {"id": 3, "name": "약리학"}
            ]));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/subjects")
            .json(&json!({"name": "약리학"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        create.assert();
        list.assert();
        let page: ListPage<Subject> = response.json();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_create_subject_empty_name() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server.post("/subjects").json(&json!({"name": "  "})).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_subject_refetches_list() {
        let mock_backend = MockServer::start_async().await;
        let delete = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::DELETE).path("/admin/subjects/2/");
            then.status(204);
        });
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/subjects/");
            then.status(200).json_body(json!([{"id": 1, "name": "해부학"}]));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server.delete("/subjects/2").await;

        response.assert_status(StatusCode::OK);
        delete.assert();
        let page: ListPage<Subject> = response.json();
        assert_eq!(page.items.len(), 1);
    }
}
