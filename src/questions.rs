use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{query_string, AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Question {
    pub id: i64,
    #[serde(default)]
    pub user: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub answered_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuestionsQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    search: Option<String>,
}

#[derive(Deserialize)]
pub struct AnswerPayload {
    answer: String,
}

pub enum QuestionError {
    MissingAnswer,
    Backend(BackendError),
}

impl From<BackendError> for QuestionError {
    fn from(e: BackendError) -> Self {
        QuestionError::Backend(e)
    }
}

impl IntoResponse for QuestionError {
    fn into_response(self) -> Response {
        match self {
            QuestionError::MissingAnswer => {
                (StatusCode::BAD_REQUEST, "Answer text is required").into_response()
            }
            QuestionError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_questions(
    backend: &Backend,
    page: Option<i64>,
    search: Option<&str>,
) -> Result<ListPage<Question>, BackendError> {
    let qs = query_string(&[
        ("page", page.map(|p| p.to_string())),
        ("search", search.map(|s| s.to_string())),
    ]);
    let value: Value = backend.get(&format!("/admin/questions/{}", qs)).await?;
    Ok(unwrap_list(value))
}

async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse, QuestionError> {
    let page = fetch_questions(&state.backend, query.page, query.search.as_deref()).await?;
    log::debug!("Found {} questions (count={})", page.items.len(), page.count);
    Ok(Json(page))
}

async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, QuestionError> {
    let question: Question = state
        .backend
        .get(&format!("/admin/questions/{}/", id))
        .await?;
    Ok(Json(question))
}

/// Inline answer save from the Q&A screen.
async fn answer_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AnswerPayload>,
) -> Result<impl IntoResponse, QuestionError> {
    if payload.answer.trim().is_empty() {
        log::warn!("Attempted to save empty answer for question {}", id);
        return Err(QuestionError::MissingAnswer);
    }

    let _: Question = state
        .backend
        .patch(
            &format!("/admin/questions/{}/", id),
            &json!({"answer": payload.answer}),
        )
        .await?;
    log::info!("Answered question: id={}", id);

    let page = fetch_questions(&state.backend, None, None).await?;
    Ok(Json(page))
}

async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, QuestionError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/questions/{}/", id))
        .await?;
    log::info!("Deleted question: id={}", id);

    let page = fetch_questions(&state.backend, None, None).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/questions", get(list_questions))
        .route(
            "/questions/:id",
            get(get_question).delete(delete_question),
        )
        .route("/questions/:id/answer", patch(answer_question))
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
    async fn test_answer_patches_and_refetches() {
        let mock_backend = MockServer::start_async().await;
        let patch_mock = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path("/admin/questions/8/")
                .json_body(json!({"answer": "기출 문제집 3장을 참고하세요."}));
            then.status(200).json_body(json!({
                "id": 8, "title": "순환계 질문", "answer": "기출 문제집 3장을 참고하세요."
            }));
        });
        let list_mock = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/admin/questions/");
            then.status(200).json_body(json!({
                "count": 1, "next": null, "previous": null,
                "results": [{
                    "id": 8, "title": "순환계 질문",
                    "answer": "기출 문제집 3장을 참고하세요."
                }]
            }));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .patch("/questions/8/answer")
            .json(&json!({"answer": "기출 문제집 3장을 참고하세요."}))
            .await;

        response.assert_status(StatusCode::OK);
        patch_mock.assert();
        list_mock.assert();
        let page: ListPage<Question> = response.json();
        assert!(page.items[0].answer.is_some());
    }

    #[tokio::test]
    async fn test_empty_answer_rejected() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .patch("/questions/8/answer")
            .json(&json!({"answer": "   "}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
