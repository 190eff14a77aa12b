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
pub struct Inquiry {
    pub id: i64,
    #[serde(default)]
    pub user: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub replied_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct ListInquiriesQuery {
    #[serde(default)]
    page: Option<i64>,
}

#[derive(Deserialize)]
pub struct ReplyPayload {
    reply: String,
}

pub enum InquiryError {
    MissingReply,
    Backend(BackendError),
}

impl From<BackendError> for InquiryError {
    fn from(e: BackendError) -> Self {
        InquiryError::Backend(e)
    }
}

impl IntoResponse for InquiryError {
    fn into_response(self) -> Response {
        match self {
            InquiryError::MissingReply => {
                (StatusCode::BAD_REQUEST, "Reply text is required").into_response()
            }
            InquiryError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_inquiries(
    backend: &Backend,
    page: Option<i64>,
) -> Result<ListPage<Inquiry>, BackendError> {
    let qs = query_string(&[("page", page.map(|p| p.to_string()))]);
    let value: Value = backend.get(&format!("/admin/inquiries/{}", qs)).await?;
    Ok(unwrap_list(value))
}

async fn list_inquiries(
    State(state): State<AppState>,
    Query(query): Query<ListInquiriesQuery>,
) -> Result<impl IntoResponse, InquiryError> {
    let page = fetch_inquiries(&state.backend, query.page).await?;
    log::debug!("Found {} inquiries (count={})", page.items.len(), page.count);
    Ok(Json(page))
}

async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, InquiryError> {
    let inquiry: Inquiry = state
        .backend
        .get(&format!("/admin/inquiries/{}/", id))
        .await?;
    Ok(Json(inquiry))
}

async fn reply_inquiry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ReplyPayload>,
) -> Result<impl IntoResponse, InquiryError> {
    if payload.reply.trim().is_empty() {
        log::warn!("Attempted to save empty reply for inquiry {}", id);
        return Err(InquiryError::MissingReply);
    }

    let _: Inquiry = state
        .backend
        .patch(
            &format!("/admin/inquiries/{}/", id),
            &json!({"reply": payload.reply}),
        )
        .await?;
    log::info!("Replied to inquiry: id={}", id);

    let page = fetch_inquiries(&state.backend, None).await?;
    Ok(Json(page))
}

async fn delete_inquiry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, InquiryError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/inquiries/{}/", id))
        .await?;
    log::info!("Deleted inquiry: id={}", id);

    let page = fetch_inquiries(&state.backend, None).await?;
    Ok(Json(page))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/inquiries", get(list_inquiries))
        .route(
            "/inquiries/:id",
            get(get_inquiry).delete(delete_inquiry),
        )
        .route("/inquiries/:id/reply", patch(reply_inquiry))
        .with_state(state)
}
