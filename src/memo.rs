use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{query_string, AppState, Backend, BackendError, Empty};
use crate::envelope::{unwrap_list, ListPage};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct MemoProgress {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default)]
    pub subject: Option<i64>,
    #[serde(default)]
    pub sequence: Option<i64>,
}

/// One memorization card inside a deck.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct MemoCard {
    pub id: i64,
    pub progress: i64,
    pub content: String,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub sequence: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct MemoProgressPayload {
    pub name: String,
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<i64>,
}

/// Draft card as the deck editor submits it. The `draft_id` is a
/// transient row key the screen invented for unsaved cards; it never
/// reaches the backend, which assigns all real ids.
#[derive(Deserialize, Clone)]
pub struct DraftCard {
    #[serde(default)]
    pub draft_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub sequence: Option<i64>,
}

#[derive(Serialize, Clone)]
struct NewMemoCard {
    progress: i64,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meaning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<i64>,
}

#[derive(Deserialize)]
pub struct BulkCardsPayload {
    pub progress: i64,
    pub cards: Vec<DraftCard>,
}

#[derive(Deserialize)]
pub struct ListCardsQuery {
    progress: i64,
}

pub enum MemoError {
    MissingName,
    EmptyCardContent,
    Backend(BackendError),
}

impl From<BackendError> for MemoError {
    fn from(e: BackendError) -> Self {
        MemoError::Backend(e)
    }
}

impl IntoResponse for MemoError {
    fn into_response(self) -> Response {
        match self {
            MemoError::MissingName => {
                (StatusCode::BAD_REQUEST, "Deck name is required").into_response()
            }
            MemoError::EmptyCardContent => {
                (StatusCode::BAD_REQUEST, "Card content is required").into_response()
            }
            MemoError::Backend(e) => e.into_response(),
        }
    }
}

pub async fn fetch_memo_progresses(
    backend: &Backend,
) -> Result<ListPage<MemoProgress>, BackendError> {
    let value: Value = backend.get("/admin/memo-progresses/").await?;
    Ok(unwrap_list(value))
}

pub async fn fetch_cards(
    backend: &Backend,
    progress: i64,
) -> Result<ListPage<MemoCard>, BackendError> {
    let qs = query_string(&[("progress", Some(progress.to_string()))]);
    let value: Value = backend.get(&format!("/admin/memo-problems/{}", qs)).await?;
    Ok(unwrap_list(value))
}

async fn list_memo_progresses(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, MemoError> {
    let page = fetch_memo_progresses(&state.backend).await?;
    log::debug!("Found {} memo decks", page.items.len());
    Ok(Json(page))
}

async fn create_memo_progress(
    State(state): State<AppState>,
    Json(payload): Json<MemoProgressPayload>,
) -> Result<impl IntoResponse, MemoError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to create memo deck with empty name");
        return Err(MemoError::MissingName);
    }

    let created: MemoProgress = state
        .backend
        .post("/admin/memo-progresses/", &payload)
        .await?;
    log::info!("Created memo deck: id={}, name={}", created.id, created.name);

    let page = fetch_memo_progresses(&state.backend).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn update_memo_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<MemoProgressPayload>,
) -> Result<impl IntoResponse, MemoError> {
    if payload.name.trim().is_empty() {
        log::warn!("Attempted to update memo deck {} with empty name", id);
        return Err(MemoError::MissingName);
    }

    let _: MemoProgress = state
        .backend
        .put(&format!("/admin/memo-progresses/{}/", id), &payload)
        .await?;
    log::info!("Updated memo deck: id={}", id);

    let page = fetch_memo_progresses(&state.backend).await?;
    Ok(Json(page))
}

async fn delete_memo_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, MemoError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/memo-progresses/{}/", id))
        .await?;
    log::info!("Deleted memo deck: id={}", id);

    let page = fetch_memo_progresses(&state.backend).await?;
    Ok(Json(page))
}

async fn list_cards(
    State(state): State<AppState>,
    Query(query): Query<ListCardsQuery>,
) -> Result<impl IntoResponse, MemoError> {
    let page = fetch_cards(&state.backend, query.progress).await?;
    log::debug!(
        "Found {} cards for deck {}",
        page.items.len(),
        query.progress
    );
    Ok(Json(page))
}

/// Saves the deck editor's draft rows in one bulk call, dropping draft
/// row keys and blank cards on the way out.
async fn bulk_create_cards(
    State(state): State<AppState>,
    Json(payload): Json<BulkCardsPayload>,
) -> Result<impl IntoResponse, MemoError> {
    let rows: Vec<NewMemoCard> = payload
        .cards
        .into_iter()
        .filter(|card| !card.content.trim().is_empty())
        .map(|card| NewMemoCard {
            progress: payload.progress,
            content: card.content,
            meaning: card.meaning,
            sequence: card.sequence,
        })
        .collect();

    if rows.is_empty() {
        log::warn!("Bulk card save with no usable rows");
        return Err(MemoError::EmptyCardContent);
    }

    let created: Vec<MemoCard> = state
        .backend
        .post("/admin/memo-problems/bulk_create/", &rows)
        .await?;
    log::info!(
        "Bulk-created {} cards for deck {}",
        created.len(),
        payload.progress
    );

    let page = fetch_cards(&state.backend, payload.progress).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn delete_card(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, MemoError> {
    let _: Empty = state
        .backend
        .delete(&format!("/admin/memo-problems/{}/", id))
        .await?;
    log::info!("Deleted card: id={}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/memo/progresses",
            get(list_memo_progresses).post(create_memo_progress),
        )
        .route(
            "/memo/progresses/:id",
            put(update_memo_progress).delete(delete_memo_progress),
        )
        .route("/memo/cards", get(list_cards))
        .route("/memo/cards/bulk", post(bulk_create_cards))
        .route("/memo/cards/:id", axum::routing::delete(delete_card))
        .with_state(state)
}
