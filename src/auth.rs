use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{AppState, BackendError};
use crate::db::DbPool;

/// Persisted bearer token for the remote backend, stored in the
/// single-row `auth_session` table. Read fresh on every backend call,
/// written once at login, cleared on logout or when the backend answers
/// 401.
#[derive(Clone)]
pub struct TokenStore {
    pool: DbPool,
}

impl TokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT token FROM auth_session WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(token,)| token))
    }

    pub async fn set(&self, token: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE auth_session SET token = ?, saved_at = CURRENT_TIMESTAMP WHERE id = 1",
        )
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE auth_session SET token = NULL WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// When the current token was stored; None without a live session.
    pub async fn saved_at(&self) -> Result<Option<NaiveDateTime>, sqlx::Error> {
        let row: Option<(Option<NaiveDateTime>,)> = sqlx::query_as(
            "SELECT saved_at FROM auth_session WHERE id = 1 AND token IS NOT NULL",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|(saved_at,)| saved_at))
    }
}

#[derive(Deserialize, Clone)]
pub struct LoginPayload {
    username: String,
    password: String,
}

/// The login endpoint has answered with three different token key names
/// over time; accept any of them.
#[derive(Deserialize, Default)]
struct LoginResponse {
    access: Option<String>,
    access_token: Option<String>,
    token: Option<String>,
}

impl LoginResponse {
    fn into_token(self) -> Option<String> {
        self.access.or(self.access_token).or(self.token)
    }
}

#[derive(Serialize)]
struct SessionStatus {
    logged_in: bool,
    saved_at: Option<NaiveDateTime>,
}

pub enum AuthError {
    MissingCredentials,
    NoTokenInResponse,
    Backend(BackendError),
    Store(#[allow(dead_code)] sqlx::Error),
}

impl From<BackendError> for AuthError {
    fn from(e: BackendError) -> Self {
        AuthError::Backend(e)
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Store(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::MissingCredentials => {
                (StatusCode::BAD_REQUEST, "Username and password are required").into_response()
            }
            AuthError::NoTokenInResponse => (
                StatusCode::BAD_GATEWAY,
                "Login response did not contain a token",
            )
                .into_response(),
            AuthError::Backend(e) => e.into_response(),
            AuthError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Local store error").into_response()
            }
        }
    }
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AuthError> {
    if payload.username.trim().is_empty() || payload.password.trim().is_empty() {
        log::warn!("Login attempted with blank credentials");
        return Err(AuthError::MissingCredentials);
    }

    log::info!("Logging in as {}", payload.username);
    let response: LoginResponse = state
        .backend
        .post_no_auth(
            "/admin/auth/login/",
            &json!({
                "username": payload.username.clone(),
                "password": payload.password.clone(),
            }),
        )
        .await?;

    let token = response.into_token().ok_or(AuthError::NoTokenInResponse)?;
    let store = TokenStore::new(state.pool.clone());
    store.set(&token).await?;

    log::info!("Login succeeded for {}", payload.username);
    Ok(Json(SessionStatus {
        logged_in: true,
        saved_at: store.saved_at().await?,
    }))
}

async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, AuthError> {
    TokenStore::new(state.pool.clone()).clear().await?;
    log::info!("Session token cleared");
    Ok(Json(SessionStatus {
        logged_in: false,
        saved_at: None,
    }))
}

async fn session(State(state): State<AppState>) -> Result<impl IntoResponse, AuthError> {
    let store = TokenStore::new(state.pool.clone());
    let token = store.get().await?;
    Ok(Json(SessionStatus {
        logged_in: token.is_some(),
        saved_at: store.saved_at().await?,
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", get(session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
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
    async fn test_login_accepts_access_key() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/admin/auth/login/");
            then.status(200).json_body(json!({"access": "tok-a"}));
        });

        let state = test_state(&mock_backend).await;
        let pool = state.pool.clone();
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/auth/login")
            .json(&json!({"username": "admin", "password": "pw"}))
            .await;

        response.assert_status(StatusCode::OK);
        let token = TokenStore::new(pool).get().await.unwrap();
        assert_eq!(token, Some("tok-a".to_string()));
    }

    #[tokio::test]
    async fn test_login_accepts_access_token_key() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/admin/auth/login/");
            then.status(200).json_body(json!({"access_token": "tok-b"}));
        });

        let state = test_state(&mock_backend).await;
        let pool = state.pool.clone();
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/auth/login")
            .json(&json!({"username": "admin", "password": "pw"}))
            .await;

        response.assert_status(StatusCode::OK);
        let token = TokenStore::new(pool).get().await.unwrap();
        assert_eq!(token, Some("tok-b".to_string()));
    }

    #[tokio::test]
    async fn test_login_accepts_token_key() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/admin/auth/login/");
            then.status(200).json_body(json!({"token": "tok-c"}));
        });

        let state = test_state(&mock_backend).await;
        let pool = state.pool.clone();
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/auth/login")
            .json(&json!({"username": "admin", "password": "pw"}))
            .await;

        response.assert_status(StatusCode::OK);
        let token = TokenStore::new(pool).get().await.unwrap();
        assert_eq!(token, Some("tok-c".to_string()));
    }

    #[tokio::test]
    async fn test_login_blank_credentials_rejected() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/auth/login")
            .json(&json!({"username": "  ", "password": ""}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_response_without_token_fails() {
        let mock_backend = MockServer::start_async().await;
        mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/admin/auth/login/");
            then.status(200).json_body(json!({"detail": "ok but no token"}));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/auth/login")
            .json(&json!({"username": "admin", "password": "pw"}))
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_logout_clears_token() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let pool = state.pool.clone();
        TokenStore::new(pool.clone()).set("live").await.unwrap();
        let server = TestServer::new(routes(state)).unwrap();

        let response = server.post("/auth/logout").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(TokenStore::new(pool).get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_reports_stored_token() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let pool = state.pool.clone();
        let server = TestServer::new(routes(state)).unwrap();

        let body: serde_json::Value = server.get("/auth/session").await.json();
        assert_eq!(body["logged_in"], json!(false));

        TokenStore::new(pool).set("live").await.unwrap();
        let body: serde_json::Value = server.get("/auth/session").await.json();
        assert_eq!(body["logged_in"], json!(true));
    }
}
