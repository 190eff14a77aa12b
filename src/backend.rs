use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::{multipart::Form, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::auth::TokenStore;
use crate::db::DbPool;

/// Shared state handed to every console route.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub backend: Backend,
}

/// The canonical empty JSON payload. Backend endpoints that answer 204 or a
/// blank body resolve to this instead of failing.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Empty {}

#[derive(Debug)]
pub enum BackendError {
    AuthExpired,
    Http { status: u16, message: String },
    Network(String),
    LocalStore(#[allow(dead_code)] sqlx::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendError::AuthExpired => write!(f, "Session expired"),
            BackendError::Http { status, message } => {
                write!(f, "Backend error ({}): {}", status, message)
            }
            BackendError::Network(msg) => write!(f, "Network error: {}", msg),
            BackendError::LocalStore(_) => write!(f, "Local store error"),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Network(e.to_string())
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        BackendError::LocalStore(e)
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        match self {
            BackendError::AuthExpired => (
                StatusCode::UNAUTHORIZED,
                "Session expired, please log in again",
            )
                .into_response(),
            BackendError::Http { status, message } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
            )
                .into_response(),
            BackendError::Network(msg) => {
                (StatusCode::BAD_GATEWAY, format!("Network error: {}", msg)).into_response()
            }
            BackendError::LocalStore(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Local store error").into_response()
            }
        }
    }
}

/// Picks the most useful error message out of a backend failure body.
/// Priority: `detail`, then `error`, then the body itself, then the status.
fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error"] {
            if let Some(field) = value.get(key) {
                return match field.as_str() {
                    Some(s) => s.to_string(),
                    None => field.to_string(),
                };
            }
        }
        if !value.is_null() {
            return value.to_string();
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    format!("HTTP Error: {}", status)
}

/// Builds a query string from optional parameters; empty when none are set.
pub fn query_string(params: &[(&str, Option<String>)]) -> String {
    let encoded: Vec<String> = params
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();
    if encoded.is_empty() {
        String::new()
    } else {
        format!("?{}", encoded.join("&"))
    }
}

/// HTTP client for the remote platform backend. The bearer token is read
/// fresh from the injected store on every call; a 401 from the backend
/// clears it so the console shell falls back to the login screen. No
/// retries, no timeouts, no token refresh.
#[derive(Clone)]
pub struct Backend {
    http: Client,
    base_url: String,
    tokens: TokenStore,
}

impl Backend {
    pub fn new(base_url: &str, tokens: TokenStore) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {}", method, url);

        let mut req = self.http.request(method, &url);
        if let Some(token) = self.tokens.get().await? {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        self.read_json(response, true).await
    }

    pub async fn get<T>(&self, path: &str) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
    {
        self.request::<T, Value>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Empty, BackendError> {
        self.request::<Empty, Value>(Method::DELETE, path, None)
            .await
    }

    /// Login is the one call made without a stored token; a 401 here means
    /// bad credentials, not an expired session, so it skips the clear-token
    /// policy.
    pub async fn post_no_auth<T, B>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {} (unauthenticated)", url);

        let response = self.http.post(&url).json(body).send().await?;
        self.read_json(response, false).await
    }

    /// Multipart escape hatch for image-bearing endpoints; the generic JSON
    /// path cannot carry binary parts. Shares the token injection, 401
    /// policy and error extraction with `request`.
    pub async fn send_multipart<T>(
        &self,
        method: Method,
        path: &str,
        form: Form,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {} (multipart)", method, url);

        let mut req = self.http.request(method, &url);
        if let Some(token) = self.tokens.get().await? {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let response = req.multipart(form).send().await?;
        self.read_json(response, true).await
    }

    async fn read_json<T>(
        &self,
        response: reqwest::Response,
        clear_token_on_401: bool,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Default,
    {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED && clear_token_on_401 {
            log::warn!("Backend returned 401, clearing stored session token");
            self.tokens.clear().await?;
            return Err(BackendError::AuthExpired);
        }

        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = extract_error_message(status.as_u16(), &text);
            log::warn!("Backend request failed ({}): {}", status, message);
            return Err(BackendError::Http {
                status: status.as_u16(),
                message,
            });
        }

        // Absence of content is not an error: 204s and blank bodies come
        // back from deletes and some updates.
        if status == reqwest::StatusCode::NO_CONTENT || text.is_empty() {
            return Ok(T::default());
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("Unparsable backend response body, treating as empty: {}", e);
                Ok(T::default())
            }
        }
    }
}
