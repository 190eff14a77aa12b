use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{AppState, BackendError};

/// A file pulled out of a console-side multipart submission, ready to be
/// forwarded to the backend.
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum UploadError {
    MissingFile,
    InvalidForm(String),
    Backend(BackendError),
}

impl From<BackendError> for UploadError {
    fn from(e: BackendError) -> Self {
        UploadError::Backend(e)
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::MissingFile => {
                (StatusCode::BAD_REQUEST, "No file in upload").into_response()
            }
            UploadError::InvalidForm(msg) => {
                (StatusCode::BAD_REQUEST, format!("Invalid form data: {}", msg)).into_response()
            }
            UploadError::Backend(e) => e.into_response(),
        }
    }
}

/// Drains a console-side multipart form into plain text fields plus at
/// most one file. Fields arrive in submission order; later duplicates
/// overwrite earlier ones the way form encoding usually resolves them.
pub async fn collect_form(
    multipart: &mut Multipart,
) -> Result<(Vec<(String, String)>, Option<UploadedFile>), UploadError> {
    let mut fields = Vec::new();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::InvalidForm(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name() {
            let file_name = file_name.to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| UploadError::InvalidForm(e.to_string()))?;
            file = Some(UploadedFile {
                name: file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| UploadError::InvalidForm(e.to_string()))?;
            fields.push((name, value));
        }
    }

    Ok((fields, file))
}

/// Builds the multipart body for an image-bearing backend endpoint:
/// every non-empty text field is stringified and appended, the file (if
/// any) goes in as a binary part under `part_name`.
pub fn backend_form(
    fields: Vec<(String, String)>,
    part_name: &str,
    file: Option<UploadedFile>,
) -> Result<Form, UploadError> {
    let mut form = Form::new();
    for (name, value) in fields {
        if !value.is_empty() {
            form = form.text(name, value);
        }
    }
    if let Some(file) = file {
        let part = Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.content_type)
            .map_err(|e| UploadError::InvalidForm(e.to_string()))?;
        form = form.part(part_name.to_string(), part);
    }
    Ok(form)
}

#[derive(Deserialize)]
struct DeleteImagePayload {
    image_url: String,
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UploadError> {
    let (fields, file) = collect_form(&mut multipart).await?;
    let file = file.ok_or(UploadError::MissingFile)?;

    log::info!("Forwarding upload: {} ({} bytes)", file.name, file.bytes.len());
    let form = backend_form(fields, "file", Some(file))?;
    let result: Value = state
        .backend
        .send_multipart(reqwest::Method::POST, "/admin/upload/", form)
        .await?;

    Ok(Json(result))
}

async fn delete_image(
    State(state): State<AppState>,
    Json(payload): Json<DeleteImagePayload>,
) -> Result<impl IntoResponse, UploadError> {
    log::info!("Deleting uploaded image: {}", payload.image_url);
    let result: Value = state
        .backend
        .post(
            "/admin/upload/delete-image/",
            &json!({"image_url": payload.image_url}),
        )
        .await?;

    Ok(Json(result))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/uploads", post(upload_file))
        .route("/uploads/delete", post(delete_image))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::backend::Backend;
    use crate::db;
    use axum_test::multipart::{MultipartForm, Part as TestPart};
    use axum_test::TestServer;
    use httpmock::MockServer;

    async fn test_state(server: &MockServer) -> AppState {
        let pool = db::create_test_pool().await;
        let backend = Backend::new(&server.base_url(), TokenStore::new(pool.clone()));
        AppState { pool, backend }
    }

    #[tokio::test]
    async fn test_upload_forwards_file_to_backend() {
        let mock_backend = MockServer::start_async().await;
        let mock = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/upload/")
                .body_includes("banner-bytes");
            then.status(200)
                .json_body(json!({"url": "http://cdn/banner.png"}));
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let form = MultipartForm::new().add_part(
            "file",
            TestPart::bytes("banner-bytes".as_bytes().to_vec())
                .file_name("banner.png")
                .mime_type("image/png"),
        );
        let response = server.post("/uploads").multipart(form).await;

        response.assert_status(StatusCode::OK);
        mock.assert();
        let body: Value = response.json();
        assert_eq!(body["url"], json!("http://cdn/banner.png"));
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let mock_backend = MockServer::start_async().await;
        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let form = MultipartForm::new().add_text("note", "no file here");
        let response = server.post("/uploads").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_image_forwards_url() {
        let mock_backend = MockServer::start_async().await;
        let mock = mock_backend.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/admin/upload/delete-image/")
                .json_body(json!({"image_url": "http://cdn/old.png"}));
            then.status(204);
        });

        let state = test_state(&mock_backend).await;
        let server = TestServer::new(routes(state)).unwrap();

        let response = server
            .post("/uploads/delete")
            .json(&json!({"image_url": "http://cdn/old.png"}))
            .await;

        response.assert_status(StatusCode::OK);
        mock.assert();
    }

    #[test]
    fn test_backend_form_skips_empty_fields() {
        // Form offers no inspection API, so this only checks it builds.
        let form = backend_form(
            vec![
                ("title".to_string(), "공지".to_string()),
                ("content".to_string(), String::new()),
            ],
            "image",
            None,
        )
        .unwrap();
        drop(form);
    }
}
