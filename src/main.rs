mod auth;
mod backend;
mod db;
mod envelope;
mod imports;
mod inquiries;
mod memo;
mod notices;
mod popups;
mod problems;
mod progresses;
mod questions;
mod subjects;
mod uploads;
mod users;

use axum::{
    body::Body,
    extract::Path,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use dotenvy::dotenv;
use rust_embed::RustEmbed;
use sailfish::TemplateOnce;
use std::env;
use tokio::net::TcpListener;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::auth::TokenStore;
use crate::backend::{AppState, Backend};

#[derive(TemplateOnce)]
#[template(path = "index.stpl")]
struct IndexTemplate {
    api_base_url: String,
}

#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

async fn index() -> Html<String> {
    let ctx = IndexTemplate {
        api_base_url: api_base_url(),
    };
    Html(ctx.render_once().unwrap())
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_str(mime.as_ref()).unwrap(),
                )],
                Body::from(content.data),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}

fn api_base_url() -> String {
    env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

#[tokio::main]
async fn main() {
    // File appender: rotate daily, store in ./logs
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("mds-admin")
        .filename_suffix("log")
        .build("./logs")
        .expect("failed to initialize rolling file appender");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Console layer
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()));

    // File layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()));

    // Register subscriber
    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    let version = env!("CARGO_PKG_VERSION");
    log::info!("mds-admin v{} starting up...", version);

    // Load .env if it exists
    if dotenv().ok().is_some() {
        log::info!("Loaded environment variables from .env");
    }

    log::info!("Initializing local store...");
    let pool = db::create_pool()
        .await
        .expect("Failed to create database pool");

    let base_url = api_base_url();
    log::info!("Remote backend: {}", base_url);
    let backend = Backend::new(&base_url, TokenStore::new(pool.clone()));
    let state = AppState {
        pool: pool.clone(),
        backend,
    };

    let app = Router::new()
        .route("/", get(index))
        .nest(
            "/api",
            auth::routes(state.clone())
                .merge(users::routes(state.clone()))
                .merge(subjects::routes(state.clone()))
                .merge(progresses::routes(state.clone()))
                .merge(problems::routes(state.clone()))
                .merge(memo::routes(state.clone()))
                .merge(notices::routes(state.clone()))
                .merge(popups::routes(state.clone()))
                .merge(questions::routes(state.clone()))
                .merge(inquiries::routes(state.clone()))
                .merge(imports::routes(state.clone()))
                .merge(uploads::routes(state)),
        )
        .route("/static/*path", get(static_handler));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&addr).await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    log::info!("──────────────────────────────────────────────────");
    log::info!("🚀 Console is ready");
    log::info!("📡 Local:   http://localhost:{}", local_addr.port());
    log::info!("🏫 Backend: {}", base_url);
    log::info!("──────────────────────────────────────────────────");

    axum::serve(listener, app).await.unwrap();
}
