//! Kasipedia web server.
//!
//! Serves the embedded homepage UI, the content API the page populates
//! itself from, and the WebSocket voice bridge. Uses `rust-embed` to bake
//! the `ui/` directory into the binary; in debug mode (`debug-embed`
//! feature) files are read from disk so you can edit the page and refresh.

pub mod voice;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use rust_embed::Embed;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kasipedia_content::ContentClient;
use kasipedia_core::config::Config;
use kasipedia_core::error::Result as KasipediaResult;
use kasipedia_core::types::HomepageData;

pub struct AppState {
    pub config: Config,
    pub content: ContentClient,
}

#[derive(Embed)]
#[folder = "ui/"]
struct UiAssets;

/// Reply for `/api/homepage`: either a full model or a bare error flag —
/// never a partial model. The client re-triggers on error; there is no
/// automatic retry.
#[derive(Debug, Serialize)]
pub struct HomepageReply {
    pub error: bool,
    pub data: Option<HomepageData>,
}

impl HomepageReply {
    pub fn from_result(result: KasipediaResult<HomepageData>) -> Self {
        match result {
            Ok(data) => Self {
                error: false,
                data: Some(data),
            },
            Err(e) => {
                warn!(error = %e, "homepage content fetch failed");
                Self {
                    error: true,
                    data: None,
                }
            }
        }
    }
}

/// Start the server and block until shutdown.
pub async fn start_server(config: Config, bind: &str, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        config,
        content: ContentClient::default(),
    });

    // API and WebSocket routes are registered first so they take priority
    // over the UI catch-all.
    let app = Router::new()
        .route("/api/homepage", get(homepage_handler))
        .route("/ws/voice", get(voice::ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .merge(ui_router())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Kasipedia listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn homepage_handler(State(state): State<Arc<AppState>>) -> Json<HomepageReply> {
    Json(HomepageReply::from_result(
        state.content.fetch_homepage(&state.config).await,
    ))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build a router that serves the embedded homepage assets.
pub fn ui_router() -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/{*path}", get(static_handler))
}

async fn index_handler() -> impl IntoResponse {
    serve_file("index.html")
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    serve_file(&path)
}

fn serve_file(path: &str) -> Response {
    match UiAssets::get(path) {
        Some(asset) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref())],
                asset.data.into_owned(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, Html("<h1>404</h1>")).into_response(),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to install CTRL+C handler");
        return;
    }
    info!("Shutdown signal received");
}
