//! Terraria Panel - web control surface for a supervised Terraria server
//!
//! [`create_router`] serves the control page, the `/cmd` endpoint, the live
//! console WebSocket and the status endpoints over an [`AppState`]. The
//! `panel` binary builds that state from `config.toml`, picks a Discord or log
//! notifier, and starts the server through `terraria_pty`.

pub mod config;
pub mod console;
pub mod discord;
pub mod handlers;
#[cfg(all(test, unix))]
mod test_helpers;

pub use console::ConsoleBroadcast;
pub use discord::DiscordNotifier;

use axum::{
    Router,
    routing::{get, post},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use terraria_pty::{Notifier, TerrariaPty};

#[derive(Clone)]
pub struct AppState {
    pub pty: Arc<TerrariaPty>,
    pub notifier: Arc<dyn Notifier>,
    pub console: Arc<ConsoleBroadcast>,
    /// Title of the control page
    pub header: Arc<str>,
}

/// Tags each HTTP request span with a fresh id
#[derive(Clone)]
pub struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn create_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/", get(handlers::index_handler))
        .route("/cmd", post(handlers::command_handler))
        .route("/console", get(handlers::console_ws_handler))
        .route("/api/status", get(handlers::status_handler))
        .route("/health", get(handlers::health_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
