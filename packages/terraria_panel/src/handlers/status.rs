use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PlayerView {
    pub name: String,
    pub address: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub pid: Option<u32>,
    pub generation: u64,
    pub command_line: String,
    pub console_viewers: usize,
    pub players: Vec<PlayerView>,
}

/// Supervisor state and who is online
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.pty.status();
    Json(StatusResponse {
        state: status.state.to_string(),
        pid: status.pid,
        generation: status.generation,
        command_line: state.pty.launch_args().command_line(),
        console_viewers: state.console.viewer_count(),
        players: status
            .players
            .into_iter()
            .map(|s| PlayerView {
                name: s.name,
                address: s.address,
                joined_at: s.joined_at,
            })
            .collect(),
    })
}

/// Liveness probe - returns 200 if the panel is up
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_helpers::{eventually, test_app_state};
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = Router::new().route("/health", get(health_handler));
        assert_eq!(get_json(app, "/health").await["status"], "alive");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_reports_process_and_players() {
        let (state, _tmp, _notifier) = test_app_state().await;
        state.pty.write_console("join Zoe").await.unwrap();
        let presence = state.pty.presence();
        eventually("Zoe to join", || presence.lock().unwrap().len() == 1).await;

        let app = Router::new()
            .route("/api/status", get(status_handler))
            .with_state(state.clone());
        let json = get_json(app, "/api/status").await;

        assert_eq!(json["state"], "running");
        assert_eq!(json["generation"], 1);
        assert_eq!(json["pid"].as_u64(), state.pty.status().pid.map(u64::from));
        assert!(json["command_line"].as_str().unwrap().ends_with("-port 7777"));
        let players = json["players"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["name"], "Zoe");
        assert_eq!(players[0]["address"], "unknown");

        state.pty.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_after_shutdown() {
        let (state, _tmp, _notifier) = test_app_state().await;
        state.pty.shutdown().await.unwrap();

        let app = Router::new()
            .route("/api/status", get(status_handler))
            .with_state(state);
        let json = get_json(app, "/api/status").await;
        assert_eq!(json["state"], "stopped: shut down");
        assert!(json["pid"].is_null());
    }
}
