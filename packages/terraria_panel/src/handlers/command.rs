use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};

use terraria_pty::{AdminCommand, CommandError, CommandOutcome};

use crate::AppState;

/// Run one allow-listed command posted as the raw request body
pub async fn command_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: String,
) -> Response {
    match state.pty.submit_command(&body).await {
        Ok(CommandOutcome::Rebooted) => {
            info!("Hard reset requested by {}", addr);
            Json(serde_json::json!({ "msg": "Executed hard reset successfully." })).into_response()
        }
        Ok(CommandOutcome::Written(command)) => {
            announce_issuer(&state, addr.ip(), command).await;
            Json(serde_json::json!({ "msg": "passed" })).into_response()
        }
        Err(e) => command_error_response(&e),
    }
}

fn command_error_response(e: &CommandError) -> Response {
    if !matches!(e, CommandError::Rejected(_)) {
        warn!("Command failed: {}", e);
    }
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "msg": "error",
            "error": e.to_string(),
            "code": e.error_code(),
        })),
    )
        .into_response()
}

async fn announce_issuer(state: &AppState, ip: IpAddr, command: AdminCommand) {
    let message = issuer_message(state, ip, command);
    if let Err(e) = state.notifier.notify(&message).await {
        warn!("Failed to announce command issuer: {:#}", e);
    }
}

fn issuer_message(state: &AppState, ip: IpAddr, command: AdminCommand) -> String {
    // Players are tracked by their IPv4 text; dual-stack listeners hand us ::ffff:a.b.c.d
    let address = ip.to_canonical().to_string();
    let presence = state.pty.presence();
    let tracker = presence.lock().unwrap_or_else(|e| e.into_inner());
    match tracker.player_at(&address) {
        Some(session) => format!("{} issued command: {}", session.name, command),
        None => format!(
            "Someone not playing in the server issued command: {}",
            command
        ),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_helpers::{eventually, test_app_state};
    use axum::{
        Router,
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::Request,
        routing::post,
    };
    use tower::ServiceExt;

    fn router(state: AppState, peer: [u8; 4]) -> Router {
        Router::new()
            .route("/cmd", post(command_handler))
            .layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
            .with_state(state)
    }

    async fn post_cmd(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cmd")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unknown_command_is_rejected() {
        let (state, _tmp, notifier) = test_app_state().await;
        let (status, json) = post_cmd(router(state.clone(), [127, 0, 0, 1]), "save").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["msg"], "error");
        assert_eq!(json["code"], "command_rejected");
        assert!(json["error"].as_str().unwrap().contains("command not allowed"));
        assert!(notifier.messages().is_empty());

        state.pty.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_from_stranger() {
        let (state, _tmp, notifier) = test_app_state().await;
        let (status, json) = post_cmd(router(state.clone(), [127, 0, 0, 1]), "dawn").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["msg"], "passed");
        assert_eq!(
            notifier.messages(),
            vec!["Someone not playing in the server issued command: dawn".to_string()]
        );

        state.pty.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_from_player_names_them() {
        let (state, _tmp, notifier) = test_app_state().await;
        state.pty.write_console("connect 10.0.0.5:51234").await.unwrap();
        state.pty.write_console("join Zoe").await.unwrap();
        eventually("join announcement", || {
            notifier.messages() == vec!["Zoe has joined!".to_string()]
        })
        .await;

        let (status, _) = post_cmd(router(state.clone(), [10, 0, 0, 5]), "midnight").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            notifier.messages().last().map(String::as_str),
            Some("Zoe issued command: midnight")
        );

        state.pty.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_hard_reset_reboots() {
        let (state, _tmp, notifier) = test_app_state().await;
        let (status, json) = post_cmd(router(state.clone(), [127, 0, 0, 1]), "hardReset").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["msg"], "Executed hard reset successfully.");
        assert_eq!(state.pty.status().generation, 2);
        assert!(notifier.messages().is_empty());

        state.pty.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_after_shutdown_fails() {
        let (state, _tmp, _notifier) = test_app_state().await;
        state.pty.shutdown().await.unwrap();

        let (status, json) = post_cmd(router(state, [127, 0, 0, 1]), "noon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "not_running");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_mapped_ipv6_peer_matches_ipv4_player() {
        let (state, _tmp, _notifier) = test_app_state().await;
        state.pty.write_console("connect 192.168.1.20:7000").await.unwrap();
        state.pty.write_console("join Relogic").await.unwrap();
        let presence = state.pty.presence();
        eventually("Relogic to join", || {
            presence.lock().unwrap().get("Relogic").is_some()
        })
        .await;

        let mapped: IpAddr = "::ffff:192.168.1.20".parse().unwrap();
        assert_eq!(
            issuer_message(&state, mapped, AdminCommand::Dusk),
            "Relogic issued command: dusk"
        );

        state.pty.shutdown().await.unwrap();
    }
}
