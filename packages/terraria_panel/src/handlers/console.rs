use axum::{
    extract::{State, ws::WebSocketUpgrade},
    response::IntoResponse,
};

use crate::AppState;
use crate::console::handle_console_socket;

/// Stream server console lines to a browser as text frames
pub async fn console_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no line slips between
    let lines = state.console.subscribe();
    ws.on_upgrade(move |socket| handle_console_socket(socket, lines))
}
