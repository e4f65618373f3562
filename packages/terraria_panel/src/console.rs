//! Live console for browsers.
//!
//! A [`ConsoleBroadcast`] is registered on the supervisor like any other
//! consumer and re-publishes lines on a tokio broadcast channel. Each
//! WebSocket viewer subscribes to that channel; a viewer that falls behind
//! skips lines instead of holding the relay back.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use terraria_pty::ConsoleConsumer;

const CONSOLE_BUFFER: usize = 1024;

pub struct ConsoleBroadcast {
    tx: broadcast::Sender<String>,
}

impl Default for ConsoleBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CONSOLE_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ConsoleConsumer for ConsoleBroadcast {
    fn name(&self) -> &str {
        "web-console"
    }

    async fn on_line(&self, line: &str) {
        // No viewers is not an error
        let _ = self.tx.send(line.to_string());
    }
}

pub async fn handle_console_socket(socket: WebSocket, mut lines: broadcast::Receiver<String>) {
    let (mut sender, mut receiver) = socket.split();
    info!("Console viewer connected");

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Ok(line) => {
                    if sender.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Console viewer lagged, skipped {} lines", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    debug!("Ignoring message from console viewer");
                }
                Some(Err(e)) => {
                    debug!("Console socket error: {}", e);
                    break;
                }
            },
        }
    }

    info!("Console viewer disconnected");
}
