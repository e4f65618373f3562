use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use terraria_pty::{LaunchArgs, Notifier, TerrariaPty};

use crate::{AppState, ConsoleBroadcast};

/// Shell stand-in for the game server that turns test input into the lines it would print
const STUB_SERVER: &str = r#"#!/bin/sh
echo "ready $$"
while IFS= read -r line; do
  case "$line" in
    connect\ *) echo "${line#connect } is connecting..." ;;
    join\ *) echo "${line#join } has joined." ;;
    leave\ *) echo "${line#leave } has left." ;;
    *) echo "pid $$ got $line" ;;
  esac
done
"#;

#[derive(Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Build an `AppState` around a stub server running in a PTY.
///
/// Callers must hold the `TempDir` for the lifetime of the test and should
/// shut the supervisor down when done.
pub async fn test_app_state() -> (AppState, tempfile::TempDir, Arc<CollectingNotifier>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let binary = tmp.path().join("server.sh");
    std::fs::write(&binary, STUB_SERVER).expect("write stub");
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    let notifier = Arc::new(CollectingNotifier::default());
    let console = Arc::new(ConsoleBroadcast::new());
    let pty = TerrariaPty::builder(LaunchArgs {
        binary_path: binary.to_string_lossy().to_string(),
        world_path: "test.wld".to_string(),
        port: "7777".to_string(),
    })
    .notifier(notifier.clone())
    .consumer(console.clone())
    .log_console(false)
    .start()
    .await
    .expect("start stub server");

    let state = AppState {
        pty,
        notifier: notifier.clone(),
        console,
        header: Arc::from("Test Panel"),
    };
    (state, tmp, notifier)
}

pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
