use axum::{extract::State, response::IntoResponse};
use maud::{DOCTYPE, PreEscaped, html};

use terraria_pty::{AdminCommand, SupervisorState};

use crate::AppState;

const CSS: &str = r#"
body { font-family: sans-serif; background: #1d2330; color: #e6e6e6; margin: 0; }
.container { max-width: 900px; margin: 0 auto; padding: 24px; }
.buttons { display: flex; flex-wrap: wrap; gap: 8px; margin: 16px 0; }
button { padding: 10px 18px; border: 0; border-radius: 4px; background: #3b4a6b; color: #fff; cursor: pointer; }
button.danger { background: #a33; }
.status-running { color: #5c5; }
.status-other { color: #d95; }
#command-status { min-height: 1.2em; }
#console { background: #000; color: #ccc; height: 400px; overflow-y: auto; padding: 8px; font-family: monospace; white-space: pre-wrap; }
"#;

const JAVASCRIPT: &str = r#"
function setCmdStatus(text) {
    document.getElementById("command-status").innerText = text;
}

function submitCommand(cmd) {
    fetch("cmd", { method: "POST", body: cmd })
        .then(response => response.json())
        .then(data => {
            if (data.msg === "error") {
                setCmdStatus("Encountered error: " + data.error);
                return;
            }
            setCmdStatus("Processed command successfully.");
        })
        .catch(e => setCmdStatus("Encountered error: " + e));
}

function printToConsole(text) {
    const el = document.getElementById("console");
    el.textContent += text + "\n";
    el.scrollTop = el.scrollHeight;
}

document.querySelectorAll("button[data-cmd]").forEach(button => {
    button.addEventListener("click", () => {
        const cmd = button.dataset.cmd;
        if (cmd === "hardReset") {
            if (!confirm("This will reboot the server WITHOUT SAVING. Are you sure?")) return;
            setCmdStatus("Issuing hard reset ...");
        }
        submitCommand(cmd);
    });
});

document.getElementById("clear-console").addEventListener("click", () => {
    document.getElementById("console").textContent = "";
});

function connectConsole() {
    const scheme = window.location.protocol === "https:" ? "wss://" : "ws://";
    const sock = new WebSocket(scheme + window.location.host + "/console");
    sock.onmessage = ev => printToConsole(ev.data);
    sock.onclose = () => setTimeout(connectConsole, 2000);
}
connectConsole();
"#;

fn button_label(command: AdminCommand) -> &'static str {
    match command {
        AdminCommand::Dusk => "Dusk",
        AdminCommand::Dawn => "Dawn",
        AdminCommand::Noon => "Noon",
        AdminCommand::Midnight => "Midnight",
        AdminCommand::HardReset => "Hard reset",
    }
}

/// Control page
pub async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.pty.status();
    let status_class = if status.state == SupervisorState::Running {
        "status-running"
    } else {
        "status-other"
    };
    let pid_info = status
        .pid
        .map_or("N/A".to_string(), |pid| pid.to_string());

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (state.header) }
                style { (PreEscaped(CSS)) }
            }
            body {
                div class="container" {
                    h1 { (state.header) }
                    p {
                        "Server: "
                        span class=(status_class) { (status.state) }
                        " (PID " (pid_info) ", generation " (status.generation) ")"
                    }
                    div class="buttons" {
                        @for command in AdminCommand::ALL {
                            @if command == AdminCommand::HardReset {
                                button class="danger" data-cmd=(command.as_str()) { (button_label(command)) }
                            } @else {
                                button data-cmd=(command.as_str()) { (button_label(command)) }
                            }
                        }
                    }
                    p id="command-status" {}
                    h2 { "Players online (" (status.players.len()) ")" }
                    ul {
                        @for player in &status.players {
                            li { (player.name) " since " (player.joined_at.format("%H:%M:%S UTC")) }
                        }
                    }
                    h2 { "Console" }
                    div id="console" {}
                    div class="buttons" {
                        button id="clear-console" { "Clear" }
                    }
                }
                script { (PreEscaped(JAVASCRIPT)) }
            }
        }
    }
}
