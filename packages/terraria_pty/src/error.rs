/// Errors surfaced by the process supervisor
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The server process or its PTY could not be created
    #[error("failed to spawn server: {0}")]
    Spawn(String),

    /// Writing to the PTY failed
    #[error("failed to write to server console: {0}")]
    Io(#[from] std::io::Error),

    /// Signalling or waiting on the old process failed during a reboot
    #[error("failed waiting for server to exit: {error} ({status})")]
    ProcessWait { error: String, status: String },

    /// The operation needs a running server
    #[error("server is not running (state: {state})")]
    NotRunning { state: String },
}

/// Errors returned from `TerrariaPty::submit_command`
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command is not on the allow-list
    #[error("command not allowed: {0}")]
    Rejected(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl CommandError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Rejected(_) => "command_rejected",
            Self::Supervisor(SupervisorError::Spawn(_)) => "spawn_failed",
            Self::Supervisor(SupervisorError::Io(_)) => "io_error",
            Self::Supervisor(SupervisorError::ProcessWait { .. }) => "process_wait_failed",
            Self::Supervisor(SupervisorError::NotRunning { .. }) => "not_running",
        }
    }
}
