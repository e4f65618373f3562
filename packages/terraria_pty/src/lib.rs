//! Terraria PTY - supervision of a Terraria dedicated server
//!
//! This crate owns the server process through a pseudo-terminal, relays every
//! console line to a set of independent consumers, and tracks which players
//! are online from the server's join/leave output.
//! It has no HTTP dependencies and no knowledge of any particular chat service.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use terraria_pty::{LaunchArgs, LogNotifier, TerrariaPty};
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = LaunchArgs {
//!         binary_path: "./server/TerrariaServer.bin.x86_64".to_string(),
//!         world_path: "./server/world.wld".to_string(),
//!         port: "7777".to_string(),
//!     };
//!
//!     let pty = TerrariaPty::builder(args)
//!         .notifier(Arc::new(LogNotifier))
//!         .on_console_line(|line| println!("server: {line}"))
//!         .start()
//!         .await
//!         .unwrap();
//!
//!     pty.submit_command("dawn").await.unwrap();
//!     pty.submit_command("hardReset").await.unwrap();
//! }
//! ```

pub mod classifier;
mod error;
pub mod humanize;
pub mod notify;
pub mod presence;
pub mod relay;
pub mod supervisor;

pub use classifier::{ConsoleEvent, classify};
pub use error::{CommandError, SupervisorError};
pub use humanize::humanize_duration;
pub use notify::{LogNotifier, Notifier, PresenceConsumer};
pub use presence::{PresenceTracker, Session, UNKNOWN_ADDRESS};
pub use relay::{ConsoleConsumer, FnConsumer, LogConsumer, RelayChannel};
pub use supervisor::{
    AdminCommand, CommandOutcome, LaunchArgs, SupervisorBuilder, SupervisorState,
    SupervisorStatus, TerrariaPty,
};
