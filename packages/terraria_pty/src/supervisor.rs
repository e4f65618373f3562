use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{CommandError, SupervisorError};
use crate::notify::{Notifier, PresenceConsumer};
use crate::presence::{PresenceTracker, Session};
use crate::relay::{ConsoleConsumer, FnConsumer, LogConsumer, RelayChannel, spawn_reader};

/// How to launch the server. Reused verbatim on every reboot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchArgs {
    pub binary_path: String,
    pub world_path: String,
    pub port: String,
}

impl LaunchArgs {
    pub fn command_line(&self) -> String {
        format!(
            "{} -world {} -port {}",
            self.binary_path, self.world_path, self.port
        )
    }

    /// The command line split on whitespace; paths containing spaces are not supported
    pub fn argv(&self) -> Vec<String> {
        self.command_line()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Lifecycle of the supervised server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Resetting,
    /// Terminal; carries the reason
    Stopped(String),
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Running => write!(f, "running"),
            SupervisorState::Resetting => write!(f, "resetting"),
            SupervisorState::Stopped(reason) => write!(f, "stopped: {}", reason),
        }
    }
}

/// Commands accepted from the control surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    Dusk,
    Dawn,
    Noon,
    Midnight,
    HardReset,
}

impl AdminCommand {
    pub const ALL: [AdminCommand; 5] = [
        AdminCommand::Dusk,
        AdminCommand::Dawn,
        AdminCommand::Noon,
        AdminCommand::Midnight,
        AdminCommand::HardReset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminCommand::Dusk => "dusk",
            AdminCommand::Dawn => "dawn",
            AdminCommand::Noon => "noon",
            AdminCommand::Midnight => "midnight",
            AdminCommand::HardReset => "hardReset",
        }
    }
}

impl FromStr for AdminCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdminCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CommandError::Rejected(s.to_string()))
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `submit_command` did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Written(AdminCommand),
    Rebooted,
}

/// Point-in-time view of the supervisor
#[derive(Clone, Debug)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub generation: u64,
    pub players: Vec<Session>,
}

/// One server process with its PTY and relay
struct Generation {
    number: u64,
    child: Box<dyn Child + Send + Sync>,
    // Keeps the PTY open for the reader thread
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    relay: Arc<RelayChannel>,
    pid: Option<u32>,
}

struct Inner {
    // Some exactly while running
    current: Option<Generation>,
    consumers: Vec<Arc<dyn ConsoleConsumer>>,
    next_generation: u64,
}

#[derive(Clone)]
struct Snapshot {
    state: SupervisorState,
    pid: Option<u32>,
    generation: u64,
}

/// Supervises a Terraria server running inside a PTY.
///
/// The current generation sits behind one async mutex. A reboot holds it from
/// the interrupt until the replacement is running, so a concurrent
/// `write_console` lands either on the old process or on the new one.
pub struct TerrariaPty {
    core: Arc<Core>,
    presence: Arc<Mutex<PresenceTracker>>,
}

/// State shared with detached reboot and shutdown tasks
struct Core {
    args: LaunchArgs,
    kill_timeout: Option<Duration>,
    inner: tokio::sync::Mutex<Inner>,
    snapshot: Mutex<Snapshot>,
}

/// Configures and starts a [`TerrariaPty`]
pub struct SupervisorBuilder {
    args: LaunchArgs,
    notifier: Option<Arc<dyn Notifier>>,
    presence: Option<Arc<Mutex<PresenceTracker>>>,
    consumers: Vec<Arc<dyn ConsoleConsumer>>,
    log_console: bool,
    kill_timeout: Option<Duration>,
}

impl SupervisorBuilder {
    /// Announce joins and leaves through `notifier`
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share an existing presence tracker instead of creating one
    pub fn presence(mut self, presence: Arc<Mutex<PresenceTracker>>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn consumer(mut self, consumer: Arc<dyn ConsoleConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn on_console_line<F>(self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let name = format!("callback-{}", self.consumers.len());
        self.consumer(Arc::new(FnConsumer::new(name, callback)))
    }

    /// Log every console line (on by default)
    pub fn log_console(mut self, enabled: bool) -> Self {
        self.log_console = enabled;
        self
    }

    /// Escalate to SIGKILL if the server ignores the interrupt for this long.
    /// `None` waits forever.
    pub fn kill_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Spawn the server and start relaying its console
    pub async fn start(self) -> Result<Arc<TerrariaPty>, SupervisorError> {
        let presence = self
            .presence
            .unwrap_or_else(|| Arc::new(Mutex::new(PresenceTracker::new())));

        let mut consumers: Vec<Arc<dyn ConsoleConsumer>> = Vec::new();
        if let Some(notifier) = self.notifier {
            consumers.push(Arc::new(PresenceConsumer::new(presence.clone(), notifier)));
        }
        if self.log_console {
            consumers.push(Arc::new(LogConsumer));
        }
        consumers.extend(self.consumers);

        info!("Starting server: {}", self.args.command_line());
        let generation = spawn_generation(&self.args, 1, &consumers)?;

        let snapshot = Snapshot {
            state: SupervisorState::Running,
            pid: generation.pid,
            generation: generation.number,
        };

        Ok(Arc::new(TerrariaPty {
            core: Arc::new(Core {
                args: self.args,
                kill_timeout: self.kill_timeout,
                inner: tokio::sync::Mutex::new(Inner {
                    current: Some(generation),
                    consumers,
                    next_generation: 2,
                }),
                snapshot: Mutex::new(snapshot),
            }),
            presence,
        }))
    }
}

impl TerrariaPty {
    pub fn builder(args: LaunchArgs) -> SupervisorBuilder {
        SupervisorBuilder {
            args,
            notifier: None,
            presence: None,
            consumers: Vec::new(),
            log_console: true,
            kill_timeout: None,
        }
    }

    pub fn launch_args(&self) -> &LaunchArgs {
        &self.core.args
    }

    pub fn presence(&self) -> Arc<Mutex<PresenceTracker>> {
        self.presence.clone()
    }

    /// Current state, without waiting for an in-flight reboot
    pub fn state(&self) -> SupervisorState {
        self.core.poll_exit();
        self.core.snapshot().state
    }

    pub fn status(&self) -> SupervisorStatus {
        self.core.poll_exit();
        let snapshot = self.core.snapshot();
        let players = self
            .presence
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sessions();
        SupervisorStatus {
            state: snapshot.state,
            pid: snapshot.pid,
            generation: snapshot.generation,
            players,
        }
    }

    /// Attach a consumer to the current console and every one after a reboot
    pub async fn register(&self, consumer: Arc<dyn ConsoleConsumer>) {
        let mut inner = self.core.inner.lock().await;
        if let Some(generation) = &inner.current {
            generation.relay.attach(consumer.clone());
        }
        inner.consumers.push(consumer);
    }

    pub async fn on_console_line<F>(&self, name: &str, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.register(Arc::new(FnConsumer::new(name, callback)))
            .await;
    }

    /// Write `command` followed by a newline to the server console.
    ///
    /// Fails with `Io` if the server turns out to have exited; the supervisor
    /// is `Stopped` from then on.
    pub async fn write_console(&self, command: &str) -> Result<(), SupervisorError> {
        let mut inner = self.core.inner.lock().await;
        if let Some(reason) = self.core.reap_exited(&mut inner) {
            return Err(SupervisorError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason,
            )));
        }
        let Some(generation) = inner.current.as_mut() else {
            return Err(self.core.not_running());
        };

        debug!(
            "Writing {:?} to server console (generation {})",
            command, generation.number
        );
        generation
            .writer
            .write_all(format!("{}\n", command).as_bytes())?;
        generation.writer.flush()?;
        Ok(())
    }

    /// Interrupt the server, wait for it to exit, and start a fresh one with
    /// the same arguments. The world is not saved.
    ///
    /// The reboot runs on its own task, so it completes even if the caller
    /// stops waiting for it.
    pub async fn hard_reboot(&self) -> Result<(), SupervisorError> {
        let core = self.core.clone();
        tokio::spawn(async move { core.reboot().await })
            .await
            .map_err(task_failed)?
    }

    /// Validate a control-surface command and carry it out
    pub async fn submit_command(&self, raw: &str) -> Result<CommandOutcome, CommandError> {
        let command = raw.parse::<AdminCommand>().inspect_err(|_| {
            debug!("Rejected command {:?}", raw);
        })?;

        match command {
            AdminCommand::HardReset => {
                self.hard_reboot().await?;
                Ok(CommandOutcome::Rebooted)
            }
            other => {
                self.write_console(other.as_str()).await?;
                Ok(CommandOutcome::Written(other))
            }
        }
    }

    /// Interrupt the server and wait for it to exit, leaving the supervisor stopped
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        let core = self.core.clone();
        tokio::spawn(async move { core.shutdown().await })
            .await
            .map_err(task_failed)?
    }
}

fn task_failed(e: tokio::task::JoinError) -> SupervisorError {
    SupervisorError::ProcessWait {
        error: format!("supervisor task failed: {}", e),
        status: "unknown".to_string(),
    }
}

impl Core {
    async fn reboot(&self) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().await;
        self.reap_exited(&mut inner);
        let Some(old) = inner.current.take() else {
            return Err(self.not_running());
        };

        let old_number = old.number;
        info!(
            "Hard rebooting server (generation {}, pid {:?})",
            old_number, old.pid
        );
        self.set_state(SupervisorState::Resetting, old.pid, old_number);

        if let Err(e) = self.stop_generation(old).await {
            error!("Hard reboot failed while stopping the server: {}", e);
            self.set_state(SupervisorState::Stopped(e.to_string()), None, old_number);
            return Err(e);
        }

        let number = inner.next_generation;
        inner.next_generation += 1;
        self.set_state(SupervisorState::Starting, None, number);

        let generation = match spawn_generation(&self.args, number, &inner.consumers) {
            Ok(generation) => generation,
            Err(e) => {
                error!("Hard reboot failed to start the server: {}", e);
                self.set_state(SupervisorState::Stopped(e.to_string()), None, number);
                return Err(e);
            }
        };

        self.set_state(SupervisorState::Running, generation.pid, number);
        inner.current = Some(generation);

        info!("Hard reboot complete, now on generation {}", number);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().await;
        if self.reap_exited(&mut inner).is_some() {
            return Ok(());
        }
        let Some(old) = inner.current.take() else {
            return Ok(());
        };

        info!("Shutting down server (pid {:?})", old.pid);
        let number = old.number;
        let result = self.stop_generation(old).await;
        let reason = match &result {
            Ok(()) => "shut down".to_string(),
            Err(e) => e.to_string(),
        };
        self.set_state(SupervisorState::Stopped(reason), None, number);
        result
    }

    /// Notice a server that exited on its own, unless a reboot holds the lock
    fn poll_exit(&self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            self.reap_exited(&mut inner);
        }
    }

    /// Tear down the current generation if its process has exited, returning
    /// the reason recorded in the `Stopped` state
    fn reap_exited(&self, inner: &mut Inner) -> Option<String> {
        let generation = inner.current.as_mut()?;
        let status = match generation.child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return None,
            Err(e) => {
                debug!("Failed to poll server generation {}: {}", generation.number, e);
                return None;
            }
        };

        let generation = inner.current.take()?;
        let reason = format!("server exited: {}", status);
        warn!(
            "Server generation {} (pid {:?}) exited on its own: {}",
            generation.number, generation.pid, status
        );
        generation.relay.close();
        self.set_state(SupervisorState::Stopped(reason.clone()), None, generation.number);
        Some(reason)
    }

    async fn stop_generation(&self, generation: Generation) -> Result<(), SupervisorError> {
        let Generation {
            number,
            mut child,
            _master,
            writer,
            relay,
            pid,
        } = generation;

        if let Err(e) = interrupt(&mut child, pid) {
            relay.close();
            return Err(e);
        }

        let mut wait = tokio::task::spawn_blocking(move || {
            let result = child.wait();
            (child, result)
        });

        let joined = match self.kill_timeout {
            None => wait.await,
            Some(grace) => match tokio::time::timeout(grace, &mut wait).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        "Server generation {} still running {:?} after interrupt, killing",
                        number, grace
                    );
                    force_kill(pid);
                    wait.await
                }
            },
        };

        // Nothing from the old process is relayed past this point
        relay.close();
        drop(writer);

        let (mut child, result) = joined.map_err(|e| SupervisorError::ProcessWait {
            error: e.to_string(),
            status: "exit status unavailable".to_string(),
        })?;

        match result {
            Ok(status) => {
                info!("Server generation {} exited: {}", number, status);
                Ok(())
            }
            Err(e) => {
                let status = match child.try_wait() {
                    Ok(Some(status)) => status.to_string(),
                    _ => "exit status unavailable".to_string(),
                };
                Err(SupervisorError::ProcessWait {
                    error: e.to_string(),
                    status,
                })
            }
        }
    }

    fn not_running(&self) -> SupervisorError {
        SupervisorError::NotRunning {
            state: self.snapshot().state.to_string(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: SupervisorState, pid: Option<u32>, generation: u64) {
        debug!("Supervisor state -> {}", state);
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Snapshot {
            state,
            pid,
            generation,
        };
    }
}

/// Open a PTY, spawn the server on it and start the reader thread.
///
/// Consumers are attached before the reader starts so none of them misses the
/// first lines of output.
fn spawn_generation(
    args: &LaunchArgs,
    number: u64,
    consumers: &[Arc<dyn ConsoleConsumer>],
) -> Result<Generation, SupervisorError> {
    let argv = args.argv();
    let Some((program, rest)) = argv.split_first() else {
        return Err(SupervisorError::Spawn("empty command line".to_string()));
    };

    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SupervisorError::Spawn(format!("failed to open PTY: {}", e)))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(rest);
    cmd.env("TERM", "xterm-256color");

    let child = pair.slave.spawn_command(cmd).map_err(|e| {
        error!("Failed to spawn command '{}': {}", program, e);
        SupervisorError::Spawn(e.to_string())
    })?;
    // Only the child should hold the slave side, so the reader sees EOF when it exits
    drop(pair.slave);

    let pid = child.process_id();
    info!("Server generation {} started with PID: {:?}", number, pid);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| SupervisorError::Spawn(format!("failed to clone PTY reader: {}", e)))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| SupervisorError::Spawn(format!("failed to take PTY writer: {}", e)))?;

    let relay = RelayChannel::new(number);
    for consumer in consumers {
        relay.attach(consumer.clone());
    }
    spawn_reader(reader, relay.clone());

    Ok(Generation {
        number,
        child,
        _master: pair.master,
        writer,
        relay,
        pid,
    })
}

/// Send SIGINT, treating an already-gone process as success
fn interrupt(
    child: &mut Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
) -> Result<(), SupervisorError> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};

        let _ = child;
        let Some(pid) = pid else {
            return Ok(());
        };
        match kill(raw_pid(pid)?, Signal::SIGINT) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SupervisorError::ProcessWait {
                error: format!("failed to interrupt pid {}: {}", pid, e),
                status: "still running".to_string(),
            }),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        child.kill().map_err(|e| SupervisorError::ProcessWait {
            error: e.to_string(),
            status: "still running".to_string(),
        })
    }
}

#[cfg(unix)]
fn raw_pid(pid: u32) -> Result<nix::unistd::Pid, SupervisorError> {
    let raw = i32::try_from(pid).map_err(|_| SupervisorError::ProcessWait {
        error: format!("pid {} does not fit a pid_t", pid),
        status: "still running".to_string(),
    })?;
    Ok(nix::unistd::Pid::from_raw(raw))
}

fn force_kill(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};

        let Some(pid) = pid else {
            return;
        };
        let target = match raw_pid(pid) {
            Ok(target) => target,
            Err(e) => {
                warn!("Cannot SIGKILL: {}", e);
                return;
            }
        };
        if let Err(e) = kill(target, Signal::SIGKILL) {
            warn!("Failed to SIGKILL pid {}: {}", pid, e);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
