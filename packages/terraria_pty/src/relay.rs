//! Console relay fan-out.
//!
//! One reader thread per PTY generation publishes lines into a
//! [`RelayChannel`]. Every attached consumer owns an unbounded queue and a
//! drain task, so each consumer sees every line in order and a slow consumer
//! only delays itself. Closing the channel drops all queue senders, which is
//! the only stop signal a consumer gets.

use async_trait::async_trait;
use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that wants every console line of the server
#[async_trait]
pub trait ConsoleConsumer: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn on_line(&self, line: &str);
}

/// Adapts a plain callback into a [`ConsoleConsumer`]
pub struct FnConsumer<F> {
    name: String,
    callback: F,
}

impl<F> FnConsumer<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

#[async_trait]
impl<F> ConsoleConsumer for FnConsumer<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_line(&self, line: &str) {
        (self.callback)(line);
    }
}

/// Writes each console line to the log under the `console` target
pub struct LogConsumer;

#[async_trait]
impl ConsoleConsumer for LogConsumer {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_line(&self, line: &str) {
        info!(target: "console", "{}", line);
    }
}

/// Fan-out for the console output of one PTY generation
pub struct RelayChannel {
    generation: u64,
    // None once closed
    senders: Mutex<Option<Vec<mpsc::UnboundedSender<String>>>>,
}

impl RelayChannel {
    pub fn new(generation: u64) -> Arc<Self> {
        Arc::new(Self {
            generation,
            senders: Mutex::new(Some(Vec::new())),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Give `consumer` its own queue and start draining it.
    ///
    /// Returns `None` if the channel is already closed. The consumer sees lines
    /// published after this call.
    pub fn attach(&self, consumer: Arc<dyn ConsoleConsumer>) -> Option<JoinHandle<()>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        {
            let mut guard = self.lock();
            guard.as_mut()?.push(tx);
        }

        let generation = self.generation;
        debug!(
            "Attached console consumer '{}' to generation {}",
            consumer.name(),
            generation
        );
        Some(tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                consumer.on_line(&line).await;
            }
            debug!(
                "Console consumer '{}' finished for generation {}",
                consumer.name(),
                generation
            );
        }))
    }

    /// Push one line to every consumer. Returns false once the channel is closed.
    pub fn publish(&self, line: &str) -> bool {
        let mut guard = self.lock();
        let Some(senders) = guard.as_mut() else {
            return false;
        };
        senders.retain(|tx| tx.send(line.to_string()).is_ok());
        true
    }

    /// Close the channel. Consumers finish the lines already queued, then stop.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            debug!("Closed console relay for generation {}", self.generation);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    pub fn consumer_count(&self) -> usize {
        self.lock().as_ref().map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<mpsc::UnboundedSender<String>>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Spawn the blocking thread that scans `reader` line by line into `relay`.
///
/// The thread stops at EOF, on a read error, or as soon as the relay has been
/// closed, and closes the relay on its way out.
pub(crate) fn spawn_reader(
    reader: Box<dyn Read + Send>,
    relay: Arc<RelayChannel>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let generation = relay.generation();
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::with_capacity(256);
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => {
                    info!("PTY EOF detected for generation {}", generation);
                    break;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buffer);
                    let line = text.trim_end_matches(['\r', '\n']);
                    if !relay.publish(line) {
                        debug!("Relay closed, dropping output of generation {}", generation);
                        break;
                    }
                }
                Err(e) => {
                    // EIO is how Linux reports a PTY whose child has gone away
                    warn!("Error reading PTY output for generation {}: {}", generation, e);
                    break;
                }
            }
        }
        relay.close();
        info!("PTY reader thread exiting for generation {}", generation);
    })
}
