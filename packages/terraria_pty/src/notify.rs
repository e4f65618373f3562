use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::classifier::{ConsoleEvent, classify};
use crate::presence::PresenceTracker;
use crate::relay::ConsoleConsumer;

/// Remote channel that receives player announcements.
///
/// Callers log failures and move on; a failed notification never stops the relay.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, message: &str) -> anyhow::Result<()>;
}

/// Notifier that only writes to the log, for when no chat service is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        info!(target: "notify", "{}", message);
        Ok(())
    }
}

/// Relay consumer that feeds the presence tracker and forwards its announcements
pub struct PresenceConsumer {
    tracker: Arc<Mutex<PresenceTracker>>,
    notifier: Arc<dyn Notifier>,
}

impl PresenceConsumer {
    pub fn new(tracker: Arc<Mutex<PresenceTracker>>, notifier: Arc<dyn Notifier>) -> Self {
        Self { tracker, notifier }
    }
}

#[async_trait]
impl ConsoleConsumer for PresenceConsumer {
    fn name(&self) -> &str {
        "presence"
    }

    async fn on_line(&self, line: &str) {
        let event = classify(line);
        if event == ConsoleEvent::Unclassified {
            return;
        }

        let announcement = self
            .tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply(event, Utc::now());

        if let Some(message) = announcement {
            if let Err(e) = self.notifier.notify(&message).await {
                warn!("Failed to send notification {:?}: {:#}", message, e);
            }
        }
    }
}
