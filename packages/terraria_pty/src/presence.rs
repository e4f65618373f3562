//! Player presence derived from console events.
//!
//! Addresses come from the most recent "is connecting" line, so two players
//! connecting at nearly the same moment can have their addresses swapped.
//! Line-based correlation cannot do better, and sessions are kept across
//! server reboots even though the new process knows nothing about them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::classifier::ConsoleEvent;
use crate::humanize::humanize_duration;

/// Address recorded for a join that had no preceding "is connecting" line
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// A player currently on the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub address: String,
    pub joined_at: DateTime<Utc>,
}

/// Tracks who is online, keyed by player name
#[derive(Debug)]
pub struct PresenceTracker {
    sessions: HashMap<String, Session>,
    pending_address: String,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            pending_address: UNKNOWN_ADDRESS.to_string(),
        }
    }

    /// Apply one event observed at `now`, returning the announcement to send, if any.
    pub fn apply(&mut self, event: ConsoleEvent, now: DateTime<Utc>) -> Option<String> {
        match event {
            ConsoleEvent::Connecting(address) => {
                self.pending_address = address;
                None
            }
            ConsoleEvent::Joined(name) => {
                debug!("{} joined from {}", name, self.pending_address);
                let message = format!("{} has joined!", name);
                self.sessions.insert(
                    name.clone(),
                    Session {
                        name,
                        address: self.pending_address.clone(),
                        joined_at: now,
                    },
                );
                Some(message)
            }
            ConsoleEvent::Left(name) => {
                let Some(session) = self.sessions.remove(&name) else {
                    debug!("Ignoring leave for untracked player {}", name);
                    return None;
                };
                let played = (now - session.joined_at).to_std().unwrap_or_default();
                Some(format!(
                    "{} has left. They played for {}",
                    name,
                    humanize_duration(played)
                ))
            }
            ConsoleEvent::Unclassified => None,
        }
    }

    /// The session whose recorded address matches `address`
    pub fn player_at(&self, address: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.address == address)
    }

    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Online sessions, oldest join first
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.joined_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
