//! Classification of raw server console lines.
//!
//! Only three shapes of output matter to presence tracking; everything else
//! is `Unclassified`.

const CONNECTING_MARKER: &str = " is connecting";
const JOINED_MARKER: &str = " has joined.";
const LEFT_MARKER: &str = " has left.";

/// Semantic meaning of a single console line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// `"<ip>:<port> is connecting..."`, port stripped
    Connecting(String),
    /// `"<name> has joined."`
    Joined(String),
    /// `"<name> has left."`
    Left(String),
    Unclassified,
}

/// Map a console line to at most one event. Patterns are checked in the order
/// connecting, joined, left.
pub fn classify(line: &str) -> ConsoleEvent {
    if let Some(idx) = line.find(CONNECTING_MARKER) {
        return ConsoleEvent::Connecting(strip_port(&line[..idx]).to_string());
    }
    if let Some(idx) = line.find(JOINED_MARKER) {
        return ConsoleEvent::Joined(line[..idx].to_string());
    }
    if let Some(idx) = line.find(LEFT_MARKER) {
        return ConsoleEvent::Left(line[..idx].to_string());
    }
    ConsoleEvent::Unclassified
}

fn strip_port(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => address,
    }
}
