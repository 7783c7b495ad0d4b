//! WebSocket Connection Handle
//!
//! The shareable half of a live connection: its identity and the sending end
//! of the channel drained by the connection's writer task.

use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{DispatchError, DispatchResult};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Close code sent when a frame cannot be decoded at all
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Close code sent when the hub refuses a connection
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Close reasons must fit in a control frame
const MAX_CLOSE_REASON: usize = 123;

/// Application-chosen identity of whoever owns a connection.
///
/// Not unique: one user may hold several connections (one per device).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionKey {
    fn from(key: &str) -> Self {
        ConnectionKey(key.to_string())
    }
}

impl From<String> for ConnectionKey {
    fn from(key: String) -> Self {
        ConnectionKey(key)
    }
}

impl From<i64> for ConnectionKey {
    fn from(key: i64) -> Self {
        ConnectionKey(key.to_string())
    }
}

impl From<u64> for ConnectionKey {
    fn from(key: u64) -> Self {
        ConnectionKey(key.to_string())
    }
}

/// Instructions for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Send a text frame
    Text(String),
    /// Send a close frame and stop writing
    Close { code: u16, reason: String },
}

/// Represents a connected WebSocket client
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Identity key this connection is registered under
    pub key: ConnectionKey,
    /// Channel to the connection's writer task
    tx: mpsc::UnboundedSender<Outbound>,
    /// When this connection was established
    pub connected_at: Instant,
}

impl ClientConnection {
    /// Create a new connection handle
    pub fn new(key: impl Into<ConnectionKey>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: key.into(),
            tx,
            connected_at: Instant::now(),
        }
    }

    /// Queue a text frame for this client
    pub fn send(&self, text: String) -> DispatchResult<()> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| DispatchError::Delivery(self.id.clone()))
    }

    /// Ask the writer task to close the socket.
    ///
    /// Returns `false` if the writer has already stopped.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        let reason = truncate_reason(reason.into());
        self.tx.send(Outbound::Close { code, reason }).is_ok()
    }

    /// Whether the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Connection age
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
