//! Client struct definition
//!
//! Represents a connected client as seen by the coordinator: identity,
//! display name, remote address, and the endpoints tying its two tasks
//! to the registry entry.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};

use crate::error::SendError;
use crate::types::ClientId;

/// Connected client record
///
/// Owned exclusively by the coordinator's registry. Dropping it has two
/// effects: the outbound sender closes, so the send worker drains the queue
/// and shuts the transport down; and the shutdown sender closes, which wakes
/// the session's read loop so a kicked client is torn down promptly.
#[derive(Debug)]
pub struct Client {
    /// Identity issued at admission; distinguishes re-joins under one name
    pub id: ClientId,
    /// Display name, unique among connected clients
    pub name: String,
    /// Remote address, reported by `list` and in the operational log
    pub addr: SocketAddr,
    /// Coordinator → send worker queue of formatted lines
    outbound: mpsc::Sender<String>,
    /// Held for its drop side effect; the session selects on the paired
    /// receiver.
    _shutdown: oneshot::Sender<()>,
}

impl Client {
    /// Create a new client record
    pub fn new(
        id: ClientId,
        name: String,
        addr: SocketAddr,
        outbound: mpsc::Sender<String>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            name,
            addr,
            outbound,
            _shutdown: shutdown,
        }
    }

    /// Enqueue one formatted line for this client's send worker.
    ///
    /// Non-blocking: the coordinator calls this on its own turn, so a full
    /// or closed queue must surface as an error instead of a wait.
    pub fn try_enqueue(&self, line: &str) -> Result<(), SendError> {
        self.outbound
            .try_send(line.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }
}
