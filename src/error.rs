//! Error types for the chat server
//!
//! Defines session-level errors and outbound enqueue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Session-level errors
///
/// Everything here is local to one connection: the session that hits one of
/// these tears itself down, the coordinator and the other clients are never
/// affected.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the transport (read/write failure, timeout)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Coordinator event channel closed (server shutting down)
    #[error("coordinator channel closed")]
    ChannelSend,

    /// First line of the connection was empty - no client is registered
    #[error("empty name line")]
    EmptyName,
}

/// Outbound enqueue errors
///
/// Returned by `Client::try_enqueue`. Either way the client is considered
/// stale and gets disconnected by the coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The send worker has stopped and dropped the receiving end
    #[error("outbound queue closed")]
    Closed,

    /// The bounded outbound queue is full (slow client)
    #[error("outbound queue full")]
    Full,
}
