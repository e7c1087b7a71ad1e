//! Basic type definitions for the chat server
//!
//! Provides:
//! - `ClientId`: UUID-based unique client identifier
//! - `BoxWriter`: type-erased transport write half

use tokio::io::AsyncWrite;
use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 issued at admission time. Two admissions under the same
/// name get distinct ids, which is what lets the coordinator ignore a stale
/// `Leave` for a name that has since been re-joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Boxed transport write half.
///
/// Sessions hand their write half to the coordinator inside `TryJoin`; the
/// erased type keeps the event enum independent of the concrete stream so
/// tests can run over in-memory pipes.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
