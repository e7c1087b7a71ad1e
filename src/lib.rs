//! Multi-Client TCP Chat Server Library
//!
//! A line-oriented chat server built with tokio using the Actor pattern
//! for state management.
//!
//! # Features
//! - Name announcement on the first line, unique per connected client
//! - Room-wide broadcast of chat lines (never echoed to the sender)
//! - Per-client send workers, so a slow peer only stalls itself
//! - Administrative console with `/`-prefixed commands
//!   (`help`, `list`, `kick`, `kickall`) and tagged admin chat
//! - Disconnection handling, including forced kicks and queue overflow
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Coordinator` is the central actor owning the client registry
//! - Each connection has a session task (receive path) and a send worker
//!   (transmit path) communicating with the coordinator over events
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tcp_chat_server::{handle_connection, CommandRegistry, Coordinator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     let (coordinator, handle) = Coordinator::new(CommandRegistry::with_builtins());
//!
//!     tokio::spawn(coordinator.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, handle.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod command;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use client::Client;
pub use command::{parse_console_line, Command, CommandRegistry, ConsoleInput, COMMAND_PREFIX};
pub use console::{run_console, ADMIN_TAG};
pub use coordinator::{
    ClientInfo, Coordinator, CoordinatorHandle, Event, JoinReply, KICK_NOTICE,
};
pub use error::{AppError, SendError};
pub use session::{handle_connection, run_session, NAME_TAKEN_LINE};
pub use types::{BoxWriter, ClientId};
