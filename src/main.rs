//! Multi-Client TCP Chat Server - Entry Point
//!
//! Starts the TCP listener, the coordinator actor, and the admin console,
//! then accepts connections.

use std::env;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcp_chat_server::{handle_connection, run_console, CommandRegistry, Coordinator};

/// Default room label shown in the startup log
const DEFAULT_ROOM: &str = "rust chat";

/// Default listen port
const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tcp_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tcp_chat_server=info")),
        )
        .init();

    // Room name and listen port from the command line:
    // tcp_chat_server [room-name] [port]
    let mut args = env::args().skip(1);
    let room = args.next().unwrap_or_else(|| DEFAULT_ROOM.to_string());
    let port = match args.next() {
        Some(raw) => raw.parse::<u16>()?,
        None => DEFAULT_PORT,
    };

    // Failure to bind is the one unrecoverable startup error
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("starting {} at {}", room, listener.local_addr()?);

    // Commands are registered here, before the coordinator starts; the
    // registry moves into the actor and cannot change afterwards.
    let (coordinator, handle) = Coordinator::new(CommandRegistry::with_builtins());
    tokio::spawn(coordinator.run());
    tokio::spawn(run_console(tokio::io::stdin(), handle.clone()));

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("new connection from {}", addr);
                let coordinator = handle.clone();

                // Spawn the receive path for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, coordinator).await {
                        error!("session error for {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}
