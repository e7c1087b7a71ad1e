//! Client session (receive path)
//!
//! Owns the inbound half of one connection. Protocol: the first line is the
//! requested display name; every following line is one chat message. The
//! session talks to the registry only through coordinator events and submits
//! exactly one leave, whichever way the connection ends.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

use crate::coordinator::{CoordinatorHandle, JoinReply};
use crate::error::AppError;

/// Rejection line for a name that is already connected
pub const NAME_TAKEN_LINE: &str =
    "A user with that name is already online. Choose another name";

/// Run the receive path for one accepted TCP connection.
pub async fn handle_connection(
    stream: TcpStream,
    coordinator: CoordinatorHandle,
) -> Result<(), AppError> {
    let addr = stream.peer_addr()?;
    let (reader, writer) = stream.into_split();
    run_session(reader, writer, addr, coordinator, None).await
}

/// Stream-generic session core.
///
/// `read_timeout`, when set, bounds every read; expiry takes the same
/// teardown path as a read error. The write half is handed to the
/// coordinator on admission and comes back only if the join is rejected.
pub async fn run_session<R, W>(
    reader: R,
    writer: W,
    addr: SocketAddr,
    coordinator: CoordinatorHandle,
    read_timeout: Option<Duration>,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    let Some(first) = next_line(&mut lines, read_timeout).await? else {
        debug!("{} closed before sending a name", addr);
        return Ok(());
    };
    let name = first.trim().to_string();
    if name.is_empty() {
        return Err(AppError::EmptyName);
    }

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let id = match coordinator
        .try_join(name.clone(), addr, Box::new(writer), shutdown_tx)
        .await?
    {
        JoinReply::NameTaken { mut writer } => {
            writer.write_all(NAME_TAKEN_LINE.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.shutdown().await?;
            return Ok(());
        }
        JoinReply::Admitted { id } => id,
    };

    loop {
        tokio::select! {
            // Fires when the coordinator drops the registry entry (kick,
            // queue overflow): stop reading instead of waiting out the peer.
            _ = &mut shutdown_rx => break,
            read = next_line(&mut lines, read_timeout) => match read {
                Ok(Some(text)) => {
                    let text = text.trim_end_matches('\r').to_string();
                    if coordinator.message(id, name.clone(), text).await.is_err() {
                        break;
                    }
                }
                // EOF, read error, and timeout all end the session the same way
                Ok(None) | Err(_) => break,
            },
        }
    }

    // Exactly one leave per session, no matter which path ended the loop.
    let _ = coordinator.leave(id, name).await;
    Ok(())
}

async fn next_line<R>(
    lines: &mut Lines<BufReader<R>>,
    read_timeout: Option<Duration>,
) -> Result<Option<String>, AppError>
where
    R: AsyncRead + Unpin,
{
    let read = match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
            Ok(read) => read,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "read timed out",
            )),
        },
        None => lines.next_line().await,
    };
    Ok(read?)
}
