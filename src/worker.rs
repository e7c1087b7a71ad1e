//! Send worker
//!
//! One per connected client: drains the client's outbound queue in FIFO
//! order and writes each line to the transport, so a slow peer only ever
//! stalls its own worker. The worker owns the write half for the whole
//! connection lifetime and is the only place that shuts it down.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::coordinator::CoordinatorHandle;
use crate::types::{BoxWriter, ClientId};

/// Drain `outbound` into `writer` until the queue closes or a write fails.
///
/// A write failure is reported back as a leave event; removing the client is
/// the coordinator's job, never this task's.
pub async fn run(
    id: ClientId,
    name: String,
    mut writer: BoxWriter,
    mut outbound: mpsc::Receiver<String>,
    coordinator: CoordinatorHandle,
) {
    while let Some(line) = outbound.recv().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            debug!("write to '{}' failed: {}", name, e);
            let _ = coordinator.leave(id, name).await;
            return;
        }
    }

    // Queue closed: the registry entry is already gone. The final transport
    // close happens here and nowhere else.
    debug!("send worker for '{}' draining finished", name);
    let _ = writer.shutdown().await;
}

async fn write_line(writer: &mut BoxWriter, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
