//! Admin console input
//!
//! External collaborator turning operator lines into coordinator events:
//! prefixed lines become command invocations, everything else is broadcast
//! to the room under the admin tag.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::command::{parse_console_line, ConsoleInput, COMMAND_PREFIX};
use crate::coordinator::CoordinatorHandle;

/// Tag prepended to operator chat lines
pub const ADMIN_TAG: &str = "[admin]";

/// Read operator lines from `input` until EOF or coordinator shutdown.
///
/// In production `input` is the process stdin.
pub async fn run_console<R>(input: R, coordinator: CoordinatorHandle)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_console_line(&line, COMMAND_PREFIX) {
            ConsoleInput::Empty => continue,
            ConsoleInput::Invalid => {
                println!("Invalid command. Format {}<command> args", COMMAND_PREFIX);
            }
            ConsoleInput::Command { name, args } => {
                if coordinator.execute(name, args).await.is_err() {
                    break;
                }
            }
            ConsoleInput::Chat(text) => {
                let tagged = format!("{} {}", ADMIN_TAG, text);
                if coordinator.broadcast(tagged).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("admin console closed");
}
