//! Coordinator actor implementation
//!
//! The single actor that owns the client registry. Sessions, send workers,
//! the admin console, and command handlers all talk to it through one mpsc
//! event channel; events are applied strictly one at a time, which is the
//! only thing that keeps the registry consistent - no locks anywhere.
//!
//! Event handling is synchronous: the loop enqueues work for send workers
//! with `try_send` and spawns command handlers onto their own tasks, so a
//! slow client or a long-running command can never stall event processing.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::command::CommandRegistry;
use crate::error::AppError;
use crate::types::{BoxWriter, ClientId};
use crate::worker;

/// Channel buffer size for coordinator events
const EVENT_BUFFER_SIZE: usize = 256;

/// Per-client outbound queue capacity; overflow disconnects the client
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Line enqueued for a client right before it is kicked
pub const KICK_NOTICE: &str = "You have been kicked from the server";

/// Events submitted to the coordinator
///
/// Arrival order at the event loop is the only ordering guarantee the
/// server makes. Requests that need an answer carry a oneshot reply sender
/// owned by the caller.
pub enum Event {
    /// Atomic name check + admission for a new connection
    TryJoin {
        name: String,
        addr: SocketAddr,
        writer: BoxWriter,
        shutdown: oneshot::Sender<()>,
        reply: oneshot::Sender<JoinReply>,
    },
    /// Chat line from a connected client
    Message {
        id: ClientId,
        name: String,
        text: String,
    },
    /// Client gone: read failure, EOF, timeout, or worker write failure
    Leave { id: ClientId, name: String },
    /// Administrative announcement to every client, no sender exclusion
    Broadcast { text: String },
    /// Forcibly disconnect one client by name
    Kick { name: String },
    /// Invoke a registered command
    Execute { name: String, args: Vec<String> },
    /// Snapshot of connected clients for command handlers
    Clients {
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
    /// Snapshot of registered command names
    Commands { reply: oneshot::Sender<Vec<String>> },
}

/// Reply to a `TryJoin` request
///
/// On rejection the transport writer travels back to the session, which
/// still has to deliver the rejection line on it.
pub enum JoinReply {
    /// Admitted; the send worker is running and the registry entry exists
    Admitted { id: ClientId },
    /// The name is already connected
    NameTaken { writer: BoxWriter },
}

/// One row of the `Clients` snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub name: String,
    pub addr: SocketAddr,
}

/// Cloneable submission endpoint for coordinator events
///
/// Held by sessions, send workers, the admin console, and command handlers.
/// This is the whole public operation surface of the coordinator; nothing
/// outside the event loop ever touches the registry itself.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::Sender<Event>,
}

impl CoordinatorHandle {
    pub(crate) fn new(events: mpsc::Sender<Event>) -> Self {
        Self { events }
    }

    async fn submit(&self, event: Event) -> Result<(), AppError> {
        self.events
            .send(event)
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Atomically check the name and, if free, admit the client.
    pub async fn try_join(
        &self,
        name: String,
        addr: SocketAddr,
        writer: BoxWriter,
        shutdown: oneshot::Sender<()>,
    ) -> Result<JoinReply, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Event::TryJoin {
            name,
            addr,
            writer,
            shutdown,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Submit one chat line on behalf of a connected client.
    pub async fn message(
        &self,
        id: ClientId,
        name: String,
        text: String,
    ) -> Result<(), AppError> {
        self.submit(Event::Message { id, name, text }).await
    }

    /// Report a client as gone. Safe to submit more than once.
    pub async fn leave(&self, id: ClientId, name: String) -> Result<(), AppError> {
        self.submit(Event::Leave { id, name }).await
    }

    /// Announce a line to every connected client.
    pub async fn broadcast(&self, text: String) -> Result<(), AppError> {
        self.submit(Event::Broadcast { text }).await
    }

    /// Forcibly disconnect the named client.
    pub async fn kick(&self, name: String) -> Result<(), AppError> {
        self.submit(Event::Kick { name }).await
    }

    /// Invoke a registered command by name.
    pub async fn execute(&self, name: String, args: Vec<String>) -> Result<(), AppError> {
        self.submit(Event::Execute { name, args }).await
    }

    /// Snapshot the connected clients, sorted by name.
    pub async fn clients(&self) -> Result<Vec<ClientInfo>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Event::Clients { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Snapshot the registered command names, sorted.
    pub async fn commands(&self) -> Result<Vec<String>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Event::Commands { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }
}

/// The coordinator actor
///
/// Sole owner of the registry. Commands are registered before construction;
/// moving the registry in here is what makes "no registration after start"
/// hold by construction.
pub struct Coordinator {
    /// All connected clients: name -> Client
    registry: HashMap<String, Client>,
    /// Immutable command registry
    commands: CommandRegistry,
    /// Event receiver channel
    events: mpsc::Receiver<Event>,
    /// Kept for spawned workers and command handlers to re-enter the loop
    handle: CoordinatorHandle,
}

impl Coordinator {
    /// Create a coordinator and the handle used to reach it.
    pub fn new(commands: CommandRegistry) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let handle = CoordinatorHandle::new(tx);
        let coordinator = Self {
            registry: HashMap::new(),
            commands,
            events: rx,
            handle: handle.clone(),
        };
        (coordinator, handle)
    }

    /// Run the event loop.
    ///
    /// Processes events until every handle is dropped. Never performs
    /// transport I/O and never awaits inside an event, so one event can
    /// never delay the next behind a slow peer.
    pub async fn run(mut self) {
        info!("coordinator started");

        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }

        info!("coordinator shutting down");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::TryJoin {
                name,
                addr,
                writer,
                shutdown,
                reply,
            } => self.handle_try_join(name, addr, writer, shutdown, reply),
            Event::Message { id, name, text } => self.handle_message(id, name, text),
            Event::Leave { id, name } => self.handle_leave(id, &name),
            Event::Broadcast { text } => self.handle_broadcast(&text),
            Event::Kick { name } => self.handle_kick(&name),
            Event::Execute { name, args } => self.handle_execute(&name, args),
            Event::Clients { reply } => {
                let _ = reply.send(self.client_snapshot());
            }
            Event::Commands { reply } => {
                let _ = reply.send(self.commands.names());
            }
        }
    }

    /// Name check and admission in one turn, closing the check-then-join
    /// race: no other event can claim the name between the two steps.
    fn handle_try_join(
        &mut self,
        name: String,
        addr: SocketAddr,
        writer: BoxWriter,
        shutdown: oneshot::Sender<()>,
        reply: oneshot::Sender<JoinReply>,
    ) {
        if self.registry.contains_key(&name) {
            debug!("join rejected, name '{}' already connected", name);
            let _ = reply.send(JoinReply::NameTaken { writer });
            return;
        }

        let id = ClientId::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        tokio::spawn(worker::run(
            id,
            name.clone(),
            writer,
            outbound_rx,
            self.handle.clone(),
        ));
        self.registry.insert(
            name.clone(),
            Client::new(id, name.clone(), addr, outbound_tx, shutdown),
        );

        if reply.send(JoinReply::Admitted { id }).is_err() {
            // The session died before hearing the answer; undo the admission
            // without announcing a join nobody saw.
            self.registry.remove(&name);
            return;
        }

        info!("{} ({}) has connected to the server", name, addr);
        self.fan_out(&format!("{} has connected to the server", name), Some(id));
    }

    fn handle_message(&mut self, id: ClientId, name: String, text: String) {
        // Only registered clients may speak; an in-flight line from a client
        // removed earlier this turn-order is dropped, never half-delivered.
        let sender_live = matches!(self.registry.get(&name), Some(c) if c.id == id);
        if !sender_live {
            debug!("message from unregistered client '{}' dropped", name);
            return;
        }

        let formatted = format!("{}: {}", name, text);
        info!("{}", formatted);
        self.fan_out(&formatted, Some(id));
    }

    /// Remove a client if, and only if, this leave matches the admission id.
    /// A second leave for the same client, or a stale leave for a name that
    /// has since re-joined, is a no-op.
    fn handle_leave(&mut self, id: ClientId, name: &str) {
        let present = matches!(self.registry.get(name), Some(c) if c.id == id);
        if present {
            self.remove_and_announce(name);
        }
    }

    fn handle_broadcast(&mut self, text: &str) {
        debug!("broadcast: {}", text);
        self.fan_out(text, None);
    }

    fn handle_kick(&mut self, name: &str) {
        match self.registry.remove(name) {
            Some(client) => {
                // The notice rides the queue ahead of the close, so the
                // worker delivers it and then shuts the transport down.
                let _ = client.try_enqueue(KICK_NOTICE);
                info!("{} ({}) has been kicked from the server", client.name, client.addr);
                self.fan_out(&format!("{} has been kicked from the server", client.name), None);
            }
            None => warn!("kick: no connected client named '{}'", name),
        }
    }

    fn handle_execute(&mut self, name: &str, args: Vec<String>) {
        match self.commands.get(name) {
            Some(command) => {
                debug!("executing command '{}'", name);
                // Handlers run on their own task and re-enter through the
                // event channel; the loop never blocks on handler logic.
                tokio::spawn(command.invoke(self.handle.clone(), args));
            }
            None => println!("No such command exists"),
        }
    }

    fn client_snapshot(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<ClientInfo> = self
            .registry
            .values()
            .map(|c| ClientInfo {
                name: c.name.clone(),
                addr: c.addr,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Enqueue one line on every connected client's queue, except the
    /// excluded sender. Clients whose queue is full or closed are dropped
    /// from the registry afterwards and announced as disconnected.
    fn fan_out(&mut self, line: &str, exclude: Option<ClientId>) {
        let mut stale = Vec::new();
        for client in self.registry.values() {
            if exclude == Some(client.id) {
                continue;
            }
            if let Err(e) = client.try_enqueue(line) {
                stale.push((client.name.clone(), e));
            }
        }
        for (name, e) in stale {
            warn!("dropping unresponsive client '{}': {}", name, e);
            self.remove_and_announce(&name);
        }
    }

    fn remove_and_announce(&mut self, name: &str) {
        if let Some(client) = self.registry.remove(name) {
            info!("{} ({}) has disconnected from the server", client.name, client.addr);
            self.fan_out(
                &format!("{} has disconnected from the server", client.name),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream, Lines};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    type RemoteLines = Lines<BufReader<DuplexStream>>;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:6000".parse().unwrap()
    }

    fn start() -> CoordinatorHandle {
        let (coordinator, handle) = Coordinator::new(CommandRegistry::with_builtins());
        tokio::spawn(coordinator.run());
        handle
    }

    async fn join(handle: &CoordinatorHandle, name: &str) -> (ClientId, RemoteLines) {
        let (local, remote) = duplex(4096);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let reply = handle
            .try_join(name.to_string(), test_addr(), Box::new(local), shutdown_tx)
            .await
            .unwrap();
        match reply {
            JoinReply::Admitted { id } => (id, BufReader::new(remote).lines()),
            JoinReply::NameTaken { .. } => panic!("unexpected rejection for '{}'", name),
        }
    }

    async fn next_line(lines: &mut RemoteLines) -> String {
        timeout(WAIT, lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("unexpected EOF")
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let handle = start();
        let (_alice, _alice_lines) = join(&handle, "carol").await;

        let (local, _remote) = duplex(4096);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let reply = handle
            .try_join("carol".to_string(), test_addr(), Box::new(local), shutdown_tx)
            .await
            .unwrap();

        assert!(matches!(reply, JoinReply::NameTaken { .. }));
        let clients = handle.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "carol");
    }

    #[tokio::test]
    async fn test_join_announced_to_others_not_joiner() {
        let handle = start();
        let (_alice, mut alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;

        assert_eq!(next_line(&mut alice_lines).await, "bob has connected to the server");

        // bob's first line must be the marker, not his own announcement
        handle.broadcast("marker".to_string()).await.unwrap();
        assert_eq!(next_line(&mut bob_lines).await, "marker");
    }

    #[tokio::test]
    async fn test_message_reaches_everyone_but_sender() {
        let handle = start();
        let (alice, mut alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;
        let (_carol, mut carol_lines) = join(&handle, "carol").await;
        // drain the join announcements alice and bob saw
        next_line(&mut alice_lines).await;
        next_line(&mut alice_lines).await;
        next_line(&mut bob_lines).await;

        handle
            .message(alice, "alice".to_string(), "hi".to_string())
            .await
            .unwrap();

        assert_eq!(next_line(&mut bob_lines).await, "alice: hi");
        assert_eq!(next_line(&mut carol_lines).await, "alice: hi");

        handle.broadcast("marker".to_string()).await.unwrap();
        assert_eq!(next_line(&mut alice_lines).await, "marker");
    }

    #[tokio::test]
    async fn test_scenario_join_then_message() {
        // bob is connected first, alice joins, alice says hi: bob's stream
        // shows the announcement and the message, in order, and nothing else.
        let handle = start();
        let (_bob, mut bob_lines) = join(&handle, "bob").await;
        let (alice, _alice_lines) = join(&handle, "alice").await;

        handle
            .message(alice, "alice".to_string(), "hi".to_string())
            .await
            .unwrap();

        assert_eq!(next_line(&mut bob_lines).await, "alice has connected to the server");
        assert_eq!(next_line(&mut bob_lines).await, "alice: hi");
    }

    #[tokio::test]
    async fn test_message_from_removed_sender_dropped() {
        let handle = start();
        let (alice, _alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;

        handle.leave(alice, "alice".to_string()).await.unwrap();
        handle
            .message(alice, "alice".to_string(), "ghost".to_string())
            .await
            .unwrap();

        handle.broadcast("marker".to_string()).await.unwrap();
        assert_eq!(next_line(&mut bob_lines).await, "alice has disconnected from the server");
        assert_eq!(next_line(&mut bob_lines).await, "marker");
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let handle = start();
        let (alice, _alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;

        handle.leave(alice, "alice".to_string()).await.unwrap();
        handle.leave(alice, "alice".to_string()).await.unwrap();

        // exactly one disconnect announcement
        handle.broadcast("marker".to_string()).await.unwrap();
        assert_eq!(next_line(&mut bob_lines).await, "alice has disconnected from the server");
        assert_eq!(next_line(&mut bob_lines).await, "marker");
        assert!(handle.clients().await.unwrap().iter().all(|c| c.name != "alice"));
    }

    #[tokio::test]
    async fn test_stale_leave_does_not_remove_rejoined_name() {
        let handle = start();
        let (old_id, _old_lines) = join(&handle, "alice").await;
        handle.leave(old_id, "alice".to_string()).await.unwrap();
        let (_new_id, _new_lines) = join(&handle, "alice").await;

        // a late leave from the first connection's worker must not touch
        // the re-joined client
        handle.leave(old_id, "alice".to_string()).await.unwrap();

        let clients = handle.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "alice");
    }

    #[tokio::test]
    async fn test_kick_notifies_target_and_announces() {
        let handle = start();
        let (_alice, mut alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;
        next_line(&mut alice_lines).await; // bob's join

        handle.kick("alice".to_string()).await.unwrap();

        assert_eq!(next_line(&mut alice_lines).await, KICK_NOTICE);
        // queue closed after the notice: the worker shuts the transport down
        let eof = timeout(WAIT, alice_lines.next_line()).await.unwrap().unwrap();
        assert!(eof.is_none());

        assert_eq!(next_line(&mut bob_lines).await, "alice has been kicked from the server");
        let clients = handle.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "bob");
    }

    #[tokio::test]
    async fn test_kick_unknown_name_is_noop() {
        let handle = start();
        let (_alice, _alice_lines) = join(&handle, "alice").await;

        handle.kick("ghost".to_string()).await.unwrap();

        assert_eq!(handle.clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let handle = start();
        let (_alice, mut alice_lines) = join(&handle, "alice").await;
        let (_bob, mut bob_lines) = join(&handle, "bob").await;
        next_line(&mut alice_lines).await; // bob's join

        handle.broadcast("[admin] maintenance soon".to_string()).await.unwrap();

        assert_eq!(next_line(&mut alice_lines).await, "[admin] maintenance soon");
        assert_eq!(next_line(&mut bob_lines).await, "[admin] maintenance soon");
    }

    #[tokio::test]
    async fn test_slow_client_disconnected_on_queue_overflow() {
        let handle = start();

        // 1-byte pipe that nobody reads: the worker wedges on the first
        // write and the queue fills behind it
        let (local, _remote) = duplex(1);
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();
        let reply = handle
            .try_join("snail".to_string(), test_addr(), Box::new(local), shutdown_tx)
            .await
            .unwrap();
        assert!(matches!(reply, JoinReply::Admitted { .. }));
        let (_bob, mut bob_lines) = join(&handle, "bob").await;

        for i in 0..(OUTBOUND_BUFFER_SIZE + 8) {
            handle.broadcast(format!("m{}", i)).await.unwrap();
            // let bob's worker keep draining so only snail backs up
            tokio::task::yield_now().await;
        }

        let clients = handle.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "bob");

        // bob keeps receiving and eventually sees snail's disconnect
        let mut saw_disconnect = false;
        for _ in 0..(OUTBOUND_BUFFER_SIZE + 10) {
            if next_line(&mut bob_lines).await == "snail has disconnected from the server" {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
    }

    #[tokio::test]
    async fn test_clients_snapshot_empty_registry() {
        let handle = start();
        assert!(handle.clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commands_snapshot_sorted_builtins() {
        let handle = start();
        let names = handle.commands().await.unwrap();
        assert_eq!(names, vec!["help", "kick", "kickall", "list"]);
    }

    #[tokio::test]
    async fn test_execute_unknown_command_keeps_loop_alive() {
        let handle = start();
        handle.execute("frobnicate".to_string(), vec![]).await.unwrap();
        assert!(handle.clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kick_command_removes_client() {
        let handle = start();
        let (_alice, _alice_lines) = join(&handle, "alice").await;
        let (_bob, _bob_lines) = join(&handle, "bob").await;

        handle
            .execute("kick".to_string(), vec!["alice".to_string()])
            .await
            .unwrap();

        timeout(WAIT, async {
            loop {
                let clients = handle.clients().await.unwrap();
                if clients.len() == 1 && clients[0].name == "bob" {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("kick command never took effect");
    }

    #[tokio::test]
    async fn test_kickall_command_empties_registry() {
        let handle = start();
        let (_alice, _alice_lines) = join(&handle, "alice").await;
        let (_bob, _bob_lines) = join(&handle, "bob").await;

        handle.execute("kickall".to_string(), vec![]).await.unwrap();

        timeout(WAIT, async {
            loop {
                if handle.clients().await.unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("kickall command never took effect");
    }
}
