//! Command registry and console-line parsing
//!
//! Commands are registered before the coordinator starts; moving the
//! finished registry into the coordinator is what rules out registration
//! racing the event loop. Handlers only see the coordinator through its
//! handle, so everything they do re-enters the event channel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::coordinator::CoordinatorHandle;

/// Default prefix marking an admin line as a command invocation
pub const COMMAND_PREFIX: char = '/';

type Handler =
    Arc<dyn Fn(CoordinatorHandle, Vec<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A named command with its type-erased async handler
pub struct Command {
    pub name: String,
    handler: Handler,
}

impl Command {
    /// Build the handler future; the coordinator spawns it on its own task.
    pub fn invoke(
        &self,
        coordinator: CoordinatorHandle,
        args: Vec<String>,
    ) -> BoxFuture<'static, ()> {
        (self.handler)(coordinator, args)
    }
}

/// Registry of administrative commands, append-only and only before start
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Create a registry with the built-in commands: `help`, `list`,
    /// `kick <name>`, `kickall`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("help", help);
        registry.register("list", list);
        registry.register("kick", kick);
        registry.register("kickall", kickall);
        registry
    }

    /// Register a command, replacing any previous handler under that name.
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(CoordinatorHandle, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |coordinator, args| handler(coordinator, args).boxed());
        self.commands.insert(
            name.to_string(),
            Command {
                name: name.to_string(),
                handler,
            },
        );
    }

    /// Look a command up by exact name
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// All registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

/// One parsed admin console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// `<prefix><name> [args...]`
    Command { name: String, args: Vec<String> },
    /// Plain text: broadcast to the room with the admin tag
    Chat(String),
    /// The prefix with no command token behind it
    Invalid,
    /// Blank line
    Empty,
}

/// Split an operator line into a command invocation, admin chat, or noise.
pub fn parse_console_line(line: &str, prefix: char) -> ConsoleInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Empty;
    }
    let Some(rest) = trimmed.strip_prefix(prefix) else {
        return ConsoleInput::Chat(trimmed.to_string());
    };
    let mut parts = rest.split_whitespace();
    match parts.next() {
        Some(name) => ConsoleInput::Command {
            name: name.to_string(),
            args: parts.map(str::to_string).collect(),
        },
        None => ConsoleInput::Invalid,
    }
}

async fn help(coordinator: CoordinatorHandle, _args: Vec<String>) {
    let Ok(names) = coordinator.commands().await else {
        return;
    };
    println!("List of commands: {}", names.join(", "));
}

async fn list(coordinator: CoordinatorHandle, _args: Vec<String>) {
    let Ok(clients) = coordinator.clients().await else {
        return;
    };
    println!("{} connected client(s)", clients.len());
    for client in clients {
        println!("  {} ({})", client.name, client.addr);
    }
}

async fn kick(coordinator: CoordinatorHandle, args: Vec<String>) {
    match args.first() {
        Some(name) => {
            let _ = coordinator.kick(name.clone()).await;
        }
        None => println!("Usage: {}kick <name>", COMMAND_PREFIX),
    }
}

async fn kickall(coordinator: CoordinatorHandle, _args: Vec<String>) {
    let Ok(clients) = coordinator.clients().await else {
        return;
    };
    for client in clients {
        let _ = coordinator.kick(client.name).await;
    }
}
