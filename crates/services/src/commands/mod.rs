//! # Commands
//!
//! A command is a name, its aliases, an authorization requirement, a cooldown
//! and a handler. Handlers are one capability, [`CommandHandler::execute`],
//! tagged with the [`HandlerKind`] they belong to.

pub mod args;
pub mod cooldown;
pub mod dispatcher;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use domains::{DomainResult, Identity, MessageEvent, PermissionLevel};

pub use cooldown::CooldownTable;
pub use dispatcher::{DispatchOutcome, Dispatcher, Prefixes};
pub use registry::CommandRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    TagInvoke,
    Moderation,
    Utility,
    Admin,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerKind::TagInvoke => "tags",
            HandlerKind::Moderation => "moderation",
            HandlerKind::Utility => "utility",
            HandlerKind::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// What a handler wants sent back to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Message(String),
    Silent,
}

impl CommandReply {
    pub fn message(text: impl Into<String>) -> Self {
        CommandReply::Message(text.into())
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            CommandReply::Message(text) => Some(text),
            CommandReply::Silent => None,
        }
    }
}

/// Everything a handler gets to see about one invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub event: MessageEvent,
    pub identity: Identity,
    /// The invoker's resolved level.
    pub level: PermissionLevel,
    /// Canonical name of the command being run.
    pub command: String,
    /// Tokenized argument text.
    pub args: Vec<String>,
    /// Argument text exactly as typed, after the command name.
    pub raw_args: String,
    pub registry: Arc<CommandRegistry>,
}

impl CommandContext {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply>;
}

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub required_level: PermissionLevel,
    pub cooldown: Duration,
    pub usage: String,
    pub help: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Everyone may run it, no cooldown. Names are stored lowercase.
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        let name = name.into().to_lowercase();
        Self {
            usage: name.clone(),
            name,
            aliases: Vec::new(),
            required_level: PermissionLevel::Everyone,
            cooldown: Duration::zero(),
            help: String::new(),
            handler,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    pub fn level(mut self, level: PermissionLevel) -> Self {
        self.required_level = level;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }

    /// The name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("required_level", &self.required_level)
            .field("cooldown", &self.cooldown)
            .field("kind", &self.handler.kind())
            .finish()
    }
}
