//! Name and alias lookup for registered commands.
//!
//! Filled once at startup, then shared read-only behind an `Arc`.

use std::collections::HashMap;

use domains::{DomainError, DomainResult};
use tracing::debug;

use super::Command;

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    /// Lowercased name or alias to index in `commands`.
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `DuplicateName` if any name or alias of `command` is taken,
    /// including twice within the command itself; the registry is unchanged
    /// on failure.
    pub fn register(&mut self, command: Command) -> DomainResult<()> {
        let mut seen = Vec::new();
        for name in command.names() {
            if name.is_empty() {
                return Err(DomainError::Validation("command names cannot be empty".into()));
            }
            if self.index.contains_key(name) || seen.contains(&name) {
                return Err(DomainError::DuplicateName(name.to_string()));
            }
            seen.push(name);
        }

        let slot = self.commands.len();
        for name in command.names() {
            self.index.insert(name.to_string(), slot);
        }
        debug!(command = %command.name, aliases = ?command.aliases, "command registered");
        self.commands.push(command);
        Ok(())
    }

    /// Case-insensitive lookup by name or alias.
    pub fn find(&self, name: &str) -> Option<&Command> {
        self.index
            .get(&name.to_lowercase())
            .and_then(|&slot| self.commands.get(slot))
    }

    /// Commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
