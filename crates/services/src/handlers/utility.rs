use async_trait::async_trait;
use chrono::Duration;
use domains::{DomainError, DomainResult};

use crate::commands::args::format_duration;
use crate::commands::{CommandContext, CommandHandler, CommandReply, HandlerKind};

/// `help [command]`. Only lists what the caller is allowed to run.
pub struct HelpHandler {
    prefix: String,
}

impl HelpHandler {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Utility
    }

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply> {
        let prefix = &self.prefix;

        if let Some(name) = ctx.arg(0) {
            let command = ctx
                .registry
                .find(name.trim_start_matches(prefix.as_str()))
                .filter(|command| command.required_level <= ctx.level)
                .ok_or_else(|| DomainError::not_found("command", name))?;

            let mut lines = vec![format!("`{prefix}{}`", command.usage)];
            if !command.help.is_empty() {
                lines.push(command.help.clone());
            }
            if !command.aliases.is_empty() {
                lines.push(format!("aliases: {}", command.aliases.join(", ")));
            }
            lines.push(format!("level: {}", command.required_level));
            if command.cooldown > Duration::zero() {
                lines.push(format!("cooldown: {}", format_duration(command.cooldown)));
            }
            return Ok(CommandReply::Message(lines.join("\n")));
        }

        let lines: Vec<String> = ctx
            .registry
            .commands()
            .filter(|command| command.required_level <= ctx.level)
            .map(|command| format!("`{prefix}{}`: {}", command.name, command.help))
            .collect();
        Ok(CommandReply::Message(lines.join("\n")))
    }
}
