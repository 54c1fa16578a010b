use std::sync::Arc;

use async_trait::async_trait;
use domains::{DomainError, DomainResult, TagBody};

use crate::commands::args::split_first;
use crate::commands::{CommandContext, CommandHandler, CommandReply, HandlerKind};
use crate::tags::TagService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    Invoke,
    Set,
    Alias,
    Delete,
    List,
    Source,
    History,
}

/// One handler per tag command, sharing the [`TagService`].
pub struct TagHandler {
    tags: Arc<TagService>,
    action: TagAction,
}

impl TagHandler {
    pub fn new(tags: Arc<TagService>, action: TagAction) -> Self {
        Self { tags, action }
    }
}

fn required<'a>(ctx: &'a CommandContext, index: usize, what: &str) -> DomainResult<&'a str> {
    ctx.arg(index)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DomainError::Validation(format!("missing {what}")))
}

#[async_trait]
impl CommandHandler for TagHandler {
    fn kind(&self) -> HandlerKind {
        match self.action {
            TagAction::Invoke => HandlerKind::TagInvoke,
            _ => HandlerKind::Utility,
        }
    }

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply> {
        let guild = ctx.identity.guild_id;
        let now = ctx.event.timestamp;

        match self.action {
            TagAction::Invoke => {
                let name = required(&ctx, 0, "tag name")?;
                let rendered =
                    self.tags.render(guild, name, &ctx.args[1..], &ctx.identity, now).await?;
                if rendered.trim().is_empty() {
                    Ok(CommandReply::Silent)
                } else {
                    Ok(CommandReply::Message(rendered))
                }
            }
            TagAction::Set => {
                // The body is taken verbatim so escapes and quotes survive.
                let (name, body) = split_first(&ctx.raw_args)
                    .filter(|(_, body)| !body.is_empty())
                    .ok_or_else(|| DomainError::Validation("usage: tagset <name> <body>".into()))?;
                let tag = self.tags.define(guild, name, body, ctx.identity.user_id, now).await?;
                Ok(CommandReply::message(format!(
                    "Saved tag `{}` (version {}).",
                    tag.name, tag.version
                )))
            }
            TagAction::Alias => {
                let alias = required(&ctx, 0, "alias name")?;
                let target = required(&ctx, 1, "target tag")?;
                let tag = self
                    .tags
                    .define_alias(guild, alias, target, ctx.identity.user_id, now)
                    .await?;
                Ok(CommandReply::message(format!("`{}` now points at `{}`.", tag.name, target)))
            }
            TagAction::Delete => {
                let name = required(&ctx, 0, "tag name")?;
                self.tags.delete(guild, name).await?;
                Ok(CommandReply::message(format!("Deleted tag `{}`.", name.to_lowercase())))
            }
            TagAction::List => {
                let names = self.tags.list(guild).await?;
                if names.is_empty() {
                    return Ok(CommandReply::message("No tags defined yet."));
                }
                Ok(CommandReply::message(format!("Tags ({}): {}", names.len(), names.join(", "))))
            }
            TagAction::Source => {
                let tag = self.tags.get(guild, required(&ctx, 0, "tag name")?).await?;
                let text = match &tag.body {
                    TagBody::Text(source) => {
                        format!("`{}` (version {}):\n```\n{source}\n```", tag.name, tag.version)
                    }
                    TagBody::Alias(target) => format!("`{}` is an alias of `{target}`.", tag.name),
                };
                Ok(CommandReply::Message(text))
            }
            TagAction::History => {
                let name = required(&ctx, 0, "tag name")?;
                let current = self.tags.get(guild, name).await?;
                let revisions = self.tags.history(guild, name).await?;

                let mut lines = vec![format!(
                    "`{}` is at version {}, last edited by <@{}> at {}.",
                    current.name,
                    current.version,
                    current.last_editor_id,
                    current.last_edited_at.format("%Y-%m-%d %H:%M UTC")
                )];
                for revision in revisions.iter().rev() {
                    lines.push(format!(
                        "v{} by <@{}> at {}",
                        revision.version,
                        revision.editor_id,
                        revision.edited_at.format("%Y-%m-%d %H:%M UTC")
                    ));
                }
                Ok(CommandReply::Message(lines.join("\n")))
            }
        }
    }
}
