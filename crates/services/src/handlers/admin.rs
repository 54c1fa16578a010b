use std::sync::Arc;

use async_trait::async_trait;
use domains::{
    DomainError, DomainResult, Identity, PermissionLevel, PermissionOverride, RoleId, SubjectType,
    UserId,
};

use crate::commands::{CommandContext, CommandHandler, CommandReply, HandlerKind};
use crate::permissions::PermissionResolver;

const USAGE: &str =
    "usage: perm set <user|role> <id> <level> | perm clear <user|role> <id> | perm list | perm check [user]";

/// `perm`: inspect and edit the guild's permission overrides.
///
/// `check` is open to everyone; the other subcommands need Administrator,
/// and nobody can hand out a level above their own or change the override of
/// a subject that ranks above them.
pub struct PermHandler {
    permissions: Arc<PermissionResolver>,
}

impl PermHandler {
    pub fn new(permissions: Arc<PermissionResolver>) -> Self {
        Self { permissions }
    }

    fn require_admin(ctx: &CommandContext) -> DomainResult<()> {
        if ctx.level < PermissionLevel::Administrator {
            return Err(DomainError::Unauthorized(format!(
                "managing permissions requires the administrator level; you are {}",
                ctx.level
            )));
        }
        Ok(())
    }

    fn subject(ctx: &CommandContext) -> DomainResult<(SubjectType, u64)> {
        let subject: SubjectType = ctx
            .arg(1)
            .ok_or_else(|| DomainError::Validation(USAGE.into()))?
            .parse()?;
        let raw = ctx.arg(2).ok_or_else(|| DomainError::Validation(USAGE.into()))?;
        let id = match subject {
            SubjectType::User => raw.parse::<UserId>()?.0,
            SubjectType::Role => raw.parse::<RoleId>()?.0,
        };
        Ok((subject, id))
    }

    /// Refuses to touch an override that ranks above the caller.
    async fn require_outranks(
        &self,
        ctx: &CommandContext,
        subject: SubjectType,
        id: u64,
    ) -> DomainResult<()> {
        let overrides = self.permissions.overrides(ctx.identity.guild_id).await?;
        let existing = overrides
            .iter()
            .find(|entry| entry.subject == subject && entry.subject_id == id);
        match existing {
            Some(entry) if entry.level > ctx.level => Err(DomainError::Unauthorized(format!(
                "{} is {}, which is above your own level",
                mention(subject, id),
                entry.level
            ))),
            _ => Ok(()),
        }
    }
}

fn mention(subject: SubjectType, id: u64) -> String {
    match subject {
        SubjectType::User => format!("<@{id}>"),
        SubjectType::Role => format!("<@&{id}>"),
    }
}

#[async_trait]
impl CommandHandler for PermHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Admin
    }

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply> {
        let guild = ctx.identity.guild_id;
        let sub = ctx.arg(0).map(str::to_ascii_lowercase).unwrap_or_default();

        match sub.as_str() {
            "set" => {
                Self::require_admin(&ctx)?;
                let (subject, id) = Self::subject(&ctx)?;
                let level: PermissionLevel = ctx
                    .arg(3)
                    .ok_or_else(|| DomainError::Validation(USAGE.into()))?
                    .parse()?;
                if level > ctx.level {
                    return Err(DomainError::Unauthorized(format!(
                        "you cannot grant {level}, which is above your own level"
                    )));
                }
                self.require_outranks(&ctx, subject, id).await?;
                self.permissions
                    .grant(PermissionOverride { guild_id: guild, subject, subject_id: id, level })
                    .await?;
                Ok(CommandReply::message(format!("{} is now {level}.", mention(subject, id))))
            }
            "clear" => {
                Self::require_admin(&ctx)?;
                let (subject, id) = Self::subject(&ctx)?;
                self.require_outranks(&ctx, subject, id).await?;
                self.permissions.revoke(guild, subject, id).await?;
                Ok(CommandReply::message(format!("Cleared the override for {}.", mention(subject, id))))
            }
            "list" => {
                Self::require_admin(&ctx)?;
                let overrides = self.permissions.overrides(guild).await?;
                if overrides.is_empty() {
                    return Ok(CommandReply::message("No permission overrides in this guild."));
                }
                let lines: Vec<String> = overrides
                    .iter()
                    .map(|entry| format!("{}: {}", mention(entry.subject, entry.subject_id), entry.level))
                    .collect();
                Ok(CommandReply::Message(lines.join("\n")))
            }
            "check" => {
                let identity = match ctx.arg(1) {
                    // Roles of other users are not known here; direct overrides only.
                    Some(raw) => Identity::new(raw.parse()?, guild),
                    None => ctx.identity.clone(),
                };
                let level = self.permissions.resolve(&identity).await?;
                Ok(CommandReply::message(format!("<@{}> is {level}.", identity.user_id)))
            }
            _ => Err(DomainError::Validation(USAGE.into())),
        }
    }
}
