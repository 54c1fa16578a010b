use std::sync::Arc;

use async_trait::async_trait;
use domains::{DomainError, DomainResult, ModerationAction, ModerationKind, UserId};

use crate::commands::args::{format_duration, parse_duration};
use crate::commands::{CommandContext, CommandHandler, CommandReply, HandlerKind};
use crate::moderation::{ModerationLedger, SANCTIONS};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

fn target_user(ctx: &CommandContext) -> DomainResult<UserId> {
    ctx.arg(0)
        .ok_or_else(|| DomainError::Validation("missing user".into()))?
        .parse()
}

/// `warn`, `mute`, `ban`, `unmute` and `unban`: appends one ledger entry.
pub struct ModerationHandler {
    ledger: Arc<ModerationLedger>,
    kind: ModerationKind,
}

impl ModerationHandler {
    pub fn new(ledger: Arc<ModerationLedger>, kind: ModerationKind) -> Self {
        Self { ledger, kind }
    }
}

#[async_trait]
impl CommandHandler for ModerationHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Moderation
    }

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply> {
        let guild = ctx.identity.guild_id;
        let now = ctx.event.timestamp;
        let user = target_user(&ctx)?;
        if user == ctx.identity.user_id {
            return Err(DomainError::Validation("you cannot moderate yourself".into()));
        }

        let mut rest = &ctx.args[1..];
        let duration = match (self.kind, rest.first()) {
            (ModerationKind::Mute | ModerationKind::Ban, Some(first)) => {
                let parsed = parse_duration(first);
                if parsed.is_some() {
                    rest = &rest[1..];
                }
                parsed
            }
            _ => None,
        };
        let reason = rest.join(" ");

        if let Some(revoked) = self.kind.revokes() {
            let standing = self.ledger.query_active_at(guild, user, &[revoked], now).await?;
            if !standing.is_active() {
                return Err(DomainError::Validation(format!(
                    "<@{user}> is not {}",
                    revoked.describe()
                )));
            }
        } else if reason.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "usage: {} <user> {}<reason>",
                self.kind,
                if matches!(self.kind, ModerationKind::Warn) { "" } else { "[duration] " }
            )));
        }

        let reason = if reason.trim().is_empty() { "no reason given".to_string() } else { reason };
        let mut action =
            ModerationAction::new(guild, user, self.kind, ctx.identity.user_id, reason, now);
        if let Some(duration) = duration {
            let expires_at = now
                .checked_add_signed(duration)
                .ok_or_else(|| DomainError::Validation("duration too long".into()))?;
            action = action.expiring_at(expires_at);
        }
        let reply = match duration {
            Some(duration) => format!(
                "<@{user}> has been {} for {}: {}",
                self.kind.describe(),
                format_duration(duration),
                action.reason
            ),
            None => format!("<@{user}> has been {}: {}", self.kind.describe(), action.reason),
        };
        self.ledger.append(action).await?;
        Ok(CommandReply::Message(reply))
    }
}

/// `modstatus <user>`: the derived standing of one user.
pub struct ModStatusHandler {
    ledger: Arc<ModerationLedger>,
}

impl ModStatusHandler {
    pub fn new(ledger: Arc<ModerationLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl CommandHandler for ModStatusHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Moderation
    }

    async fn execute(&self, ctx: CommandContext) -> DomainResult<CommandReply> {
        let guild = ctx.identity.guild_id;
        let now = ctx.event.timestamp;
        let user = target_user(&ctx)?;

        let warnings = self.ledger.query_active_at(guild, user, &[ModerationKind::Warn], now).await?;
        let muted = self.ledger.query_active_at(guild, user, &[ModerationKind::Mute], now).await?;
        let banned = self.ledger.query_active_at(guild, user, &[ModerationKind::Ban], now).await?;
        let overall = self.ledger.query_active_at(guild, user, &SANCTIONS, now).await?;

        let flag = |summary: &domains::ActiveSummary| match &summary.most_recent {
            Some(action) => match action.expires_at {
                Some(until) => format!("yes (until {})", until.format(TIME_FORMAT)),
                None => "yes".to_string(),
            },
            None => "no".to_string(),
        };

        let mut lines = vec![
            format!("Moderation status for <@{user}>:"),
            format!("active warnings: {}", warnings.count),
            format!("muted: {}", flag(&muted)),
            format!("banned: {}", flag(&banned)),
        ];
        if let Some(last) = overall.most_recent {
            lines.push(format!(
                "most recent: {} by <@{}> at {}: {}",
                last.kind,
                last.moderator_id,
                last.timestamp.format(TIME_FORMAT),
                last.reason
            ));
        }
        Ok(CommandReply::Message(lines.join("\n")))
    }
}
