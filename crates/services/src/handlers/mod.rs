//! Built-in commands.

pub mod admin;
pub mod moderation;
pub mod tags;
pub mod utility;

use std::sync::Arc;

use chrono::Duration;
use domains::{DomainResult, ModerationKind, PermissionLevel};

use crate::commands::dispatcher::TAG_COMMAND;
use crate::commands::{Command, CommandRegistry};
use crate::moderation::ModerationLedger;
use crate::permissions::PermissionResolver;
use crate::tags::TagService;

pub use admin::PermHandler;
pub use moderation::{ModStatusHandler, ModerationHandler};
pub use tags::{TagAction, TagHandler};
pub use utility::HelpHandler;

pub const TAG_COOLDOWN_SECS: i64 = 3;

/// The services the built-in handlers run against.
#[derive(Clone)]
pub struct Services {
    pub tags: Arc<TagService>,
    pub ledger: Arc<ModerationLedger>,
    pub permissions: Arc<PermissionResolver>,
}

/// Registers every built-in command. `prefix` is only used for help text.
pub fn register_builtins(
    registry: &mut CommandRegistry,
    services: &Services,
    prefix: &str,
) -> DomainResult<()> {
    let tag = |action| Arc::new(TagHandler::new(Arc::clone(&services.tags), action));
    let moderate = |kind| Arc::new(ModerationHandler::new(Arc::clone(&services.ledger), kind));

    registry.register(
        Command::new(TAG_COMMAND, tag(TagAction::Invoke))
            .alias("t")
            .cooldown(Duration::seconds(TAG_COOLDOWN_SECS))
            .usage("tag <name> [args...]")
            .help("Show a tag."),
    )?;
    registry.register(
        Command::new("tagset", tag(TagAction::Set))
            .level(PermissionLevel::Helper)
            .usage("tagset <name> <body...>")
            .help("Create or overwrite a tag."),
    )?;
    registry.register(
        Command::new("tagalias", tag(TagAction::Alias))
            .level(PermissionLevel::Helper)
            .usage("tagalias <alias> <target>")
            .help("Make one tag name render another."),
    )?;
    registry.register(
        Command::new("tagdel", tag(TagAction::Delete))
            .level(PermissionLevel::Helper)
            .usage("tagdel <name>")
            .help("Delete a tag and its history."),
    )?;
    registry.register(
        Command::new("tags", tag(TagAction::List)).usage("tags").help("List the tags in this guild."),
    )?;
    registry.register(
        Command::new("tagsource", tag(TagAction::Source))
            .usage("tagsource <name>")
            .help("Show the raw body of a tag."),
    )?;
    registry.register(
        Command::new("taghistory", tag(TagAction::History))
            .usage("taghistory <name>")
            .help("Show the edit history of a tag."),
    )?;

    for (kind, help) in [
        (ModerationKind::Warn, "Warn a user."),
        (ModerationKind::Mute, "Mute a user, optionally for a duration like 30m, 2h or 7d."),
        (ModerationKind::Ban, "Ban a user, optionally for a duration like 30m, 2h or 7d."),
    ] {
        let usage = match kind {
            ModerationKind::Warn => format!("{kind} <user> <reason...>"),
            _ => format!("{kind} <user> [duration] <reason...>"),
        };
        registry.register(
            Command::new(kind.as_str(), moderate(kind))
                .level(PermissionLevel::Moderator)
                .usage(usage)
                .help(help),
        )?;
    }
    for (kind, help) in [
        (ModerationKind::Unmute, "Lift a user's mute."),
        (ModerationKind::Unban, "Lift a user's ban."),
    ] {
        registry.register(
            Command::new(kind.as_str(), moderate(kind))
                .level(PermissionLevel::Moderator)
                .usage(format!("{kind} <user> [reason...]"))
                .help(help),
        )?;
    }
    registry.register(
        Command::new("modstatus", Arc::new(ModStatusHandler::new(Arc::clone(&services.ledger))))
            .level(PermissionLevel::Helper)
            .usage("modstatus <user>")
            .help("Show a user's active warnings, mutes and bans."),
    )?;

    registry.register(
        Command::new("perm", Arc::new(PermHandler::new(Arc::clone(&services.permissions))))
            .usage("perm set|clear|list|check ...")
            .help("Inspect or manage permission overrides."),
    )?;
    registry.register(
        Command::new("help", Arc::new(HelpHandler::new(prefix)))
            .usage("help [command]")
            .help("List the commands you can use."),
    )?;
    Ok(())
}
