//! # Dispatcher
//!
//! Routes one inbound [`MessageEvent`] to at most one command: prefix and
//! name match, permission check, cooldown, then the handler. Every outcome is
//! a value; nothing a handler does can take the dispatch loop down with it.

use std::sync::Arc;

use chrono::Duration;
use domains::{DomainError, MessageEvent, PermissionLevel};
use tracing::{debug, warn};

use super::args::{split_first, tokenize};
use super::{Command, CommandContext, CommandReply, CommandRegistry, CooldownTable};
use crate::permissions::PermissionResolver;

/// Name of the command the tag shorthand routes to.
pub const TAG_COMMAND: &str = "tag";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefixes {
    /// Marks a message as a command, e.g. `!help`.
    pub command: String,
    /// Shorthand for the tag command, e.g. `??faq`.
    pub tag: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self { command: "!".into(), tag: "??".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command. Nothing happened.
    NoMatch,
    Unauthorized { command: String, required: PermissionLevel, actual: PermissionLevel },
    RateLimited { command: String, retry_after: Duration },
    Completed { command: String, reply: CommandReply },
    HandlerError { command: String, error: DomainError },
}

impl DispatchOutcome {
    pub fn command(&self) -> Option<&str> {
        match self {
            DispatchOutcome::NoMatch => None,
            DispatchOutcome::Unauthorized { command, .. }
            | DispatchOutcome::RateLimited { command, .. }
            | DispatchOutcome::Completed { command, .. }
            | DispatchOutcome::HandlerError { command, .. } => Some(command),
        }
    }

    /// What the caller should post back to the channel, if anything: the
    /// handler's reply, or a short notice for denials and failures.
    pub fn reply_text(&self) -> Option<String> {
        match self {
            DispatchOutcome::NoMatch => None,
            DispatchOutcome::Completed { reply, .. } => reply.text().map(str::to_string),
            DispatchOutcome::Unauthorized { command, required, actual } => Some(format!(
                "`{command}` requires the {required} level; you are {actual}."
            )),
            DispatchOutcome::RateLimited { command, retry_after } => {
                let secs = (retry_after.num_milliseconds() + 999) / 1000;
                Some(format!("`{command}` is on cooldown, try again in {}s.", secs.max(1)))
            }
            DispatchOutcome::HandlerError { command, error } => Some(failure_notice(command, error)),
        }
    }
}

fn failure_notice(command: &str, error: &DomainError) -> String {
    match error {
        DomainError::NotFound { .. }
        | DomainError::Parse(_)
        | DomainError::Validation(_)
        | DomainError::Unauthorized(_) => error.to_string(),
        DomainError::EvaluationLimitExceeded(_) => {
            format!("`{command}` failed: the result was too large to send.")
        }
        DomainError::StorageUnavailable(_) => {
            "Storage is unavailable right now, please try again later.".to_string()
        }
        DomainError::DuplicateName(_) | DomainError::Internal(_) => {
            format!("Something went wrong running `{command}`.")
        }
    }
}

pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    resolver: Arc<PermissionResolver>,
    cooldowns: CooldownTable,
    prefixes: Prefixes,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        resolver: Arc<PermissionResolver>,
        prefixes: Prefixes,
    ) -> Self {
        Self { registry, resolver, cooldowns: CooldownTable::new(), prefixes }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    /// Safe to call concurrently for unrelated events.
    pub async fn dispatch(&self, event: MessageEvent) -> DispatchOutcome {
        if event.author_is_bot {
            return DispatchOutcome::NoMatch;
        }
        let Some((command, raw_args)) = self.route(&event.raw_text) else {
            return DispatchOutcome::NoMatch;
        };
        let name = command.name.clone();

        let identity = event.identity();
        let level = match self.resolver.resolve(&identity).await {
            Ok(level) => level,
            Err(error) => {
                warn!(command = %name, guild = %identity.guild_id, %error, "permission resolution failed");
                return DispatchOutcome::HandlerError { command: name, error };
            }
        };
        if level < command.required_level {
            debug!(command = %name, user = %identity.user_id, %level, "dispatch unauthorized");
            return DispatchOutcome::Unauthorized {
                command: name,
                required: command.required_level,
                actual: level,
            };
        }

        if command.cooldown > Duration::zero() {
            if let Err(retry_after) =
                self.cooldowns.try_acquire(identity.user_id, &name, command.cooldown, event.timestamp)
            {
                debug!(command = %name, user = %identity.user_id, "dispatch rate limited");
                return DispatchOutcome::RateLimited { command: name, retry_after };
            }
        }

        let ctx = CommandContext {
            args: tokenize(&raw_args),
            raw_args,
            identity,
            level,
            command: name.clone(),
            registry: Arc::clone(&self.registry),
            event,
        };
        let handler = Arc::clone(&command.handler);

        // A panicking handler only takes its own task down.
        match tokio::spawn(async move { handler.execute(ctx).await }).await {
            Ok(Ok(reply)) => {
                debug!(command = %name, "dispatch completed");
                DispatchOutcome::Completed { command: name, reply }
            }
            Ok(Err(error)) => {
                warn!(command = %name, %error, "command handler failed");
                DispatchOutcome::HandlerError { command: name, error }
            }
            Err(join_error) => {
                warn!(command = %name, error = %join_error, "command handler panicked");
                DispatchOutcome::HandlerError {
                    command: name,
                    error: DomainError::Internal(format!("handler task failed: {join_error}")),
                }
            }
        }
    }

    /// Finds the command a message addresses and the argument text after it.
    fn route(&self, text: &str) -> Option<(&Command, String)> {
        let text = text.trim();

        if !self.prefixes.tag.is_empty() {
            if let Some(rest) = text.strip_prefix(self.prefixes.tag.as_str()) {
                let rest = rest.trim_start();
                if rest.is_empty() {
                    return None;
                }
                let command = self.registry.find(TAG_COMMAND)?;
                return Some((command, rest.to_string()));
            }
        }

        let rest = text.strip_prefix(self.prefixes.command.as_str())?;
        // `! help` is not a command.
        if rest.starts_with(char::is_whitespace) {
            return None;
        }
        let (name, raw_args) = split_first(rest)?;
        let command = self.registry.find(name)?;
        Some((command, raw_args.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{HandlerKind, MockCommandHandler};
    use crate::storage::StoragePolicy;
    use chrono::{DateTime, Utc};
    use domains::{
        ChannelId, GuildId, MockPermissionRepository, PermissionOverride, UserId,
    };
    use std::collections::BTreeSet;

    const GUILD: GuildId = GuildId(1);
    const ADMIN: UserId = UserId(99);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(user: u64, text: &str, secs: i64) -> MessageEvent {
        MessageEvent {
            guild_id: GUILD,
            channel_id: ChannelId(5),
            user_id: UserId(user),
            role_ids: BTreeSet::new(),
            raw_text: text.into(),
            timestamp: at(secs),
            author_is_bot: false,
        }
    }

    fn resolver() -> Arc<PermissionResolver> {
        let mut repo = MockPermissionRepository::new();
        repo.expect_guild_exists().returning(|guild| Ok(guild == GUILD));
        repo.expect_overrides().returning(|guild| {
            Ok(vec![PermissionOverride::user(guild, ADMIN, PermissionLevel::Administrator)])
        });
        Arc::new(PermissionResolver::new(Arc::new(repo), StoragePolicy::default()))
    }

    fn echo() -> Arc<MockCommandHandler> {
        let mut handler = MockCommandHandler::new();
        handler.expect_kind().return_const(HandlerKind::Utility);
        handler
            .expect_execute()
            .returning(|ctx| Ok(CommandReply::message(format!("{}:{}", ctx.command, ctx.args.join("|")))));
        Arc::new(handler)
    }

    fn dispatcher(commands: Vec<Command>) -> Dispatcher {
        let mut registry = CommandRegistry::new();
        for command in commands {
            registry.register(command).unwrap();
        }
        Dispatcher::new(Arc::new(registry), resolver(), Prefixes::default())
    }

    fn completed(text: &str) -> DispatchOutcome {
        let command = text.split(':').next().unwrap_or_default().to_string();
        DispatchOutcome::Completed { command, reply: CommandReply::message(text) }
    }

    #[tokio::test]
    async fn plain_chatter_is_no_match() {
        let mut handler = MockCommandHandler::new();
        handler.expect_kind().return_const(HandlerKind::Utility);
        handler.expect_execute().never();
        let dispatcher = dispatcher(vec![Command::new("hello", Arc::new(handler))
            .cooldown(Duration::seconds(10))]);

        for text in ["hello there", "", "!", "??", "   ", "! hello", "!unknown"] {
            assert_eq!(dispatcher.dispatch(event(1, text, 0)).await, DispatchOutcome::NoMatch);
        }
        assert!(dispatcher.cooldowns.is_empty());
    }

    #[tokio::test]
    async fn quoted_arguments_reach_the_handler() {
        let dispatcher = dispatcher(vec![Command::new("echo", echo()).alias("e")]);
        let outcome = dispatcher.dispatch(event(1, r#"!E one "two three""#, 0)).await;
        assert_eq!(outcome, completed("echo:one|two three"));
    }

    #[tokio::test]
    async fn tag_shorthand_routes_to_tag_command() {
        let dispatcher = dispatcher(vec![Command::new(TAG_COMMAND, echo())]);
        let outcome = dispatcher.dispatch(event(1, "??faq arg", 0)).await;
        assert_eq!(outcome, completed("tag:faq|arg"));
    }

    #[tokio::test]
    async fn bot_authors_are_ignored() {
        let dispatcher = dispatcher(vec![Command::new("echo", echo())]);
        let mut from_bot = event(1, "!echo hi", 0);
        from_bot.author_is_bot = true;
        assert_eq!(dispatcher.dispatch(from_bot).await, DispatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn insufficient_level_is_unauthorized_without_side_effects() {
        let mut handler = MockCommandHandler::new();
        handler.expect_kind().return_const(HandlerKind::Admin);
        handler.expect_execute().never();
        let dispatcher = dispatcher(vec![Command::new("purge", Arc::new(handler))
            .level(PermissionLevel::Moderator)
            .cooldown(Duration::seconds(5))]);

        let outcome = dispatcher.dispatch(event(1, "!purge", 0)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Unauthorized {
                command: "purge".into(),
                required: PermissionLevel::Moderator,
                actual: PermissionLevel::Everyone,
            }
        );
        assert!(dispatcher.cooldowns.is_empty());
        assert!(outcome.reply_text().unwrap().contains("moderator"));
    }

    #[tokio::test]
    async fn overrides_grant_access() {
        let dispatcher = dispatcher(vec![Command::new("echo", echo())
            .level(PermissionLevel::Administrator)]);
        let outcome = dispatcher.dispatch(event(ADMIN.0, "!echo", 0)).await;
        assert_eq!(outcome, completed("echo:"));
    }

    #[tokio::test]
    async fn cooldown_is_per_user() {
        let dispatcher =
            dispatcher(vec![Command::new("echo", echo()).cooldown(Duration::seconds(3))]);

        assert_eq!(dispatcher.dispatch(event(1, "!echo", 0)).await, completed("echo:"));
        assert_eq!(
            dispatcher.dispatch(event(1, "!echo", 1)).await,
            DispatchOutcome::RateLimited { command: "echo".into(), retry_after: Duration::seconds(2) }
        );
        assert_eq!(dispatcher.dispatch(event(2, "!echo", 1)).await, completed("echo:"));
        assert_eq!(dispatcher.dispatch(event(1, "!echo", 3)).await, completed("echo:"));
    }

    #[tokio::test]
    async fn handler_failures_and_panics_are_contained() {
        let mut failing = MockCommandHandler::new();
        failing.expect_kind().return_const(HandlerKind::Utility);
        failing
            .expect_execute()
            .returning(|_| Err(DomainError::StorageUnavailable("timeout".into())));
        let mut panicking = MockCommandHandler::new();
        panicking.expect_kind().return_const(HandlerKind::Utility);
        panicking.expect_execute().returning(|_| panic!("boom"));

        let dispatcher = dispatcher(vec![
            Command::new("fail", Arc::new(failing)),
            Command::new("panic", Arc::new(panicking)),
            Command::new("echo", echo()),
        ]);

        let failed = dispatcher.dispatch(event(1, "!fail", 0)).await;
        assert!(matches!(
            failed,
            DispatchOutcome::HandlerError { error: DomainError::StorageUnavailable(_), .. }
        ));
        let panicked = dispatcher.dispatch(event(1, "!panic", 0)).await;
        assert!(matches!(
            panicked,
            DispatchOutcome::HandlerError { error: DomainError::Internal(_), .. }
        ));
        assert_eq!(dispatcher.dispatch(event(1, "!echo ok", 0)).await, completed("echo:ok"));
    }

    #[tokio::test]
    async fn unknown_guild_surfaces_as_handler_error() {
        let dispatcher = dispatcher(vec![Command::new("echo", echo())]);
        let mut stray = event(1, "!echo", 0);
        stray.guild_id = GuildId(404);
        assert!(matches!(
            dispatcher.dispatch(stray).await,
            DispatchOutcome::HandlerError { error: DomainError::NotFound { entity: "guild", .. }, .. }
        ));
    }
}
