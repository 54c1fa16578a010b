//! Console transport: reads messages from stdin and prints replies.
//!
//! Each line is either plain text, sent as the configured console user, or a
//! JSON-encoded `MessageEvent` for exercising other users, roles and guilds.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use configs::ConsoleConfig;
use domains::{
    ChannelId, GuildId, MessageEvent, PermissionLevel, PermissionOverride, ReplySink, UserId,
};
use services::{Dispatcher, PermissionResolver};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct StdoutSink;

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send_reply(&self, channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("[#{channel_id}] {text}\n").as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Turns one input line into an event.
pub fn parse_line(line: &str, defaults: &ConsoleConfig) -> anyhow::Result<MessageEvent> {
    if line.starts_with('{') {
        return serde_json::from_str(line).context("malformed JSON message event");
    }
    Ok(MessageEvent {
        guild_id: GuildId(defaults.guild_id),
        channel_id: ChannelId(defaults.channel_id),
        user_id: UserId(defaults.user_id),
        role_ids: BTreeSet::new(),
        raw_text: line.to_string(),
        timestamp: Utc::now(),
        author_is_bot: false,
    })
}

/// Dispatches one event and posts whatever the outcome calls for. Delivery
/// failures are logged, never retried.
pub async fn relay(dispatcher: Arc<Dispatcher>, sink: Arc<dyn ReplySink>, event: MessageEvent) {
    let channel = event.channel_id;
    let outcome = dispatcher.dispatch(event).await;
    debug!(command = ?outcome.command(), "message handled");
    if let Some(text) = outcome.reply_text() {
        if let Err(err) = sink.send_reply(channel, &text).await {
            warn!(%channel, error = %err, "reply delivery failed");
        }
    }
}

pub struct Console {
    dispatcher: Arc<Dispatcher>,
    permissions: Arc<PermissionResolver>,
    sink: Arc<dyn ReplySink>,
    defaults: ConsoleConfig,
    owner_ids: Vec<u64>,
}

impl Console {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        permissions: Arc<PermissionResolver>,
        defaults: ConsoleConfig,
        owner_ids: Vec<u64>,
    ) -> Self {
        Self { dispatcher, permissions, sink: Arc::new(StdoutSink), defaults, owner_ids }
    }

    /// Registers a guild the first time it is seen and seeds its owners.
    async fn join_guild(&self, guild_id: GuildId) -> anyhow::Result<()> {
        self.permissions.register_guild(guild_id).await?;
        for owner in &self.owner_ids {
            self.permissions
                .grant(PermissionOverride::user(guild_id, UserId(*owner), PermissionLevel::Owner))
                .await?;
        }
        info!(guild = %guild_id, owners = self.owner_ids.len(), "guild joined");
        Ok(())
    }

    /// Runs until stdin closes, then waits for in-flight messages.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut known: HashSet<GuildId> = HashSet::new();
        let mut tasks = JoinSet::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.join_guild(GuildId(self.defaults.guild_id)).await?;
        known.insert(GuildId(self.defaults.guild_id));
        info!(prefix = %self.dispatcher.prefixes().command, "reading messages from stdin");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event = match parse_line(line, &self.defaults) {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable line");
                    continue;
                }
            };
            if known.insert(event.guild_id) {
                self.join_guild(event.guild_id).await?;
            }
            tasks.spawn(relay(Arc::clone(&self.dispatcher), Arc::clone(&self.sink), event));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "message task failed");
            }
        }
        info!("stdin closed, shutting down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_use_console_identity() {
        let defaults = ConsoleConfig { guild_id: 7, channel_id: 8, user_id: 9 };
        let event = parse_line("!help tag", &defaults).unwrap();
        assert_eq!(event.guild_id, GuildId(7));
        assert_eq!(event.channel_id, ChannelId(8));
        assert_eq!(event.user_id, UserId(9));
        assert_eq!(event.raw_text, "!help tag");
        assert!(!event.author_is_bot);
    }

    #[test]
    fn json_lines_carry_their_own_identity() {
        let line = r#"{"guild_id":2,"channel_id":3,"user_id":4,"role_ids":[5],"raw_text":"??faq","timestamp":"2024-01-01T00:00:00Z"}"#;
        let event = parse_line(line, &ConsoleConfig::default()).unwrap();
        assert_eq!(event.user_id, UserId(4));
        assert_eq!(event.role_ids.len(), 1);
        assert_eq!(event.raw_text, "??faq");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_line("{not json", &ConsoleConfig::default()).is_err());
    }
}
