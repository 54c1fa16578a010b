//! # Ports
//!
//! Contracts for the collaborators tagbot talks to but does not own: the
//! storage engine and the chat transport. Storage adapters implement the
//! repository traits; every method is one transaction, so callers never
//! observe a half-applied write.

use async_trait::async_trait;

use crate::errors::DomainResult;
use crate::models::{
    ChannelId, GuildId, ModerationAction, PermissionOverride, SubjectType, Tag, TagDraft,
    TagRevision, UserId,
};

/// Persistence for guild-scoped tags and their revision history.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get(&self, guild_id: GuildId, name: &str) -> DomainResult<Option<Tag>>;

    /// Creates the tag at version 1 with a fresh generation, or replaces the
    /// body of an existing one, bumping its version and appending the old body
    /// to the history. Atomic.
    async fn define(&self, draft: TagDraft) -> DomainResult<Tag>;

    /// Hard delete of the tag and its history. `false` if it did not exist.
    async fn delete(&self, guild_id: GuildId, name: &str) -> DomainResult<bool>;

    /// Tag names in the guild, in no particular order.
    async fn list(&self, guild_id: GuildId) -> DomainResult<Vec<String>>;

    /// Replaced revisions of the tag, oldest first.
    async fn history(&self, guild_id: GuildId, name: &str) -> DomainResult<Vec<TagRevision>>;
}

/// Persistence for known guilds and their permission overrides.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn guild_exists(&self, guild_id: GuildId) -> DomainResult<bool>;

    async fn register_guild(&self, guild_id: GuildId) -> DomainResult<()>;

    async fn overrides(&self, guild_id: GuildId) -> DomainResult<Vec<PermissionOverride>>;

    /// Inserts or replaces the override for the same (guild, subject, id).
    async fn put_override(&self, entry: PermissionOverride) -> DomainResult<()>;

    async fn remove_override(
        &self,
        guild_id: GuildId,
        subject: SubjectType,
        subject_id: u64,
    ) -> DomainResult<bool>;
}

/// Append-only storage of moderation actions.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ModerationRepository: Send + Sync {
    async fn append(&self, action: ModerationAction) -> DomainResult<()>;

    /// Every action recorded against the user in the guild, in append order.
    async fn actions_for(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> DomainResult<Vec<ModerationAction>>;
}

/// Outbound side of the chat transport.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Fire-and-forget from the core's point of view; failures are logged by
    /// the caller and never retried.
    async fn send_reply(&self, channel_id: ChannelId, text: &str) -> anyhow::Result<()>;
}
