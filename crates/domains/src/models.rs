//! # Domain Models
//!
//! These structs represent the core entities of tagbot. Chat-platform ids are
//! 64-bit snowflakes scoped by guild; records we mint ourselves use UUIDs.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake!(
    /// A guild (server); every persisted record is partitioned by it.
    GuildId
);
snowflake!(ChannelId);
snowflake!(
    /// A user id. Not globally meaningful without a guild for permissions.
    UserId
);
snowflake!(RoleId);

fn parse_snowflake(raw: &str, prefixes: &[&str], what: &str) -> Result<u64, DomainError> {
    let trimmed = raw.trim();
    let inner = prefixes
        .iter()
        .find_map(|p| trimmed.strip_prefix(p).and_then(|rest| rest.strip_suffix('>')))
        .unwrap_or(trimmed);

    inner
        .parse::<u64>()
        .map_err(|_| DomainError::Validation(format!("`{raw}` is not a valid {what}")))
}

/// Accepts a bare id or a `<@id>` / `<@!id>` mention.
impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_snowflake(s, &["<@!", "<@"], "user id").map(UserId)
    }
}

/// Accepts a bare id or a `<@&id>` mention.
impl FromStr for RoleId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_snowflake(s, &["<@&"], "role id").map(RoleId)
    }
}

/// Who is acting, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub role_ids: BTreeSet<RoleId>,
}

impl Identity {
    pub fn new(user_id: UserId, guild_id: GuildId) -> Self {
        Self { user_id, guild_id, role_ids: BTreeSet::new() }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.role_ids.extend(roles);
        self
    }
}

/// Authorization tiers, lowest first. The derived `Ord` is the hierarchy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    Everyone,
    Helper,
    Moderator,
    Administrator,
    Owner,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 5] = [
        PermissionLevel::Everyone,
        PermissionLevel::Helper,
        PermissionLevel::Moderator,
        PermissionLevel::Administrator,
        PermissionLevel::Owner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Everyone => "everyone",
            PermissionLevel::Helper => "helper",
            PermissionLevel::Moderator => "moderator",
            PermissionLevel::Administrator => "administrator",
            PermissionLevel::Owner => "owner",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "everyone" => Ok(PermissionLevel::Everyone),
            "helper" => Ok(PermissionLevel::Helper),
            "mod" | "moderator" => Ok(PermissionLevel::Moderator),
            "admin" | "administrator" => Ok(PermissionLevel::Administrator),
            "owner" => Ok(PermissionLevel::Owner),
            other => {
                let known: Vec<&str> = PermissionLevel::ALL.iter().map(|level| level.as_str()).collect();
                Err(DomainError::Validation(format!(
                    "unknown permission level `{other}`; expected one of {}",
                    known.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    User,
    Role,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectType::User => f.write_str("user"),
            SubjectType::Role => f.write_str("role"),
        }
    }
}

impl FromStr for SubjectType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(SubjectType::User),
            "role" => Ok(SubjectType::Role),
            other => Err(DomainError::Validation(format!("expected `user` or `role`, got `{other}`"))),
        }
    }
}

/// Grants `level` to a user, or to every holder of a role, in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub guild_id: GuildId,
    pub subject: SubjectType,
    pub subject_id: u64,
    pub level: PermissionLevel,
}

impl PermissionOverride {
    pub fn user(guild_id: GuildId, user: UserId, level: PermissionLevel) -> Self {
        Self { guild_id, subject: SubjectType::User, subject_id: user.0, level }
    }

    pub fn role(guild_id: GuildId, role: RoleId, level: PermissionLevel) -> Self {
        Self { guild_id, subject: SubjectType::Role, subject_id: role.0, level }
    }

    /// Whether this override applies to `identity`.
    pub fn matches(&self, identity: &Identity) -> bool {
        if self.guild_id != identity.guild_id {
            return false;
        }
        match self.subject {
            SubjectType::User => self.subject_id == identity.user_id.0,
            SubjectType::Role => identity.role_ids.contains(&RoleId(self.subject_id)),
        }
    }
}

/// What a tag resolves to when invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TagBody {
    /// Template source text.
    Text(String),
    /// Renders the named tag instead. Never points at another alias.
    Alias(String),
}

impl TagBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagBody::Text(text) => Some(text),
            TagBody::Alias(_) => None,
        }
    }
}

/// The current definition of a named tag in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub guild_id: GuildId,
    pub name: String,
    pub body: TagBody,
    /// Starts at 1 and increments on every `define`.
    pub version: u64,
    /// Minted on first definition. A deleted and recreated tag gets a new one,
    /// so `(generation, version)` never repeats for a name.
    pub generation: Uuid,
    pub last_editor_id: UserId,
    pub last_edited_at: DateTime<Utc>,
}

/// A body that was replaced by a later definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRevision {
    pub version: u64,
    pub body: TagBody,
    pub editor_id: UserId,
    pub edited_at: DateTime<Utc>,
}

/// Input for a tag definition; the repository assigns version and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDraft {
    pub guild_id: GuildId,
    pub name: String,
    pub body: TagBody,
    pub editor_id: UserId,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationKind {
    Warn,
    Mute,
    Ban,
    Unmute,
    Unban,
}

impl ModerationKind {
    /// The kind a revocation record supersedes.
    pub fn revokes(self) -> Option<ModerationKind> {
        match self {
            ModerationKind::Unmute => Some(ModerationKind::Mute),
            ModerationKind::Unban => Some(ModerationKind::Ban),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModerationKind::Warn => "warn",
            ModerationKind::Mute => "mute",
            ModerationKind::Ban => "ban",
            ModerationKind::Unmute => "unmute",
            ModerationKind::Unban => "unban",
        }
    }

    /// Past tense, for replies.
    pub fn describe(self) -> &'static str {
        match self {
            ModerationKind::Warn => "warned",
            ModerationKind::Mute => "muted",
            ModerationKind::Ban => "banned",
            ModerationKind::Unmute => "unmuted",
            ModerationKind::Unban => "unbanned",
        }
    }
}

impl fmt::Display for ModerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(ModerationKind::Warn),
            "mute" => Ok(ModerationKind::Mute),
            "ban" => Ok(ModerationKind::Ban),
            "unmute" => Ok(ModerationKind::Unmute),
            "unban" => Ok(ModerationKind::Unban),
            other => Err(DomainError::Validation(format!("unknown moderation kind `{other}`"))),
        }
    }
}

/// One immutable entry of the moderation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationAction {
    pub id: Uuid,
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub kind: ModerationKind,
    pub moderator_id: UserId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ModerationAction {
    pub fn new(
        guild_id: GuildId,
        user_id: UserId,
        kind: ModerationKind,
        moderator_id: UserId,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild_id,
            user_id,
            kind,
            moderator_id,
            reason: reason.into(),
            timestamp,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Derived "current state" for one user, computed from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSummary {
    pub count: usize,
    pub most_recent: Option<ModerationAction>,
}

impl ActiveSummary {
    pub fn is_active(&self) -> bool {
        self.count > 0
    }
}

/// A normalized inbound chat message, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default)]
    pub role_ids: BTreeSet<RoleId>,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author_is_bot: bool,
}

impl MessageEvent {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            guild_id: self.guild_id,
            role_ids: self.role_ids.clone(),
        }
    }
}
