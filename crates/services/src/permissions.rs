//! # Permission Resolver
//!
//! Computes the effective [`PermissionLevel`] of an identity from the flat
//! override table: the maximum level among overrides naming the user directly
//! or any role the user holds, defaulting to `Everyone`.

use std::sync::Arc;

use domains::{
    DomainError, DomainResult, GuildId, Identity, PermissionLevel, PermissionOverride,
    PermissionRepository, SubjectType,
};
use tracing::{debug, info};

use crate::storage::StoragePolicy;

/// The resolution rule on its own. Pure.
pub fn effective_level(overrides: &[PermissionOverride], identity: &Identity) -> PermissionLevel {
    overrides
        .iter()
        .filter(|entry| entry.matches(identity))
        .map(|entry| entry.level)
        .max()
        .unwrap_or_default()
}

pub struct PermissionResolver {
    repo: Arc<dyn PermissionRepository>,
    storage: StoragePolicy,
}

impl PermissionResolver {
    pub fn new(repo: Arc<dyn PermissionRepository>, storage: StoragePolicy) -> Self {
        Self { repo, storage }
    }

    /// Fails with `NotFound` only when the guild itself is unknown; unknown
    /// users resolve to `Everyone`.
    pub async fn resolve(&self, identity: &Identity) -> DomainResult<PermissionLevel> {
        let overrides = self.overrides(identity.guild_id).await?;
        let level = effective_level(&overrides, identity);
        debug!(guild = %identity.guild_id, user = %identity.user_id, %level, "resolved permission level");
        Ok(level)
    }

    /// All overrides of a known guild, highest level first.
    pub async fn overrides(&self, guild_id: GuildId) -> DomainResult<Vec<PermissionOverride>> {
        self.ensure_guild(guild_id).await?;
        let mut overrides = self
            .storage
            .read("permissions.overrides", || self.repo.overrides(guild_id))
            .await?;
        overrides.sort_by(|a, b| {
            b.level.cmp(&a.level).then(a.subject_id.cmp(&b.subject_id))
        });
        Ok(overrides)
    }

    pub async fn register_guild(&self, guild_id: GuildId) -> DomainResult<()> {
        self.storage
            .call("permissions.register_guild", self.repo.register_guild(guild_id))
            .await?;
        info!(guild = %guild_id, "guild registered");
        Ok(())
    }

    pub async fn grant(&self, entry: PermissionOverride) -> DomainResult<()> {
        self.ensure_guild(entry.guild_id).await?;
        info!(
            guild = %entry.guild_id,
            subject = %entry.subject,
            subject_id = entry.subject_id,
            level = %entry.level,
            "permission override set"
        );
        self.storage.call("permissions.put_override", self.repo.put_override(entry)).await
    }

    pub async fn revoke(
        &self,
        guild_id: GuildId,
        subject: SubjectType,
        subject_id: u64,
    ) -> DomainResult<()> {
        self.ensure_guild(guild_id).await?;
        let removed = self
            .storage
            .call(
                "permissions.remove_override",
                self.repo.remove_override(guild_id, subject, subject_id),
            )
            .await?;
        if !removed {
            return Err(DomainError::not_found("permission override", format!("{subject} {subject_id}")));
        }
        info!(guild = %guild_id, %subject, subject_id, "permission override cleared");
        Ok(())
    }

    async fn ensure_guild(&self, guild_id: GuildId) -> DomainResult<()> {
        let known = self
            .storage
            .read("permissions.guild_exists", || self.repo.guild_exists(guild_id))
            .await?;
        if known {
            Ok(())
        } else {
            Err(DomainError::not_found("guild", guild_id))
        }
    }
}
