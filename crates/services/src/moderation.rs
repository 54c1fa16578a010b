//! # Moderation Ledger
//!
//! Append-only record of moderation actions. "Current state" is never
//! stored: it is derived here, from the full history, on every query.
//! A Mute is superseded by any later Unmute of the same user, a Ban by a later
//! Unban; ordering is by timestamp with ties broken by append order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    ActiveSummary, DomainResult, GuildId, ModerationAction, ModerationKind, ModerationRepository,
    UserId,
};
use tracing::info;

use crate::storage::StoragePolicy;
use crate::template::{LookupKind, LookupValue};

/// Kinds that represent an ongoing sanction.
pub const SANCTIONS: [ModerationKind; 3] =
    [ModerationKind::Warn, ModerationKind::Mute, ModerationKind::Ban];

/// Derives the active subset of `actions` (one user's history, append order)
/// restricted to `kinds`. Revocation records are never themselves active.
pub fn active_summary(
    actions: &[ModerationAction],
    kinds: &[ModerationKind],
    now: DateTime<Utc>,
) -> ActiveSummary {
    let mut ordered: Vec<&ModerationAction> = actions.iter().collect();
    ordered.sort_by_key(|action| action.timestamp);

    let mut standing: Vec<&ModerationAction> = Vec::new();
    for action in ordered {
        match action.kind.revokes() {
            Some(target) => standing.retain(|prior| prior.kind != target),
            None => standing.push(action),
        }
    }

    let active: Vec<&ModerationAction> = standing
        .into_iter()
        .filter(|action| kinds.contains(&action.kind) && !action.is_expired(now))
        .collect();

    ActiveSummary {
        count: active.len(),
        most_recent: active.last().map(|action| (*action).clone()),
    }
}

pub struct ModerationLedger {
    repo: Arc<dyn ModerationRepository>,
    storage: StoragePolicy,
}

impl ModerationLedger {
    pub fn new(repo: Arc<dyn ModerationRepository>, storage: StoragePolicy) -> Self {
        Self { repo, storage }
    }

    pub async fn append(&self, action: ModerationAction) -> DomainResult<()> {
        let (guild, user, kind, moderator) =
            (action.guild_id, action.user_id, action.kind, action.moderator_id);
        self.storage.call("ledger.append", self.repo.append(action)).await?;
        info!(%guild, %user, %kind, %moderator, "moderation action recorded");
        Ok(())
    }

    /// The user's full history in the guild, in append order.
    pub async fn history(&self, guild_id: GuildId, user_id: UserId) -> DomainResult<Vec<ModerationAction>> {
        self.storage
            .read("ledger.actions_for", || self.repo.actions_for(guild_id, user_id))
            .await
    }

    /// Wall-clock form of [`Self::query_active_at`].
    pub async fn query_active(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        kinds: &[ModerationKind],
    ) -> DomainResult<ActiveSummary> {
        self.query_active_at(guild_id, user_id, kinds, Utc::now()).await
    }

    /// The user's active actions of `kinds` as of `now`. Command handlers
    /// call this with the triggering event's timestamp so replies are
    /// reproducible; [`Self::query_active`] is for callers without one.
    pub async fn query_active_at(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        kinds: &[ModerationKind],
        now: DateTime<Utc>,
    ) -> DomainResult<ActiveSummary> {
        let actions = self.history(guild_id, user_id).await?;
        Ok(active_summary(&actions, kinds, now))
    }

    /// Answers a template lookup from a history already fetched through
    /// [`Self::history`], so one read can serve several lookups.
    pub fn lookup(history: &[ModerationAction], kind: LookupKind, now: DateTime<Utc>) -> LookupValue {
        match kind {
            LookupKind::Warnings => {
                LookupValue::Count(active_summary(history, &[ModerationKind::Warn], now).count)
            }
            LookupKind::Muted => {
                LookupValue::Flag(active_summary(history, &[ModerationKind::Mute], now).is_active())
            }
            LookupKind::Banned => {
                LookupValue::Flag(active_summary(history, &[ModerationKind::Ban], now).is_active())
            }
            LookupKind::Active => LookupValue::Count(active_summary(history, &SANCTIONS, now).count),
        }
    }
}
