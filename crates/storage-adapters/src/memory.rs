//! # In-memory storage
//!
//! A dashmap-backed implementation of every repository port. Each write
//! holds the shard lock of its key for the whole read-modify-write, so a
//! concurrent `get` sees either the old tag or the new one, never a mix.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use domains::{
    DomainResult, GuildId, ModerationAction, ModerationRepository, PermissionOverride,
    PermissionRepository, SubjectType, Tag, TagDraft, TagRepository, TagRevision, UserId,
};
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TagRecord {
    tag: Tag,
    history: Vec<TagRevision>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tags: DashMap<(GuildId, String), TagRecord>,
    guilds: DashSet<GuildId>,
    overrides: DashMap<GuildId, Vec<PermissionOverride>>,
    actions: DashMap<(GuildId, UserId), Vec<ModerationAction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TagRepository for InMemoryStore {
    async fn get(&self, guild_id: GuildId, name: &str) -> DomainResult<Option<Tag>> {
        Ok(self.tags.get(&(guild_id, name.to_string())).map(|record| record.tag.clone()))
    }

    async fn define(&self, draft: TagDraft) -> DomainResult<Tag> {
        let key = (draft.guild_id, draft.name.clone());
        let tag = match self.tags.entry(key) {
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                let previous = record.tag.clone();
                record.history.push(TagRevision {
                    version: previous.version,
                    body: previous.body.clone(),
                    editor_id: previous.last_editor_id,
                    edited_at: previous.last_edited_at,
                });
                record.tag = Tag {
                    body: draft.body,
                    version: previous.version + 1,
                    last_editor_id: draft.editor_id,
                    last_edited_at: draft.edited_at,
                    ..previous
                };
                record.tag.clone()
            }
            Entry::Vacant(slot) => {
                let tag = Tag {
                    guild_id: draft.guild_id,
                    name: draft.name,
                    body: draft.body,
                    version: 1,
                    generation: Uuid::new_v4(),
                    last_editor_id: draft.editor_id,
                    last_edited_at: draft.edited_at,
                };
                slot.insert(TagRecord { tag: tag.clone(), history: Vec::new() });
                tag
            }
        };
        trace!(guild = %tag.guild_id, tag = %tag.name, version = tag.version, "tag stored");
        Ok(tag)
    }

    async fn delete(&self, guild_id: GuildId, name: &str) -> DomainResult<bool> {
        Ok(self.tags.remove(&(guild_id, name.to_string())).is_some())
    }

    async fn list(&self, guild_id: GuildId) -> DomainResult<Vec<String>> {
        Ok(self
            .tags
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| entry.key().1.clone())
            .collect())
    }

    async fn history(&self, guild_id: GuildId, name: &str) -> DomainResult<Vec<TagRevision>> {
        Ok(self
            .tags
            .get(&(guild_id, name.to_string()))
            .map(|record| record.history.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryStore {
    async fn guild_exists(&self, guild_id: GuildId) -> DomainResult<bool> {
        Ok(self.guilds.contains(&guild_id))
    }

    async fn register_guild(&self, guild_id: GuildId) -> DomainResult<()> {
        self.guilds.insert(guild_id);
        Ok(())
    }

    async fn overrides(&self, guild_id: GuildId) -> DomainResult<Vec<PermissionOverride>> {
        Ok(self.overrides.get(&guild_id).map(|list| list.clone()).unwrap_or_default())
    }

    async fn put_override(&self, entry: PermissionOverride) -> DomainResult<()> {
        let mut list = self.overrides.entry(entry.guild_id).or_default();
        match list
            .iter_mut()
            .find(|existing| existing.subject == entry.subject && existing.subject_id == entry.subject_id)
        {
            Some(existing) => existing.level = entry.level,
            None => list.push(entry),
        }
        Ok(())
    }

    async fn remove_override(
        &self,
        guild_id: GuildId,
        subject: SubjectType,
        subject_id: u64,
    ) -> DomainResult<bool> {
        let Some(mut list) = self.overrides.get_mut(&guild_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|entry| !(entry.subject == subject && entry.subject_id == subject_id));
        Ok(list.len() != before)
    }
}

#[async_trait]
impl ModerationRepository for InMemoryStore {
    async fn append(&self, action: ModerationAction) -> DomainResult<()> {
        self.actions.entry((action.guild_id, action.user_id)).or_default().push(action);
        Ok(())
    }

    async fn actions_for(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> DomainResult<Vec<ModerationAction>> {
        Ok(self.actions.get(&(guild_id, user_id)).map(|list| list.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{ModerationKind, PermissionLevel, RoleId, TagBody};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    const GUILD: GuildId = GuildId(1);

    fn draft(name: &str, body: &str) -> TagDraft {
        TagDraft {
            guild_id: GUILD,
            name: name.into(),
            body: TagBody::Text(body.into()),
            editor_id: UserId(5),
            edited_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn define_bumps_version_and_keeps_history() {
        let store = InMemoryStore::new();
        let first = assert_ok!(store.define(draft("faq", "one")).await);
        let second = assert_ok!(store.define(draft("faq", "two")).await);

        assert_eq!((first.version, second.version), (1, 2));
        assert_eq!(first.generation, second.generation);
        let history = assert_ok!(store.history(GUILD, "faq").await);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, TagBody::Text("one".into()));
    }

    #[tokio::test]
    async fn delete_then_define_starts_a_new_generation() {
        let store = InMemoryStore::new();
        let old = assert_ok!(store.define(draft("faq", "one")).await);
        store.define(draft("faq", "two")).await.unwrap();
        assert!(assert_ok!(store.delete(GUILD, "faq").await));
        assert!(!assert_ok!(store.delete(GUILD, "faq").await));

        let new = assert_ok!(store.define(draft("faq", "three")).await);
        assert_eq!(new.version, 1);
        assert_ne!(new.generation, old.generation);
        assert!(assert_ok!(store.history(GUILD, "faq").await).is_empty());
    }

    #[tokio::test]
    async fn tags_are_guild_scoped() {
        let store = InMemoryStore::new();
        store.define(draft("faq", "x")).await.unwrap();
        let mut other = draft("rules", "y");
        other.guild_id = GuildId(2);
        store.define(other).await.unwrap();

        assert_eq!(assert_ok!(store.list(GUILD).await), vec!["faq".to_string()]);
        assert!(assert_ok!(store.get(GuildId(2), "faq").await).is_none());
    }

    #[tokio::test]
    async fn concurrent_defines_never_lose_a_version() {
        let store = Arc::new(InMemoryStore::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.define(draft("faq", &i.to_string())).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let tag = store.get(GUILD, "faq").await.unwrap().unwrap();
        assert_eq!(tag.version, 16);
        assert_eq!(store.history(GUILD, "faq").await.unwrap().len(), 15);
    }

    #[tokio::test]
    async fn overrides_replace_per_subject() {
        let store = InMemoryStore::new();
        store.register_guild(GUILD).await.unwrap();
        assert!(assert_ok!(store.guild_exists(GUILD).await));

        store
            .put_override(PermissionOverride::role(GUILD, RoleId(3), PermissionLevel::Helper))
            .await
            .unwrap();
        store
            .put_override(PermissionOverride::role(GUILD, RoleId(3), PermissionLevel::Moderator))
            .await
            .unwrap();
        let overrides = assert_ok!(store.overrides(GUILD).await);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].level, PermissionLevel::Moderator);

        assert!(assert_ok!(store.remove_override(GUILD, SubjectType::Role, 3).await));
        assert!(!assert_ok!(store.remove_override(GUILD, SubjectType::Role, 3).await));
    }

    #[tokio::test]
    async fn actions_come_back_in_append_order() {
        let store = InMemoryStore::new();
        for kind in [ModerationKind::Mute, ModerationKind::Unmute, ModerationKind::Warn] {
            let action = ModerationAction::new(GUILD, UserId(7), kind, UserId(1), "r", Utc::now());
            store.append(action).await.unwrap();
        }

        let kinds: Vec<_> = assert_ok!(store.actions_for(GUILD, UserId(7)).await)
            .into_iter()
            .map(|action| action.kind)
            .collect();
        assert_eq!(kinds, vec![ModerationKind::Mute, ModerationKind::Unmute, ModerationKind::Warn]);
        assert!(assert_ok!(store.actions_for(GUILD, UserId(8)).await).is_empty());
    }
}
