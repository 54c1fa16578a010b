//! # Tag Store
//!
//! Guild-scoped, versioned tag definitions on top of [`TagRepository`], plus
//! rendering: alias resolution, the compiled-template cache and the ledger
//! lookups a body asks for.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    DomainError, DomainResult, GuildId, Identity, ModerationAction, Tag, TagBody, TagDraft,
    TagRepository, TagRevision, UserId,
};
use tracing::{debug, info};

use crate::moderation::ModerationLedger;
use crate::storage::StoragePolicy;
use crate::template::{
    evaluate, parse, EvalContext, EvalLimits, LookupTable, ModLookup, Subject, TemplateCache,
};

pub const MAX_NAME_LEN: usize = 32;

/// Lowercases and checks a tag name against `[a-z0-9_-]{1,32}`.
pub fn normalize_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim().to_ascii_lowercase();
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if name.is_empty() || name.len() > MAX_NAME_LEN || !valid_chars {
        return Err(DomainError::Validation(format!(
            "tag names are 1-{MAX_NAME_LEN} characters of a-z, 0-9, `_` and `-` (got `{raw}`)"
        )));
    }
    Ok(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagLimits {
    pub eval: EvalLimits,
    /// In characters.
    pub max_body_len: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self { eval: EvalLimits::default(), max_body_len: 4000 }
    }
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    ledger: Arc<ModerationLedger>,
    cache: TemplateCache,
    storage: StoragePolicy,
    limits: TagLimits,
}

impl TagService {
    pub fn new(
        repo: Arc<dyn TagRepository>,
        ledger: Arc<ModerationLedger>,
        storage: StoragePolicy,
        limits: TagLimits,
    ) -> Self {
        Self { repo, ledger, cache: TemplateCache::new(), storage, limits }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub async fn get(&self, guild_id: GuildId, name: &str) -> DomainResult<Tag> {
        let name = normalize_name(name)?;
        self.find(guild_id, &name)
            .await?
            .ok_or_else(|| DomainError::not_found("tag", &name))
    }

    /// Creates or overwrites a text tag. The body must parse; nothing is
    /// stored otherwise.
    pub async fn define(
        &self,
        guild_id: GuildId,
        name: &str,
        body: &str,
        editor_id: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Tag> {
        let name = normalize_name(name)?;
        let body_len = body.chars().count();
        if body_len == 0 || body_len > self.limits.max_body_len {
            return Err(DomainError::Validation(format!(
                "tag bodies must be 1-{} characters (got {body_len})",
                self.limits.max_body_len
            )));
        }
        parse(body)?;

        self.store(TagDraft {
            guild_id,
            name,
            body: TagBody::Text(body.to_string()),
            editor_id,
            edited_at: now,
        })
        .await
    }

    /// Points `alias` at `target`, which must be an existing text tag. An
    /// existing alias may be re-pointed; an existing text tag is never replaced.
    pub async fn define_alias(
        &self,
        guild_id: GuildId,
        alias: &str,
        target: &str,
        editor_id: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Tag> {
        let alias = normalize_name(alias)?;
        let target = normalize_name(target)?;
        if alias == target {
            return Err(DomainError::Validation(format!("`{alias}` cannot alias itself")));
        }
        let resolved = self
            .find(guild_id, &target)
            .await?
            .ok_or_else(|| DomainError::not_found("tag", &target))?;
        if let TagBody::Alias(next) = &resolved.body {
            return Err(DomainError::Validation(format!(
                "`{target}` is already an alias of `{next}`; point at `{next}` instead"
            )));
        }
        // Text tags may be targets of other aliases; replacing one would chain them.
        if let Some(existing) = self.find(guild_id, &alias).await? {
            if matches!(existing.body, TagBody::Text(_)) {
                return Err(DomainError::Validation(format!(
                    "`{alias}` is a text tag; delete it before reusing the name as an alias"
                )));
            }
        }

        self.store(TagDraft {
            guild_id,
            name: alias,
            body: TagBody::Alias(target),
            editor_id,
            edited_at: now,
        })
        .await
    }

    pub async fn delete(&self, guild_id: GuildId, name: &str) -> DomainResult<()> {
        let name = normalize_name(name)?;
        let removed = self.storage.call("tags.delete", self.repo.delete(guild_id, &name)).await?;
        self.cache.invalidate(guild_id, &name);
        if !removed {
            return Err(DomainError::not_found("tag", &name));
        }
        info!(guild = %guild_id, tag = %name, "tag deleted");
        Ok(())
    }

    /// Tag names in the guild, sorted.
    pub async fn list(&self, guild_id: GuildId) -> DomainResult<Vec<String>> {
        let mut names = self.storage.read("tags.list", || self.repo.list(guild_id)).await?;
        names.sort_unstable();
        Ok(names)
    }

    /// Replaced revisions, oldest first.
    pub async fn history(&self, guild_id: GuildId, name: &str) -> DomainResult<Vec<TagRevision>> {
        let tag = self.get(guild_id, name).await?;
        self.storage
            .read("tags.history", || self.repo.history(guild_id, &tag.name))
            .await
    }

    /// Renders the tag for `invoker` with the given arguments.
    pub async fn render(
        &self,
        guild_id: GuildId,
        name: &str,
        arguments: &[String],
        invoker: &Identity,
        now: DateTime<Utc>,
    ) -> DomainResult<String> {
        let tag = self.resolve(guild_id, name).await?;
        let Some(source) = tag.body.as_text() else {
            return Err(DomainError::Validation(format!("`{}` is an alias chain", tag.name)));
        };
        let template = self.cache.get_or_compile(&tag, source)?;

        let lookups = self
            .lookup_table(guild_id, &template.lookups(), arguments, invoker.user_id, now)
            .await?;
        let context = EvalContext { arguments, moderation: &lookups };
        let rendered = evaluate(&template, &context, &self.limits.eval)?;
        debug!(guild = %guild_id, tag = %tag.name, version = tag.version, "tag rendered");
        Ok(rendered)
    }

    /// Follows at most one alias hop.
    async fn resolve(&self, guild_id: GuildId, name: &str) -> DomainResult<Tag> {
        let tag = self.get(guild_id, name).await?;
        match &tag.body {
            TagBody::Text(_) => Ok(tag),
            TagBody::Alias(target) => self
                .find(guild_id, target)
                .await?
                .ok_or_else(|| DomainError::not_found("tag", target)),
        }
    }

    async fn lookup_table(
        &self,
        guild_id: GuildId,
        lookups: &[ModLookup],
        arguments: &[String],
        invoker: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<LookupTable> {
        let mut table = LookupTable::default();
        let mut histories: HashMap<UserId, Vec<ModerationAction>> = HashMap::new();

        for lookup in lookups {
            let subject = match lookup.subject {
                Subject::Invoker => Some(invoker),
                Subject::Arg(n) => arguments
                    .get(n - 1)
                    .and_then(|raw| raw.parse::<UserId>().ok()),
            };
            // Unresolvable subjects fall back to the table's empty answer.
            let Some(user) = subject else { continue };

            if !histories.contains_key(&user) {
                let actions = self.ledger.history(guild_id, user).await?;
                histories.insert(user, actions);
            }
            let actions = histories.get(&user).map(Vec::as_slice).unwrap_or_default();
            table.insert(*lookup, ModerationLedger::lookup(actions, lookup.kind, now));
        }
        Ok(table)
    }

    async fn find(&self, guild_id: GuildId, name: &str) -> DomainResult<Option<Tag>> {
        self.storage.read("tags.get", || self.repo.get(guild_id, name)).await
    }

    async fn store(&self, draft: TagDraft) -> DomainResult<Tag> {
        let (guild_id, editor) = (draft.guild_id, draft.editor_id);
        let tag = self.storage.call("tags.define", self.repo.define(draft)).await?;
        self.cache.invalidate(guild_id, &tag.name);
        info!(guild = %guild_id, tag = %tag.name, version = tag.version, %editor, "tag defined");
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockModerationRepository, MockTagRepository, ModerationKind, ParseErrorKind};
    use uuid::Uuid;

    const GUILD: GuildId = GuildId(10);
    const EDITOR: UserId = UserId(20);

    fn stored(name: &str, body: TagBody, version: u64) -> Tag {
        Tag {
            guild_id: GUILD,
            name: name.into(),
            body,
            version,
            generation: Uuid::nil(),
            last_editor_id: EDITOR,
            last_edited_at: Utc::now(),
        }
    }

    fn service(tags: MockTagRepository, ledger: MockModerationRepository) -> TagService {
        let ledger = Arc::new(ModerationLedger::new(Arc::new(ledger), StoragePolicy::default()));
        TagService::new(Arc::new(tags), ledger, StoragePolicy::default(), TagLimits::default())
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn names_are_normalized_and_checked() {
        assert_eq!(normalize_name(" FAQ-1 ").unwrap(), "faq-1");
        assert!(normalize_name("").is_err());
        assert!(normalize_name("has space").is_err());
        assert!(normalize_name(&"x".repeat(33)).is_err());
    }

    #[tokio::test]
    async fn unparsable_bodies_are_never_stored() {
        let mut tags = MockTagRepository::new();
        tags.expect_define().never();
        let service = service(tags, MockModerationRepository::new());

        let err = service
            .define(GUILD, "broken", "{if arg1}no end", EDITOR, Utc::now())
            .await
            .unwrap_err();
        match err {
            DomainError::Parse(parse) => assert_eq!(parse.kind, ParseErrorKind::Unterminated),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let mut tags = MockTagRepository::new();
        tags.expect_define().never();
        let service = service(tags, MockModerationRepository::new());

        let body = "a".repeat(4001);
        let result = service.define(GUILD, "big", &body, EDITOR, Utc::now()).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn render_substitutes_arguments() {
        let mut tags = MockTagRepository::new();
        tags.expect_get()
            .returning(|_, _| Ok(Some(stored("hello", TagBody::Text("Hello {arg1}!".into()), 1))));
        let service = service(tags, MockModerationRepository::new());

        let invoker = Identity::new(UserId(1), GUILD);
        let out = service
            .render(GUILD, "hello", &args(&["World"]), &invoker, Utc::now())
            .await
            .unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[tokio::test]
    async fn aliases_render_their_target() {
        let mut tags = MockTagRepository::new();
        tags.expect_get().returning(|_, name| {
            Ok(match name {
                "hi" => Some(stored("hi", TagBody::Alias("hello".into()), 1)),
                "hello" => Some(stored("hello", TagBody::Text("hey {arg1}".into()), 3)),
                _ => None,
            })
        });
        let service = service(tags, MockModerationRepository::new());

        let invoker = Identity::new(UserId(1), GUILD);
        let out = service.render(GUILD, "hi", &args(&["you"]), &invoker, Utc::now()).await;
        assert_eq!(out, Ok("hey you".to_string()));
    }

    #[tokio::test]
    async fn alias_chains_are_rejected() {
        let mut tags = MockTagRepository::new();
        tags.expect_get()
            .returning(|_, _| Ok(Some(stored("hi", TagBody::Alias("hello".into()), 1))));
        tags.expect_define().never();
        let service = service(tags, MockModerationRepository::new());

        let result = service.define_alias(GUILD, "yo", "hi", EDITOR, Utc::now()).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn aliases_never_replace_text_tags() {
        let mut tags = MockTagRepository::new();
        tags.expect_get()
            .returning(|_, name| Ok(Some(stored(name, TagBody::Text("body".into()), 1))));
        tags.expect_define().never();
        let service = service(tags, MockModerationRepository::new());

        let result = service.define_alias(GUILD, "a", "b", EDITOR, Utc::now()).await;
        assert!(matches!(result, Err(DomainError::Validation(message)) if message.contains("text tag")));
    }

    #[tokio::test]
    async fn existing_aliases_can_be_repointed() {
        let mut tags = MockTagRepository::new();
        tags.expect_get().returning(|_, name| {
            Ok(Some(match name {
                "x" => stored("x", TagBody::Alias("a".into()), 1),
                other => stored(other, TagBody::Text("body".into()), 1),
            }))
        });
        tags.expect_define()
            .withf(|draft| draft.name == "x" && draft.body == TagBody::Alias("b".into()))
            .times(1)
            .returning(|draft| Ok(stored(&draft.name, draft.body, 2)));
        let service = service(tags, MockModerationRepository::new());

        let tag = service.define_alias(GUILD, "x", "b", EDITOR, Utc::now()).await.unwrap();
        assert_eq!(tag.version, 2);
    }

    #[tokio::test]
    async fn moderation_lookups_read_the_ledger() {
        let mut tags = MockTagRepository::new();
        tags.expect_get().returning(|_, _| {
            Ok(Some(stored(
                "status",
                TagBody::Text("{if mod:muted arg1}muted{else}free{endif} / {mod:warnings}".into()),
                1,
            )))
        });
        let mut ledger = MockModerationRepository::new();
        ledger.expect_actions_for().returning(|guild, user| {
            let now = Utc::now();
            Ok(match user.0 {
                7 => vec![ModerationAction::new(guild, user, ModerationKind::Mute, EDITOR, "spam", now)],
                1 => vec![
                    ModerationAction::new(guild, user, ModerationKind::Warn, EDITOR, "a", now),
                    ModerationAction::new(guild, user, ModerationKind::Warn, EDITOR, "b", now),
                ],
                _ => Vec::new(),
            })
        });
        let service = service(tags, ledger);

        let invoker = Identity::new(UserId(1), GUILD);
        let out = service
            .render(GUILD, "status", &args(&["<@7>"]), &invoker, Utc::now())
            .await
            .unwrap();
        assert_eq!(out, "muted / 2");
    }

    #[tokio::test]
    async fn delete_of_missing_tag_is_not_found() {
        let mut tags = MockTagRepository::new();
        tags.expect_delete().returning(|_, _| Ok(false));
        let service = service(tags, MockModerationRepository::new());

        assert!(matches!(
            service.delete(GUILD, "ghost").await,
            Err(DomainError::NotFound { entity: "tag", .. })
        ));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let mut tags = MockTagRepository::new();
        tags.expect_list()
            .returning(|_| Ok(vec!["rules".into(), "faq".into(), "install".into()]));
        let service = service(tags, MockModerationRepository::new());

        assert_eq!(service.list(GUILD).await.unwrap(), vec!["faq", "install", "rules"]);
    }
}
