//! Memoization of compiled tag bodies.
//!
//! Entries are stored per (guild, name) but only served when the caller's
//! (generation, version) matches exactly. Two tasks may compile the same stale
//! entry concurrently; the later insert wins and nobody is ever handed a
//! tree for a different version.

use std::sync::Arc;

use dashmap::DashMap;
use domains::{GuildId, ParseError, Tag};
use tracing::trace;
use uuid::Uuid;

use super::ast::Template;
use super::parser::parse;

#[derive(Debug, Clone)]
struct Entry {
    generation: Uuid,
    version: u64,
    template: Arc<Template>,
}

impl Entry {
    fn matches(&self, generation: Uuid, version: u64) -> bool {
        self.generation == generation && self.version == version
    }
}

#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: DashMap<(GuildId, String), Entry>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled form of `source`, which must be the body of `tag`
    /// (or of the tag an alias resolved to).
    pub fn get_or_compile(&self, tag: &Tag, source: &str) -> Result<Arc<Template>, ParseError> {
        let key = (tag.guild_id, tag.name.clone());

        if let Some(entry) = self.entries.get(&key) {
            if entry.matches(tag.generation, tag.version) {
                return Ok(Arc::clone(&entry.template));
            }
        }

        trace!(guild = %tag.guild_id, tag = %tag.name, version = tag.version, "compiling tag body");
        let template = Arc::new(parse(source)?);

        self.entries
            .entry(key)
            .and_modify(|existing| {
                let newer_exists =
                    existing.generation == tag.generation && existing.version > tag.version;
                if !newer_exists {
                    *existing = Entry {
                        generation: tag.generation,
                        version: tag.version,
                        template: Arc::clone(&template),
                    };
                }
            })
            .or_insert_with(|| Entry {
                generation: tag.generation,
                version: tag.version,
                template: Arc::clone(&template),
            });

        Ok(template)
    }

    pub fn invalidate(&self, guild_id: GuildId, name: &str) {
        self.entries.remove(&(guild_id, name.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
