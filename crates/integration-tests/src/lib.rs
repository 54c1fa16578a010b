//! Shared fixtures for the cross-crate tests: a fully wired bot over the
//! in-memory store, with one guild and a user at every permission level.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    ChannelId, GuildId, MessageEvent, ModerationRepository, PermissionLevel, PermissionOverride,
    PermissionRepository, RoleId, TagRepository, UserId,
};
use services::{
    register_builtins, CommandRegistry, CommandReply, DispatchOutcome, Dispatcher,
    ModerationLedger, PermissionResolver, Prefixes, Services, StoragePolicy, TagLimits,
    TagService,
};
use storage_adapters::InMemoryStore;

pub const GUILD: GuildId = GuildId(1000);
pub const CHANNEL: ChannelId = ChannelId(2000);

pub const OWNER: UserId = UserId(1);
pub const ADMIN: UserId = UserId(2);
/// Moderator through `MOD_ROLE`, not a direct override.
pub const MODERATOR: UserId = UserId(3);
pub const HELPER: UserId = UserId(4);
pub const MEMBER: UserId = UserId(5);
pub const MOD_ROLE: RoleId = RoleId(50);

/// Fixed origin for event timestamps.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200 + secs, 0).unwrap_or_default()
}

pub struct Harness {
    pub services: Services,
    pub dispatcher: Arc<Dispatcher>,
    clock: AtomicI64,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_repositories(store.clone(), store.clone(), store).await
    }

    pub async fn with_repositories(
        tags: Arc<dyn TagRepository>,
        permissions: Arc<dyn PermissionRepository>,
        moderation: Arc<dyn ModerationRepository>,
    ) -> Self {
        let storage = StoragePolicy::with_timeout(std::time::Duration::from_millis(200));
        let resolver = Arc::new(PermissionResolver::new(permissions, storage));
        let ledger = Arc::new(ModerationLedger::new(moderation, storage));
        let tags = Arc::new(TagService::new(tags, Arc::clone(&ledger), storage, TagLimits::default()));
        let services = Services { tags, ledger, permissions: Arc::clone(&resolver) };

        resolver.register_guild(GUILD).await.expect("register guild");
        for grant in [
            PermissionOverride::user(GUILD, OWNER, PermissionLevel::Owner),
            PermissionOverride::user(GUILD, ADMIN, PermissionLevel::Administrator),
            PermissionOverride::role(GUILD, MOD_ROLE, PermissionLevel::Moderator),
            PermissionOverride::user(GUILD, HELPER, PermissionLevel::Helper),
        ] {
            resolver.grant(grant).await.expect("seed override");
        }

        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry, &services, "!").expect("built-in commands register");
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::new(registry), resolver, Prefixes::default()));

        Self { services, dispatcher, clock: AtomicI64::new(0) }
    }

    pub fn event(&self, user: UserId, text: &str, secs: i64) -> MessageEvent {
        let role_ids: BTreeSet<RoleId> =
            if user == MODERATOR { BTreeSet::from([MOD_ROLE]) } else { BTreeSet::new() };
        MessageEvent {
            guild_id: GUILD,
            channel_id: CHANNEL,
            user_id: user,
            role_ids,
            raw_text: text.to_string(),
            timestamp: at(secs),
            author_is_bot: false,
        }
    }

    /// Dispatches at an explicit time.
    pub async fn send_at(&self, user: UserId, text: &str, secs: i64) -> DispatchOutcome {
        self.dispatcher.dispatch(self.event(user, text, secs)).await
    }

    /// Dispatches at the harness clock, which moves far enough between calls
    /// that cooldowns never interfere.
    pub async fn send(&self, user: UserId, text: &str) -> DispatchOutcome {
        let secs = self.clock.fetch_add(60, Ordering::SeqCst);
        self.send_at(user, text, secs).await
    }

    /// Sends and returns the reply of a completed command; panics otherwise.
    pub async fn reply(&self, user: UserId, text: &str) -> String {
        match self.send(user, text).await {
            DispatchOutcome::Completed { reply: CommandReply::Message(reply), .. } => reply,
            other => panic!("`{text}` did not complete with a reply: {other:?}"),
        }
    }

    /// The current harness clock, for direct service calls.
    pub fn now(&self) -> DateTime<Utc> {
        at(self.clock.load(Ordering::SeqCst))
    }
}
