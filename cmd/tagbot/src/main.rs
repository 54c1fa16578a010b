//! # tagbot
//!
//! Assembles the command core from configuration and drives it from the
//! console transport.

mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use configs::{BotConfig, LogConfig, LogFormat, StorageBackend, StorageConfig};
use domains::{ModerationRepository, PermissionRepository, TagRepository};
use services::template::EvalLimits;
use services::{
    register_builtins, CommandRegistry, Dispatcher, ModerationLedger, PermissionResolver,
    Prefixes, Services, StoragePolicy, TagLimits, TagService,
};
use storage_adapters::InMemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Repositories {
    tags: Arc<dyn TagRepository>,
    permissions: Arc<dyn PermissionRepository>,
    moderation: Arc<dyn ModerationRepository>,
}

impl Repositories {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: TagRepository + PermissionRepository + ModerationRepository + 'static,
    {
        Self { tags: store.clone(), permissions: store.clone(), moderation: store }
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    // stdout carries replies; logs go to stderr.
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn open_storage(config: &StorageConfig) -> anyhow::Result<Repositories> {
    match config.backend {
        StorageBackend::Memory => Ok(Repositories::shared(Arc::new(InMemoryStore::new()))),
        #[cfg(feature = "db-sqlite")]
        StorageBackend::Sqlite => {
            let store = storage_adapters::SqliteStore::connect(&config.url)
                .await
                .with_context(|| format!("opening sqlite store at {}", config.url))?;
            Ok(Repositories::shared(Arc::new(store)))
        }
        #[cfg(not(feature = "db-sqlite"))]
        StorageBackend::Sqlite => {
            anyhow::bail!("storage.backend = \"sqlite\" but tagbot was built without `db-sqlite`")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::load(None).context("loading configuration")?;
    init_tracing(&config.log);
    info!(
        backend = ?config.storage.backend,
        command_prefix = %config.command_prefix,
        tag_prefix = %config.tag_prefix,
        token_configured = config.token.is_some(),
        "tagbot starting"
    );

    let repos = open_storage(&config.storage).await?;
    let storage = StoragePolicy::with_timeout(Duration::from_millis(config.storage.timeout_ms));
    let limits = TagLimits {
        eval: EvalLimits {
            max_output_len: config.limits.max_output_len,
            max_depth: config.limits.max_depth,
            max_nodes: config.limits.max_nodes,
        },
        max_body_len: config.limits.max_body_len,
    };

    let permissions = Arc::new(PermissionResolver::new(repos.permissions, storage));
    let ledger = Arc::new(ModerationLedger::new(repos.moderation, storage));
    let tags = Arc::new(TagService::new(repos.tags, Arc::clone(&ledger), storage, limits));
    let services = Services { tags, ledger, permissions: Arc::clone(&permissions) };

    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, &services, &config.command_prefix)
        .context("registering built-in commands")?;
    info!(commands = registry.len(), "command registry ready");

    let prefixes = Prefixes { command: config.command_prefix.clone(), tag: config.tag_prefix.clone() };
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), Arc::clone(&permissions), prefixes));

    let console = console::Console::new(dispatcher, permissions, config.console, config.owner_ids);
    console.run().await
}
