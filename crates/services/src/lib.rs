//! tagbot/crates/services/src/lib.rs
//!
//! The command core: permission resolution, the tag store and its
//! templating language, the moderation ledger, and the dispatcher that ties
//! them to inbound messages. Services talk to storage only through the
//! `domains` ports.

pub mod commands;
pub mod handlers;
pub mod moderation;
pub mod permissions;
pub mod storage;
pub mod tags;
pub mod template;

pub use commands::{
    Command, CommandContext, CommandHandler, CommandRegistry, CommandReply, DispatchOutcome,
    Dispatcher, HandlerKind, Prefixes,
};
pub use handlers::{register_builtins, Services};
pub use moderation::ModerationLedger;
pub use permissions::PermissionResolver;
pub use storage::StoragePolicy;
pub use tags::{TagLimits, TagService};
