//! tagbot/crates/storage-adapters/src/lib.rs
//!
//! Implementations of the `domains` repository ports. The in-memory store is
//! always built; SQLite sits behind the `db-sqlite` feature.

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteStore;
