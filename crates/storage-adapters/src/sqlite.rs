//! # SQLite storage
//!
//! Maps the repository ports onto four tables. Snowflakes are stored as
//! `INTEGER` (bit-preserving `u64` to `i64` casts), tag bodies as JSON text and
//! enums by their lowercase names. Every port method runs in one transaction
//! or one statement.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    DomainError, DomainResult, GuildId, ModerationAction, ModerationKind, ModerationRepository,
    PermissionLevel, PermissionOverride, PermissionRepository, SubjectType, Tag, TagBody, TagDraft,
    TagRepository, TagRevision, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{error, info};
use uuid::Uuid;

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS tags (
        guild_id        INTEGER NOT NULL,
        name            TEXT    NOT NULL,
        body            TEXT    NOT NULL,
        version         INTEGER NOT NULL,
        generation      BLOB    NOT NULL,
        last_editor_id  INTEGER NOT NULL,
        last_edited_at  TEXT    NOT NULL,
        PRIMARY KEY (guild_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS tag_revisions (
        guild_id   INTEGER NOT NULL,
        name       TEXT    NOT NULL,
        version    INTEGER NOT NULL,
        body       TEXT    NOT NULL,
        editor_id  INTEGER NOT NULL,
        edited_at  TEXT    NOT NULL,
        PRIMARY KEY (guild_id, name, version)
    )",
    "CREATE TABLE IF NOT EXISTS guilds (
        guild_id INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS permission_overrides (
        guild_id    INTEGER NOT NULL,
        subject     TEXT    NOT NULL,
        subject_id  INTEGER NOT NULL,
        level       TEXT    NOT NULL,
        PRIMARY KEY (guild_id, subject, subject_id)
    )",
    "CREATE TABLE IF NOT EXISTS moderation_actions (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            BLOB    NOT NULL UNIQUE,
        guild_id      INTEGER NOT NULL,
        user_id       INTEGER NOT NULL,
        kind          TEXT    NOT NULL,
        moderator_id  INTEGER NOT NULL,
        reason        TEXT    NOT NULL,
        timestamp     TEXT    NOT NULL,
        expires_at    TEXT
    )",
    "CREATE INDEX IF NOT EXISTS moderation_actions_subject
        ON moderation_actions (guild_id, user_id, seq)",
];

fn unavailable(err: sqlx::Error) -> DomainError {
    error!(error = %err, "sqlite call failed");
    DomainError::StorageUnavailable(err.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> DomainError {
    error!(what, %detail, "unreadable row in sqlite store");
    DomainError::StorageUnavailable(format!("unreadable {what}: {detail}"))
}

// Snowflakes are u64; SQLite integers are i64. The cast is bit-preserving.
fn sql_id(id: u64) -> i64 {
    id as i64
}

fn from_sql_id(raw: i64) -> u64 {
    raw as u64
}

fn encode_body(body: &TagBody) -> DomainResult<String> {
    serde_json::to_string(body).map_err(|err| corrupt("tag body", err))
}

fn decode_body(raw: &str) -> DomainResult<TagBody> {
    serde_json::from_str(raw).map_err(|err| corrupt("tag body", err))
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> DomainResult<T>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = row.try_get(column).map_err(unavailable)?;
    raw.parse()
}

fn tag_from_row(row: &SqliteRow) -> DomainResult<Tag> {
    let body: String = row.try_get("body").map_err(unavailable)?;
    Ok(Tag {
        guild_id: GuildId(from_sql_id(row.try_get("guild_id").map_err(unavailable)?)),
        name: row.try_get("name").map_err(unavailable)?,
        body: decode_body(&body)?,
        version: from_sql_id(row.try_get("version").map_err(unavailable)?),
        generation: row.try_get::<Uuid, _>("generation").map_err(unavailable)?,
        last_editor_id: UserId(from_sql_id(row.try_get("last_editor_id").map_err(unavailable)?)),
        last_edited_at: row.try_get("last_edited_at").map_err(unavailable)?,
    })
}

fn action_from_row(row: &SqliteRow) -> DomainResult<ModerationAction> {
    Ok(ModerationAction {
        id: row.try_get("id").map_err(unavailable)?,
        guild_id: GuildId(from_sql_id(row.try_get("guild_id").map_err(unavailable)?)),
        user_id: UserId(from_sql_id(row.try_get("user_id").map_err(unavailable)?)),
        kind: parse_column::<ModerationKind>(row, "kind")?,
        moderator_id: UserId(from_sql_id(row.try_get("moderator_id").map_err(unavailable)?)),
        reason: row.try_get("reason").map_err(unavailable)?,
        timestamp: row.try_get("timestamp").map_err(unavailable)?,
        expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at").map_err(unavailable)?,
    })
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and ensures the
    /// schema exists. In-memory databases get a single connection so every
    /// query sees the same database.
    pub async fn connect(url: &str) -> DomainResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(unavailable)?
            .create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(unavailable)?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(unavailable)?;
        }
        info!(url, max_connections, "sqlite store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TagRepository for SqliteStore {
    async fn get(&self, guild_id: GuildId, name: &str) -> DomainResult<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE guild_id = ? AND name = ?")
            .bind(sql_id(guild_id.0))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.as_ref().map(tag_from_row).transpose()
    }

    /// Read, archive and bump inside one transaction so concurrent defines
    /// serialize on the row.
    async fn define(&self, draft: TagDraft) -> DomainResult<Tag> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let existing = sqlx::query("SELECT * FROM tags WHERE guild_id = ? AND name = ?")
            .bind(sql_id(draft.guild_id.0))
            .bind(&draft.name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?;

        let tag = match existing.as_ref().map(tag_from_row).transpose()? {
            Some(previous) => {
                sqlx::query(
                    "INSERT INTO tag_revisions (guild_id, name, version, body, editor_id, edited_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(sql_id(previous.guild_id.0))
                .bind(&previous.name)
                .bind(sql_id(previous.version))
                .bind(encode_body(&previous.body)?)
                .bind(sql_id(previous.last_editor_id.0))
                .bind(previous.last_edited_at)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;

                let tag = Tag {
                    body: draft.body,
                    version: previous.version + 1,
                    last_editor_id: draft.editor_id,
                    last_edited_at: draft.edited_at,
                    ..previous
                };
                sqlx::query(
                    "UPDATE tags SET body = ?, version = ?, last_editor_id = ?, last_edited_at = ?
                     WHERE guild_id = ? AND name = ?",
                )
                .bind(encode_body(&tag.body)?)
                .bind(sql_id(tag.version))
                .bind(sql_id(tag.last_editor_id.0))
                .bind(tag.last_edited_at)
                .bind(sql_id(tag.guild_id.0))
                .bind(&tag.name)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
                tag
            }
            None => {
                let tag = Tag {
                    guild_id: draft.guild_id,
                    name: draft.name,
                    body: draft.body,
                    version: 1,
                    generation: Uuid::new_v4(),
                    last_editor_id: draft.editor_id,
                    last_edited_at: draft.edited_at,
                };
                sqlx::query(
                    "INSERT INTO tags (guild_id, name, body, version, generation, last_editor_id, last_edited_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(sql_id(tag.guild_id.0))
                .bind(&tag.name)
                .bind(encode_body(&tag.body)?)
                .bind(sql_id(tag.version))
                .bind(tag.generation)
                .bind(sql_id(tag.last_editor_id.0))
                .bind(tag.last_edited_at)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
                tag
            }
        };

        tx.commit().await.map_err(unavailable)?;
        Ok(tag)
    }

    async fn delete(&self, guild_id: GuildId, name: &str) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let removed = sqlx::query("DELETE FROM tags WHERE guild_id = ? AND name = ?")
            .bind(sql_id(guild_id.0))
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .rows_affected();
        sqlx::query("DELETE FROM tag_revisions WHERE guild_id = ? AND name = ?")
            .bind(sql_id(guild_id.0))
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        tx.commit().await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn list(&self, guild_id: GuildId) -> DomainResult<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM tags WHERE guild_id = ?")
            .bind(sql_id(guild_id.0))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)
    }

    async fn history(&self, guild_id: GuildId, name: &str) -> DomainResult<Vec<TagRevision>> {
        let rows = sqlx::query(
            "SELECT version, body, editor_id, edited_at FROM tag_revisions
             WHERE guild_id = ? AND name = ? ORDER BY version ASC",
        )
        .bind(sql_id(guild_id.0))
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                let body: String = row.try_get("body").map_err(unavailable)?;
                Ok(TagRevision {
                    version: from_sql_id(row.try_get("version").map_err(unavailable)?),
                    body: decode_body(&body)?,
                    editor_id: UserId(from_sql_id(row.try_get("editor_id").map_err(unavailable)?)),
                    edited_at: row.try_get("edited_at").map_err(unavailable)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PermissionRepository for SqliteStore {
    async fn guild_exists(&self, guild_id: GuildId) -> DomainResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT guild_id FROM guilds WHERE guild_id = ?")
            .bind(sql_id(guild_id.0))
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(found.is_some())
    }

    async fn register_guild(&self, guild_id: GuildId) -> DomainResult<()> {
        sqlx::query("INSERT OR IGNORE INTO guilds (guild_id) VALUES (?)")
            .bind(sql_id(guild_id.0))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn overrides(&self, guild_id: GuildId) -> DomainResult<Vec<PermissionOverride>> {
        let rows = sqlx::query(
            "SELECT subject, subject_id, level FROM permission_overrides WHERE guild_id = ?",
        )
        .bind(sql_id(guild_id.0))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                Ok(PermissionOverride {
                    guild_id,
                    subject: parse_column::<SubjectType>(row, "subject")?,
                    subject_id: from_sql_id(row.try_get("subject_id").map_err(unavailable)?),
                    level: parse_column::<PermissionLevel>(row, "level")?,
                })
            })
            .collect()
    }

    async fn put_override(&self, entry: PermissionOverride) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO permission_overrides (guild_id, subject, subject_id, level)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (guild_id, subject, subject_id) DO UPDATE SET level = excluded.level",
        )
        .bind(sql_id(entry.guild_id.0))
        .bind(entry.subject.to_string())
        .bind(sql_id(entry.subject_id))
        .bind(entry.level.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn remove_override(
        &self,
        guild_id: GuildId,
        subject: SubjectType,
        subject_id: u64,
    ) -> DomainResult<bool> {
        let removed = sqlx::query(
            "DELETE FROM permission_overrides WHERE guild_id = ? AND subject = ? AND subject_id = ?",
        )
        .bind(sql_id(guild_id.0))
        .bind(subject.to_string())
        .bind(sql_id(subject_id))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?
        .rows_affected();
        Ok(removed > 0)
    }
}

#[async_trait]
impl ModerationRepository for SqliteStore {
    async fn append(&self, action: ModerationAction) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO moderation_actions
                (id, guild_id, user_id, kind, moderator_id, reason, timestamp, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(action.id)
        .bind(sql_id(action.guild_id.0))
        .bind(sql_id(action.user_id.0))
        .bind(action.kind.as_str())
        .bind(sql_id(action.moderator_id.0))
        .bind(&action.reason)
        .bind(action.timestamp)
        .bind(action.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn actions_for(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> DomainResult<Vec<ModerationAction>> {
        let rows = sqlx::query(
            "SELECT * FROM moderation_actions WHERE guild_id = ? AND user_id = ? ORDER BY seq ASC",
        )
        .bind(sql_id(guild_id.0))
        .bind(sql_id(user_id.0))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(action_from_row).collect()
    }
}
