//! Storage layer for the coding-activity tracker.
//!
//! Provides persistence for users, heartbeats, durations, summaries and the
//! per-user rewrite rules using `rusqlite` behind an `r2d2` pool.
//!
//! # Thread Safety
//!
//! [`Database`] is a cheap handle around a connection pool and is `Clone`,
//! `Send` and `Sync`. Every operation checks a connection out for its own
//! duration and never holds one while calling another operation, so a pool of
//! size one (the default for embedded SQLite) cannot deadlock.
//!
//! In-memory databases are always backed by a single connection, since each
//! `SQLite` memory connection is its own database.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with fixed millisecond
//! precision (e.g., `2024-01-15T10:30:00.000Z`). This ensures:
//! - Lexicographic ordering matches chronological ordering
//! - Readback is bit-for-bit stable
//! - Local-day arithmetic happens in the caller, never in SQL
//!
//! ## Ownership
//!
//! Every table except `key_string_values` references `users(id)` with
//! `ON DELETE CASCADE`, so deleting a user removes everything they own.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use thiserror::Error;

use ct_core::{EntityType, Filters};

mod durations;
mod heartbeats;
mod key_value;
mod leaderboard;
mod rules;
mod summaries;
mod users;

pub use heartbeats::{HeartbeatBatches, HeartbeatBounds};

/// Batch size used when streaming heartbeats.
pub const DEFAULT_STREAM_BATCH_SIZE: usize = 4096;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// No connection could be checked out of the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in {column}: {value}")]
    TimestampParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row violates a domain invariant.
    #[error("invalid data in {table}: {message}")]
    InvalidData { table: &'static str, message: String },
}

impl DbError {
    /// True for unique and foreign key violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Options for opening a file database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub connection_timeout: StdDuration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 1,
            connection_timeout: StdDuration::from_secs(30),
        }
    }
}

/// Database handle.
///
/// See the [module documentation](self) for thread safety considerations.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("max_connections", &self.pool.max_size())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path, options: PoolOptions) -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder()
            .max_size(options.max_connections.max(1))
            .connection_timeout(options.connection_timeout)
            .build(manager)?;
        let db = Self { pool };
        db.conn()?
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        db.init()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the handle and all
    /// of its clones are dropped.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;
        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    /// Checks a connection out of the pool.
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, DbError> {
        Ok(self.pool.get()?)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                time_zone TEXT NOT NULL DEFAULT 'UTC',
                start_of_week INTEGER NOT NULL DEFAULT 0,
                heartbeats_timeout_secs INTEGER NOT NULL DEFAULT 600,
                public_leaderboard INTEGER NOT NULL DEFAULT 0,
                share_badges INTEGER NOT NULL DEFAULT 0,
                exclude_from_retention INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Heartbeats: immutable raw activity, deduplicated by content hash
            -- time: RFC 3339 UTC with milliseconds (e.g., '2024-01-15T10:30:00.000Z')
            CREATE TABLE IF NOT EXISTS heartbeats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                time TEXT NOT NULL,
                entity TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'file',
                category TEXT NOT NULL DEFAULT '',
                project TEXT NOT NULL DEFAULT '',
                branch TEXT NOT NULL DEFAULT '',
                language TEXT NOT NULL DEFAULT '',
                editor TEXT NOT NULL DEFAULT '',
                operating_system TEXT NOT NULL DEFAULT '',
                machine TEXT NOT NULL DEFAULT '',
                is_write INTEGER NOT NULL DEFAULT 0,
                user_agent TEXT NOT NULL DEFAULT '',
                origin TEXT NOT NULL DEFAULT '',
                hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_heartbeats_hash ON heartbeats(hash);
            CREATE INDEX IF NOT EXISTS idx_heartbeats_user_time ON heartbeats(user_id, time);
            CREATE INDEX IF NOT EXISTS idx_heartbeats_user_project ON heartbeats(user_id, project);

            -- Durations: materialized cache of contiguous work intervals
            CREATE TABLE IF NOT EXISTS durations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                length_ms INTEGER NOT NULL,
                timeout_secs INTEGER NOT NULL,
                project TEXT NOT NULL DEFAULT '',
                language TEXT NOT NULL DEFAULT '',
                editor TEXT NOT NULL DEFAULT '',
                operating_system TEXT NOT NULL DEFAULT '',
                machine TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                branch TEXT NOT NULL DEFAULT '',
                entity TEXT NOT NULL DEFAULT '',
                num_heartbeats INTEGER NOT NULL DEFAULT 0,
                group_hash TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_durations_user_time ON durations(user_id, time);

            CREATE TABLE IF NOT EXISTS summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                from_time TEXT NOT NULL,
                to_time TEXT NOT NULL,
                num_heartbeats INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_summaries_user_range
                ON summaries(user_id, from_time, to_time);

            -- type: entity dimension code (see EntityType::code)
            CREATE TABLE IF NOT EXISTS summary_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                summary_id INTEGER NOT NULL REFERENCES summaries(id) ON DELETE CASCADE,
                type INTEGER NOT NULL,
                key TEXT NOT NULL,
                total_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_summary_items_summary ON summary_items(summary_id);

            CREATE TABLE IF NOT EXISTS aliases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (user_id, type, key, value)
            );

            CREATE TABLE IF NOT EXISTS language_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                extension TEXT NOT NULL,
                language TEXT NOT NULL,
                UNIQUE (user_id, extension)
            );

            CREATE TABLE IF NOT EXISTS project_labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                project_key TEXT NOT NULL,
                label TEXT NOT NULL,
                UNIQUE (user_id, project_key, label)
            );

            -- by: entity dimension code, NULL for the general row
            CREATE TABLE IF NOT EXISTS leaderboard_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                interval TEXT NOT NULL,
                by INTEGER,
                key TEXT,
                total_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_leaderboard_interval
                ON leaderboard_items(interval, by, key);
            CREATE INDEX IF NOT EXISTS idx_leaderboard_user ON leaderboard_items(user_id);

            CREATE TABLE IF NOT EXISTS key_string_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

fn parse_timestamp(value: &str, column: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            column,
            value: value.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_user_id(value: String, table: &'static str) -> Result<ct_core::UserId, DbError> {
    ct_core::UserId::new(value).map_err(|err| DbError::InvalidData {
        table,
        message: err.to_string(),
    })
}

fn parse_entity_type(code: u8, table: &'static str) -> Result<EntityType, DbError> {
    EntityType::from_code(code).ok_or_else(|| DbError::InvalidData {
        table,
        message: format!("unknown entity type code {code}"),
    })
}

/// Appends `AND <column> IN (...)` for every native filter dimension.
///
/// Label filters must be expanded to projects by the caller; they have no
/// column and are skipped here. An empty value set matches nothing.
fn push_filter_clauses(filters: &Filters, sql: &mut String, params: &mut Vec<Value>) {
    for (entity_type, values) in filters.iter() {
        let Some(column) = entity_type.column() else {
            tracing::debug!(entity_type = %entity_type, "skipping filter without column");
            continue;
        };
        if values.is_empty() {
            sql.push_str(" AND 0");
            continue;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        sql.push_str(&format!(" AND {column} IN ({placeholders})"));
        params.extend(values.iter().cloned().map(Value::Text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_columns(db: &Database, table: &str) -> Vec<String> {
        let conn = db.conn().expect("conn");
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("pragma");
        stmt.query_map([], |row| row.get::<_, String>(1))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("columns")
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db, "summaries"),
            vec!["id", "user_id", "from_time", "to_time", "num_heartbeats"]
        );
        assert_eq!(
            table_columns(&db, "leaderboard_items"),
            vec!["id", "user_id", "interval", "by", "key", "total_ms", "created_at"]
        );
        for table in [
            "users",
            "heartbeats",
            "durations",
            "summary_items",
            "aliases",
            "language_mappings",
            "project_labels",
            "key_string_values",
        ] {
            assert!(!table_columns(&db, table).is_empty(), "missing table {table}");
        }
    }

    #[test]
    fn open_file_database_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ct.db");
        drop(Database::open(&path, PoolOptions::default()).expect("first open"));
        let db = Database::open(&path, PoolOptions::default()).expect("second open");
        assert!(!table_columns(&db, "heartbeats").is_empty());
    }

    #[test]
    fn timestamps_have_fixed_precision() {
        let time = DateTime::from_timestamp(1_705_312_800, 0).unwrap();
        assert_eq!(format_timestamp(time), "2024-01-15T10:00:00.000Z");
        assert_eq!(parse_timestamp("2024-01-15T10:00:00.000Z", "time").unwrap(), time);
        assert!(parse_timestamp("yesterday", "time").is_err());
    }

    #[test]
    fn filters_become_in_clauses() {
        let mut filters = Filters::new();
        filters.insert(EntityType::Project, "a");
        filters.insert(EntityType::Language, "-");
        let mut sql = String::new();
        let mut params = Vec::new();
        push_filter_clauses(&filters, &mut sql, &mut params);
        assert_eq!(sql, " AND project IN (?) AND language IN (?)");
        assert_eq!(params, vec![Value::Text("a".into()), Value::Text(String::new())]);
    }
}
