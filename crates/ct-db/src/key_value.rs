//! Global string key-value store for process-level markers such as
//! first-heartbeat timestamps and job bookkeeping.

use rusqlite::{OptionalExtension, params};

use crate::{Database, DbError};

impl Database {
    pub fn get_key_value(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT value FROM key_string_values WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Inserts or replaces the value stored under `key`.
    pub fn put_key_value(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO key_string_values (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            ",
            params![key, value],
        )?;
        Ok(())
    }

    /// Stores `value` only if `key` is unset. Returns `true` if it was stored.
    pub fn put_key_value_if_absent(&self, key: &str, value: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "INSERT OR IGNORE INTO key_string_values (key, value) VALUES (?, ?)",
            params![key, value],
        )? > 0)
    }

    pub fn delete_key_value(&self, key: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM key_string_values WHERE key = ?", [key])? > 0)
    }

    /// All pairs whose key starts with `prefix`, ordered by key.
    pub fn list_key_values(&self, prefix: &str) -> Result<Vec<(String, String)>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM key_string_values \
             WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC",
        )?;
        let rows = stmt.query_map([prefix], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_key_value("missing").unwrap(), None);

        db.put_key_value("first_heartbeat_alice", "2024-01-15T10:00:00.000Z").unwrap();
        db.put_key_value("first_heartbeat_alice", "2024-01-14T10:00:00.000Z").unwrap();
        assert_eq!(
            db.get_key_value("first_heartbeat_alice").unwrap().as_deref(),
            Some("2024-01-14T10:00:00.000Z")
        );

        assert!(db.delete_key_value("first_heartbeat_alice").unwrap());
        assert!(!db.delete_key_value("first_heartbeat_alice").unwrap());
    }

    #[test]
    fn put_if_absent_keeps_first_value() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.put_key_value_if_absent("k", "one").unwrap());
        assert!(!db.put_key_value_if_absent("k", "two").unwrap());
        assert_eq!(db.get_key_value("k").unwrap().as_deref(), Some("one"));
    }

    #[test]
    fn list_by_prefix_treats_wildcards_literally() {
        let db = Database::open_in_memory().unwrap();
        db.put_key_value("first_heartbeat_bob", "b").unwrap();
        db.put_key_value("first_heartbeat_alice", "a").unwrap();
        db.put_key_value("firstXheartbeat", "x").unwrap();
        db.put_key_value("last_run", "r").unwrap();

        let listed = db.list_key_values("first_").unwrap();
        assert_eq!(
            listed,
            vec![
                ("first_heartbeat_alice".to_string(), "a".to_string()),
                ("first_heartbeat_bob".to_string(), "b".to_string()),
            ]
        );
    }
}
