use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, params};

use ct_core::{Duration, UserId};

use crate::{Database, DbError, format_timestamp, parse_timestamp, parse_user_id};

const COLUMNS: &str = "user_id, time, length_ms, timeout_secs, project, language, editor, \
                       operating_system, machine, category, branch, entity, num_heartbeats, \
                       group_hash";

struct RawDuration {
    user_id: String,
    time: String,
    length_ms: i64,
    timeout_secs: i64,
    project: String,
    language: String,
    editor: String,
    operating_system: String,
    machine: String,
    category: String,
    branch: String,
    entity: String,
    num_heartbeats: i64,
    group_hash: String,
}

impl RawDuration {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            time: row.get(1)?,
            length_ms: row.get(2)?,
            timeout_secs: row.get(3)?,
            project: row.get(4)?,
            language: row.get(5)?,
            editor: row.get(6)?,
            operating_system: row.get(7)?,
            machine: row.get(8)?,
            category: row.get(9)?,
            branch: row.get(10)?,
            entity: row.get(11)?,
            num_heartbeats: row.get(12)?,
            group_hash: row.get(13)?,
        })
    }

    fn into_duration(self) -> Result<Duration, DbError> {
        Ok(Duration {
            user_id: parse_user_id(self.user_id, "durations")?,
            time: parse_timestamp(&self.time, "durations.time")?,
            length: TimeDelta::milliseconds(self.length_ms),
            timeout: TimeDelta::seconds(self.timeout_secs),
            project: self.project,
            language: self.language,
            editor: self.editor,
            operating_system: self.operating_system,
            machine: self.machine,
            category: self.category,
            branch: self.branch,
            entity: self.entity,
            num_heartbeats: self.num_heartbeats,
            group_hash: self.group_hash,
        })
    }
}

fn insert_all(tx: &Transaction<'_>, durations: &[Duration]) -> Result<usize, DbError> {
    let mut stmt = tx.prepare(
        "
        INSERT INTO durations
        (user_id, time, end_time, length_ms, timeout_secs, project, language, editor,
         operating_system, machine, category, branch, entity, num_heartbeats, group_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )?;
    let mut inserted = 0;
    for duration in durations {
        inserted += stmt.execute(params![
            duration.user_id.as_str(),
            format_timestamp(duration.time),
            format_timestamp(duration.end()),
            duration.length.num_milliseconds(),
            duration.timeout.num_seconds(),
            duration.project,
            duration.language,
            duration.editor,
            duration.operating_system,
            duration.machine,
            duration.category,
            duration.branch,
            duration.entity,
            duration.num_heartbeats,
            duration.group_hash,
        ])?;
    }
    Ok(inserted)
}

impl Database {
    pub fn insert_durations(&self, durations: &[Duration]) -> Result<usize, DbError> {
        if durations.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let inserted = insert_all(&tx, durations)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Atomically replaces a user's durations starting at or after `from`.
    pub fn replace_durations_from(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        durations: &[Duration],
    ) -> Result<usize, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM durations WHERE user_id = ? AND time >= ?",
            params![user_id.as_str(), format_timestamp(from)],
        )?;
        let inserted = insert_all(&tx, durations)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Durations of a user that overlap `[from, to)`, ordered by start time.
    pub fn durations_overlapping(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Duration>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "
                SELECT {COLUMNS} FROM durations
                WHERE user_id = ? AND time < ? AND end_time >= ?
                ORDER BY time ASC, id ASC
                "
            ))?;
            let rows = stmt.query_map(
                params![user_id.as_str(), format_timestamp(to), format_timestamp(from)],
                RawDuration::from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter().map(RawDuration::into_duration).collect()
    }

    /// The duration with the latest start for a user.
    pub fn latest_duration(&self, user_id: &UserId) -> Result<Option<Duration>, DbError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM durations WHERE user_id = ? \
                     ORDER BY time DESC, id DESC LIMIT 1"
                ),
                [user_id.as_str()],
                RawDuration::from_row,
            )
            .optional()?;
        raw.map(RawDuration::into_duration).transpose()
    }

    pub fn count_durations(&self, user_id: &UserId) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM durations WHERE user_id = ?",
            [user_id.as_str()],
            |row| row.get(0),
        )?)
    }

    pub fn delete_durations_by_user(&self, user_id: &UserId) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM durations WHERE user_id = ?", [user_id.as_str()])?)
    }

    /// Deletes a user's durations that end at or after `at`.
    pub fn delete_durations_ending_after(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM durations WHERE user_id = ? AND end_time >= ?",
            params![user_id.as_str(), format_timestamp(at)],
        )?)
    }

    pub fn delete_durations_by_user_before(
        &self,
        user_id: &UserId,
        before: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM durations WHERE user_id = ? AND time < ?",
            params![user_id.as_str(), format_timestamp(before)],
        )?)
    }
}
