use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};

use ct_core::{EntityType, Filters, Heartbeat, HeartbeatType, UserId};

use crate::{
    Database, DbError, format_timestamp, parse_timestamp, parse_user_id, push_filter_clauses,
};

const COLUMNS: &str = "id, user_id, time, entity, type, category, project, branch, language, \
                       editor, operating_system, machine, is_write, user_agent, origin, hash, \
                       created_at";

/// First and last heartbeat instants of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatBounds {
    pub user_id: UserId,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// A heartbeat row before domain validation.
struct RawHeartbeat {
    id: i64,
    user_id: String,
    time: String,
    entity: String,
    kind: String,
    category: String,
    project: String,
    branch: String,
    language: String,
    editor: String,
    operating_system: String,
    machine: String,
    is_write: bool,
    user_agent: String,
    origin: String,
    hash: String,
    created_at: String,
}

impl RawHeartbeat {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            time: row.get(2)?,
            entity: row.get(3)?,
            kind: row.get(4)?,
            category: row.get(5)?,
            project: row.get(6)?,
            branch: row.get(7)?,
            language: row.get(8)?,
            editor: row.get(9)?,
            operating_system: row.get(10)?,
            machine: row.get(11)?,
            is_write: row.get(12)?,
            user_agent: row.get(13)?,
            origin: row.get(14)?,
            hash: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn into_heartbeat(self) -> Result<Heartbeat, DbError> {
        let kind: HeartbeatType = self.kind.parse().map_err(|err: ct_core::ValidationError| {
            DbError::InvalidData {
                table: "heartbeats",
                message: err.to_string(),
            }
        })?;
        Ok(Heartbeat {
            user_id: parse_user_id(self.user_id, "heartbeats")?,
            time: parse_timestamp(&self.time, "heartbeats.time")?,
            entity: self.entity,
            kind,
            category: self.category,
            project: self.project,
            branch: self.branch,
            language: self.language,
            editor: self.editor,
            operating_system: self.operating_system,
            machine: self.machine,
            is_write: self.is_write,
            user_agent: self.user_agent,
            origin: self.origin,
            hash: self.hash,
            created_at: parse_timestamp(&self.created_at, "heartbeats.created_at")?,
        })
    }
}

impl Database {
    /// Inserts heartbeats, ignoring replays of already stored ones.
    ///
    /// Returns one flag per input heartbeat, `true` when it was new.
    pub fn insert_heartbeats(&self, heartbeats: &[Heartbeat]) -> Result<Vec<bool>, DbError> {
        if heartbeats.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(heartbeats.len());
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO heartbeats
                (user_id, time, entity, type, category, project, branch, language, editor,
                 operating_system, machine, is_write, user_agent, origin, hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for heartbeat in heartbeats {
                let changed = stmt.execute(params![
                    heartbeat.user_id.as_str(),
                    format_timestamp(heartbeat.time),
                    heartbeat.entity,
                    heartbeat.kind.as_str(),
                    heartbeat.category,
                    heartbeat.project,
                    heartbeat.branch,
                    heartbeat.language,
                    heartbeat.editor,
                    heartbeat.operating_system,
                    heartbeat.machine,
                    heartbeat.is_write,
                    heartbeat.user_agent,
                    heartbeat.origin,
                    heartbeat.hash,
                    format_timestamp(heartbeat.created_at),
                ])?;
                inserted.push(changed > 0);
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists a user's heartbeats in `[from, to)` ordered by time.
    pub fn heartbeats_in_range(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filters: &Filters,
    ) -> Result<Vec<Heartbeat>, DbError> {
        let mut heartbeats = Vec::new();
        let batch_size = crate::DEFAULT_STREAM_BATCH_SIZE;
        for batch in self.stream_heartbeats(user_id, from, to, filters, batch_size) {
            heartbeats.extend(batch?);
        }
        Ok(heartbeats)
    }

    /// Streams a user's heartbeats in `[from, to)` in time order, one batch
    /// at a time.
    pub fn stream_heartbeats(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filters: &Filters,
        batch_size: usize,
    ) -> HeartbeatBatches<'_> {
        HeartbeatBatches {
            db: self,
            user_id: user_id.clone(),
            from: format_timestamp(from),
            to: format_timestamp(to),
            filters: filters.clone(),
            batch_size: batch_size.max(1),
            cursor: None,
            done: from >= to,
        }
    }

    /// Most recent heartbeat of a user matching the filters.
    pub fn latest_heartbeat(
        &self,
        user_id: &UserId,
        filters: &Filters,
    ) -> Result<Option<Heartbeat>, DbError> {
        let mut sql = format!("SELECT {COLUMNS} FROM heartbeats WHERE user_id = ?");
        let mut values = vec![Value::Text(user_id.as_str().to_string())];
        push_filter_clauses(filters, &mut sql, &mut values);
        sql.push_str(" ORDER BY time DESC, id DESC LIMIT 1");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params_from_iter(values), RawHeartbeat::from_row)?;
        rows.next().transpose()?.map(RawHeartbeat::into_heartbeat).transpose()
    }

    /// First and last heartbeat per user. An empty slice means all users.
    pub fn heartbeat_bounds(&self, user_ids: &[UserId]) -> Result<Vec<HeartbeatBounds>, DbError> {
        let mut sql = String::from("SELECT user_id, MIN(time), MAX(time) FROM heartbeats");
        if !user_ids.is_empty() {
            let placeholders = vec!["?"; user_ids.len()].join(", ");
            sql.push_str(&format!(" WHERE user_id IN ({placeholders})"));
        }
        sql.push_str(" GROUP BY user_id ORDER BY user_id ASC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(user_ids.iter().map(UserId::as_str)), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut bounds = Vec::new();
        for row in rows {
            let (user_id, first, last) = row?;
            bounds.push(HeartbeatBounds {
                user_id: parse_user_id(user_id, "heartbeats")?,
                first: parse_timestamp(&first, "heartbeats.time")?,
                last: parse_timestamp(&last, "heartbeats.time")?,
            });
        }
        Ok(bounds)
    }

    /// Counts heartbeats of one user, or of everyone.
    pub fn count_heartbeats(&self, user_id: Option<&UserId>) -> Result<i64, DbError> {
        let conn = self.conn()?;
        let count = match user_id {
            Some(user_id) => conn.query_row(
                "SELECT COUNT(*) FROM heartbeats WHERE user_id = ?",
                [user_id.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM heartbeats", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Counts a user's heartbeats in `[from, to)` matching the filters.
    pub fn count_heartbeats_between(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filters: &Filters,
    ) -> Result<i64, DbError> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM heartbeats WHERE user_id = ? AND time >= ? AND time < ?",
        );
        let mut values = vec![
            Value::Text(user_id.as_str().to_string()),
            Value::Text(format_timestamp(from)),
            Value::Text(format_timestamp(to)),
        ];
        push_filter_clauses(filters, &mut sql, &mut values);

        let conn = self.conn()?;
        let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count)
    }

    /// Deletes every heartbeat older than `before`.
    pub fn delete_heartbeats_before(&self, before: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM heartbeats WHERE time < ?",
            [format_timestamp(before)],
        )?)
    }

    pub fn delete_heartbeats_by_user(&self, user_id: &UserId) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM heartbeats WHERE user_id = ?",
            [user_id.as_str()],
        )?)
    }

    pub fn delete_heartbeats_by_user_before(
        &self,
        user_id: &UserId,
        before: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM heartbeats WHERE user_id = ? AND time < ?",
            params![user_id.as_str(), format_timestamp(before)],
        )?)
    }

    /// Distinct non-empty values a user has recorded for one dimension.
    pub fn distinct_values(
        &self,
        user_id: &UserId,
        entity_type: EntityType,
    ) -> Result<Vec<String>, DbError> {
        let column = entity_type.column().ok_or_else(|| DbError::InvalidData {
            table: "heartbeats",
            message: format!("{entity_type} is not a heartbeat column"),
        })?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM heartbeats \
             WHERE user_id = ? AND {column} != '' ORDER BY {column} ASC"
        ))?;
        let rows = stmt.query_map([user_id.as_str()], |row| row.get::<_, String>(0))?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }
}

/// Keyset-paginated heartbeat reader returned by [`Database::stream_heartbeats`].
///
/// Each batch checks out its own connection, so callers may run other
/// queries between batches.
pub struct HeartbeatBatches<'a> {
    db: &'a Database,
    user_id: UserId,
    from: String,
    to: String,
    filters: Filters,
    batch_size: usize,
    /// `(time, id)` of the last row returned.
    cursor: Option<(String, i64)>,
    done: bool,
}

impl HeartbeatBatches<'_> {
    fn fetch(&mut self) -> Result<Vec<Heartbeat>, DbError> {
        let mut sql = format!("SELECT {COLUMNS} FROM heartbeats WHERE user_id = ? AND time < ?");
        let mut values = vec![
            Value::Text(self.user_id.as_str().to_string()),
            Value::Text(self.to.clone()),
        ];
        match &self.cursor {
            None => {
                sql.push_str(" AND time >= ?");
                values.push(Value::Text(self.from.clone()));
            }
            Some((time, id)) => {
                sql.push_str(" AND (time > ? OR (time = ? AND id > ?))");
                values.push(Value::Text(time.clone()));
                values.push(Value::Text(time.clone()));
                values.push(Value::Integer(*id));
            }
        }
        push_filter_clauses(&self.filters, &mut sql, &mut values);
        sql.push_str(" ORDER BY time ASC, id ASC LIMIT ?");
        values.push(Value::Integer(i64::try_from(self.batch_size).unwrap_or(i64::MAX)));

        let raw = {
            let conn = self.db.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), RawHeartbeat::from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        if raw.len() < self.batch_size {
            self.done = true;
        }
        if let Some(last) = raw.last() {
            self.cursor = Some((last.time.clone(), last.id));
        }
        raw.into_iter().map(RawHeartbeat::into_heartbeat).collect()
    }
}

impl Iterator for HeartbeatBatches<'_> {
    type Item = Result<Vec<Heartbeat>, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fetch() {
            Ok(batch) if batch.is_empty() => None,
            Ok(batch) => Some(Ok(batch)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
