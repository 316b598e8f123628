use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter};

use ct_core::{Summary, SummaryItem, UserId};

use crate::{Database, DbError, format_timestamp, parse_entity_type, parse_timestamp, parse_user_id};

impl Database {
    /// Persists a summary with its items and returns the new row id.
    ///
    /// A second summary for the same `(user, from, to)` fails with a
    /// constraint violation.
    pub fn insert_summary(&self, summary: &Summary) -> Result<i64, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO summaries (user_id, from_time, to_time, num_heartbeats) \
             VALUES (?, ?, ?, ?)",
            params![
                summary.user_id.as_str(),
                format_timestamp(summary.from),
                format_timestamp(summary.to),
                summary.num_heartbeats,
            ],
        )?;
        let summary_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO summary_items (summary_id, type, key, total_ms) VALUES (?, ?, ?, ?)",
            )?;
            for item in summary.all_items() {
                let code = item.entity_type.code();
                stmt.execute(params![summary_id, code, item.key, item.total_ms])?;
            }
        }
        tx.commit()?;
        Ok(summary_id)
    }

    /// Summaries of a user lying entirely within `[from, to]`, ordered by start.
    ///
    /// Rows without heartbeats are skipped. Items are loaded with a single
    /// follow-up query.
    pub fn summaries_within(
        &self,
        user_id: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Summary>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "
            SELECT id, user_id, from_time, to_time, num_heartbeats
            FROM summaries
            WHERE user_id = ? AND from_time >= ? AND to_time <= ? AND num_heartbeats > 0
            ORDER BY from_time ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), format_timestamp(from), format_timestamp(to)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, user_id, from_time, to_time, num_heartbeats) = row?;
            let mut summary = Summary::new(
                parse_user_id(user_id, "summaries")?,
                parse_timestamp(&from_time, "summaries.from_time")?,
                parse_timestamp(&to_time, "summaries.to_time")?,
            );
            summary.id = Some(id);
            summary.num_heartbeats = num_heartbeats;
            summaries.push(summary);
        }
        if summaries.is_empty() {
            return Ok(summaries);
        }

        let ids: Vec<i64> = summaries.iter().filter_map(|s| s.id).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT summary_id, type, key, total_ms FROM summary_items \
             WHERE summary_id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let index: HashMap<i64, usize> = summaries
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.id.map(|id| (id, i)))
            .collect();
        for row in rows {
            let (summary_id, code, key, total_ms) = row?;
            let entity_type = parse_entity_type(code, "summary_items")?;
            if let Some(position) = index.get(&summary_id) {
                summaries[*position].push_item(SummaryItem::new(entity_type, key, total_ms));
            }
        }
        for summary in &mut summaries {
            summary.finalize();
        }
        Ok(summaries)
    }

    /// End of the latest persisted summary per user.
    pub fn last_summary_ends(&self) -> Result<Vec<(UserId, DateTime<Utc>)>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, MAX(to_time) FROM summaries GROUP BY user_id ORDER BY user_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut ends = Vec::new();
        for row in rows {
            let (user_id, to_time) = row?;
            ends.push((
                parse_user_id(user_id, "summaries")?,
                parse_timestamp(&to_time, "summaries.to_time")?,
            ));
        }
        Ok(ends)
    }

    pub fn count_summaries(&self, user_id: &UserId) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM summaries WHERE user_id = ?",
            [user_id.as_str()],
            |row| row.get(0),
        )?)
    }

    pub fn delete_summaries_by_user(&self, user_id: &UserId) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM summaries WHERE user_id = ?", [user_id.as_str()])?)
    }

    /// Deletes summaries that end after `at`.
    pub fn delete_summaries_by_user_ending_after(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM summaries WHERE user_id = ? AND to_time > ?",
            params![user_id.as_str(), format_timestamp(at)],
        )?)
    }

    /// Deletes summaries that end at or before `before`.
    pub fn delete_summaries_by_user_before(
        &self,
        user_id: &UserId,
        before: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM summaries WHERE user_id = ? AND to_time <= ?",
            params![user_id.as_str(), format_timestamp(before)],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use ct_core::{EntityType, User};

    use super::*;

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_705_276_800 + n * 86_400, 0).unwrap()
    }

    fn setup() -> (Database, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user_id = UserId::new("alice").unwrap();
        db.insert_user(&User::new(user_id.clone(), day(0))).unwrap();
        (db, user_id)
    }

    fn summary(user_id: &UserId, n: i64, project_secs: i64) -> Summary {
        let mut summary = Summary::new(user_id.clone(), day(n), day(n + 1));
        summary.num_heartbeats = i64::from(project_secs > 0);
        if project_secs > 0 {
            summary.push_item(SummaryItem::new(EntityType::Project, "ct", project_secs * 1000));
            summary.push_item(SummaryItem::new(EntityType::Language, "Rust", project_secs * 1000));
        }
        summary
    }

    #[test]
    fn summaries_round_trip_with_items() {
        let (db, user_id) = setup();
        let first = summary(&user_id, 0, 60);
        let second = summary(&user_id, 1, 120);
        db.insert_summary(&first).unwrap();
        db.insert_summary(&second).unwrap();

        let stored = db.summaries_within(&user_id, day(0), day(2)).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].items(EntityType::Project), second.items(EntityType::Project));
        assert_eq!(stored[0].total_by(EntityType::Language), 60_000);
        assert!(stored.iter().all(|s| s.id.is_some()));
    }

    #[test]
    fn partial_and_empty_summaries_are_excluded() {
        let (db, user_id) = setup();
        db.insert_summary(&summary(&user_id, 0, 60)).unwrap();
        db.insert_summary(&summary(&user_id, 1, 0)).unwrap();

        let stored = db
            .summaries_within(&user_id, day(0) + TimeDelta::hours(1), day(2))
            .unwrap();
        assert!(stored.is_empty());
        assert_eq!(db.summaries_within(&user_id, day(0), day(2)).unwrap().len(), 1);
        assert_eq!(db.last_summary_ends().unwrap(), vec![(user_id.clone(), day(2))]);
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let (db, user_id) = setup();
        db.insert_summary(&summary(&user_id, 0, 60)).unwrap();
        let err = db.insert_summary(&summary(&user_id, 0, 60)).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn deletes_cascade_to_items() {
        let (db, user_id) = setup();
        db.insert_summary(&summary(&user_id, 0, 60)).unwrap();
        db.insert_summary(&summary(&user_id, 1, 60)).unwrap();
        db.insert_summary(&summary(&user_id, 2, 60)).unwrap();
        assert_eq!(db.delete_summaries_by_user_before(&user_id, day(1)).unwrap(), 1);
        assert_eq!(db.delete_summaries_by_user_ending_after(&user_id, day(2)).unwrap(), 1);
        assert_eq!(db.count_summaries(&user_id).unwrap(), 1);
        assert!(db.delete_user(&user_id).unwrap());
        let conn = db.conn().unwrap();
        let items: i64 = conn
            .query_row("SELECT COUNT(*) FROM summary_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(items, 0);
    }
}
