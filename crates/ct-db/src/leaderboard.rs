use rusqlite::params;

use ct_core::interval::Interval;
use ct_core::{EntityType, LeaderboardItem, RankedItem, UserId};

use crate::{Database, DbError, format_timestamp, parse_user_id};

impl Database {
    /// Replaces a user's leaderboard rows for one interval in a single
    /// transaction.
    pub fn replace_leaderboard_items(
        &self,
        user_id: &UserId,
        interval: Interval,
        items: &[LeaderboardItem],
    ) -> Result<usize, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM leaderboard_items WHERE user_id = ? AND interval = ?",
            params![user_id.as_str(), interval.as_str()],
        )?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO leaderboard_items (user_id, interval, by, key, total_ms, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for item in items {
                inserted += stmt.execute(params![
                    item.user_id.as_str(),
                    item.interval.as_str(),
                    item.by.map(EntityType::code),
                    item.key,
                    item.total_ms,
                    format_timestamp(item.created_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Ranked rows for one interval and dimension. `by = None` selects the
    /// general ranking; `key` narrows an aggregated ranking to one key.
    ///
    /// Ranks are computed per key with ties sharing a rank; rows with equal
    /// rank are ordered by user id.
    pub fn ranked_leaderboard(
        &self,
        interval: Interval,
        by: Option<EntityType>,
        key: Option<&str>,
    ) -> Result<Vec<RankedItem>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "
                SELECT rank() OVER (PARTITION BY key ORDER BY total_ms DESC) AS ranking,
                       user_id, key, total_ms
                FROM leaderboard_items
                WHERE interval = ?1 AND by IS ?2 AND (?3 IS NULL OR key = ?3)
                ORDER BY key ASC, ranking ASC, user_id ASC
                ",
            )?;
            let rows = stmt.query_map(
                params![interval.as_str(), by.map(EntityType::code), key],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter()
            .map(|(rank, user_id, key, total_ms)| {
                Ok(RankedItem {
                    rank,
                    user_id: parse_user_id(user_id, "leaderboard_items")?,
                    key,
                    total_ms,
                })
            })
            .collect()
    }

    /// Number of rows a user has on any leaderboard.
    pub fn count_leaderboard_items(&self, user_id: &UserId) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM leaderboard_items WHERE user_id = ?",
            [user_id.as_str()],
            |row| row.get(0),
        )?)
    }

    pub fn delete_leaderboard_items_by_user(&self, user_id: &UserId) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM leaderboard_items WHERE user_id = ?",
            [user_id.as_str()],
        )?)
    }

    pub fn delete_leaderboard_items_by_interval(
        &self,
        interval: Interval,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM leaderboard_items WHERE interval = ?",
            [interval.as_str()],
        )?)
    }
}
