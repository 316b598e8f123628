use chrono::Weekday;
use rusqlite::{OptionalExtension, Row, params};

use ct_core::{User, UserId};

use crate::{Database, DbError, format_timestamp, parse_timestamp, parse_user_id};

const COLUMNS: &str = "id, time_zone, start_of_week, heartbeats_timeout_secs, public_leaderboard, \
                       share_badges, exclude_from_retention, created_at";

struct RawUser {
    id: String,
    time_zone: String,
    start_of_week: u8,
    heartbeats_timeout_secs: i64,
    public_leaderboard: bool,
    share_badges: bool,
    exclude_from_retention: bool,
    created_at: String,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            time_zone: row.get(1)?,
            start_of_week: row.get(2)?,
            heartbeats_timeout_secs: row.get(3)?,
            public_leaderboard: row.get(4)?,
            share_badges: row.get(5)?,
            exclude_from_retention: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_user(self) -> Result<User, DbError> {
        let invalid = |message: String| DbError::InvalidData {
            table: "users",
            message,
        };
        Ok(User {
            id: parse_user_id(self.id, "users")?,
            time_zone: ct_core::day::parse_tz(&self.time_zone)
                .map_err(|err| invalid(err.to_string()))?,
            start_of_week: Weekday::try_from(self.start_of_week)
                .map_err(|_| invalid(format!("invalid start of week {}", self.start_of_week)))?,
            heartbeats_timeout_secs: self.heartbeats_timeout_secs,
            public_leaderboard: self.public_leaderboard,
            share_badges: self.share_badges,
            exclude_from_retention: self.exclude_from_retention,
            created_at: parse_timestamp(&self.created_at, "users.created_at")?,
        })
    }
}

impl Database {
    /// Inserts a new user. Fails with a constraint violation if the ID exists.
    pub fn insert_user(&self, user: &User) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO users ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                user.id.as_str(),
                user.time_zone.name(),
                user.start_of_week.num_days_from_monday(),
                user.heartbeats_timeout_secs,
                user.public_leaderboard,
                user.share_badges,
                user.exclude_from_retention,
                format_timestamp(user.created_at),
            ],
        )?;
        Ok(())
    }

    /// Updates a user's preferences. Returns `false` if the user does not exist.
    pub fn update_user(&self, user: &User) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "
            UPDATE users
            SET time_zone = ?, start_of_week = ?, heartbeats_timeout_secs = ?,
                public_leaderboard = ?, share_badges = ?, exclude_from_retention = ?
            WHERE id = ?
            ",
            params![
                user.time_zone.name(),
                user.start_of_week.num_days_from_monday(),
                user.heartbeats_timeout_secs,
                user.public_leaderboard,
                user.share_badges,
                user.exclude_from_retention,
                user.id.as_str(),
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn get_user(&self, user_id: &UserId) -> Result<Option<User>, DbError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM users WHERE id = ?"),
                [user_id.as_str()],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    /// Lists all users ordered by ID.
    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        let raw = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM users ORDER BY id ASC"))?;
            let rows = stmt.query_map([], RawUser::from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        raw.into_iter().map(RawUser::into_user).collect()
    }

    pub fn count_users(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    /// Deletes a user and, through cascading keys, everything they own.
    pub fn delete_user(&self, user_id: &UserId) -> Result<bool, DbError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM users WHERE id = ?", [user_id.as_str()])? > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use chrono_tz::Tz;

    use super::*;

    fn user(id: &str) -> User {
        User::new(UserId::new(id).unwrap(), DateTime::from_timestamp(1_705_300_000, 0).unwrap())
    }

    #[test]
    fn user_round_trips_preferences() {
        let db = Database::open_in_memory().unwrap();
        let mut alice = user("alice");
        alice.time_zone = "Europe/Berlin".parse::<Tz>().unwrap();
        alice.start_of_week = Weekday::Sun;
        alice.public_leaderboard = true;
        db.insert_user(&alice).unwrap();

        assert_eq!(db.get_user(&alice.id).unwrap(), Some(alice.clone()));
        assert!(db.insert_user(&alice).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let mut alice = user("alice");
        db.insert_user(&alice).unwrap();
        db.insert_user(&user("bob")).unwrap();

        alice.heartbeats_timeout_secs = 300;
        assert!(db.update_user(&alice).unwrap());
        assert_eq!(db.get_user(&alice.id).unwrap().unwrap().heartbeats_timeout_secs, 300);
        assert!(!db.update_user(&user("carol")).unwrap());

        let ids: Vec<String> =
            db.list_users().unwrap().into_iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
        assert!(db.delete_user(&alice.id).unwrap());
        assert!(db.get_user(&alice.id).unwrap().is_none());
        assert_eq!(db.count_users().unwrap(), 1);
    }
}
