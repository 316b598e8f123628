//! Shared utilities for CLI commands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use ct_core::{Interval, User, UserId, parse_date_time};
use ct_db::Database;
use ct_engine::Engine;

use crate::Config;

/// Opens the configured database, creating its directory, and wires the
/// engine to it.
pub fn open_engine(config: &Config) -> Result<Engine> {
    config.validate().context("invalid configuration")?;
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let db = Database::open(&config.database_path, config.pool_options())
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let engine_config = config.engine_config().context("invalid configuration")?;
    Ok(Engine::new(db, engine_config))
}

pub fn user_id(id: &str) -> Result<UserId> {
    UserId::new(id).with_context(|| format!("invalid user id: {id:?}"))
}

pub fn load_user(engine: &Engine, id: &str) -> Result<User> {
    Ok(engine.user(&user_id(id)?)?)
}

/// Resolves `--interval` or `--from`/`--to` to instants in the user's zone.
/// Without either, the range is today so far.
pub fn resolve_range(
    user: &User,
    interval: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if let Some(interval) = interval {
        let interval: Interval = interval.parse()?;
        return Ok(interval.resolve(now, user.time_zone, user.start_of_week));
    }
    let Some(from) = from else {
        return Ok(Interval::Today.resolve(now, user.time_zone, user.start_of_week));
    };
    let from = parse_date_time("from", from, user.time_zone)?;
    let to = match to {
        Some(to) => parse_date_time("to", to, user.time_zone)?,
        None => now,
    };
    Ok((from, to))
}

/// Formats milliseconds as `Xh Ym` or `Ym`.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value).context("failed to serialize output")?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ct_core::day;

    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn berlin() -> User {
        let mut user = User::new(UserId::new("alice").unwrap(), utc("2024-01-01T00:00:00Z"));
        user.time_zone = day::parse_tz("Europe/Berlin").unwrap();
        user
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(59_999), "0m");
        assert_eq!(format_duration(3_600_000), "1h 0m");
        assert_eq!(format_duration(5_400_000), "1h 30m");
        assert_eq!(format_duration(-1), "0m");
    }

    #[test]
    fn dates_are_local_to_the_user() {
        let now = utc("2024-01-15T12:00:00Z");
        let (from, to) =
            resolve_range(&berlin(), None, Some("2024-01-10"), Some("2024-01-12"), now).unwrap();
        assert_eq!(from, utc("2024-01-09T23:00:00Z"));
        assert_eq!(to, utc("2024-01-11T23:00:00Z"));
    }

    #[test]
    fn interval_wins_and_today_is_the_default() {
        let now = utc("2024-01-15T12:00:00Z");
        let (from, to) = resolve_range(&berlin(), Some("yesterday"), None, None, now).unwrap();
        assert_eq!((from, to), (utc("2024-01-13T23:00:00Z"), utc("2024-01-14T23:00:00Z")));

        let (from, to) = resolve_range(&berlin(), None, None, None, now).unwrap();
        assert_eq!((from, to), (utc("2024-01-14T23:00:00Z"), now));

        assert!(resolve_range(&berlin(), Some("fortnight"), None, None, now).is_err());
    }
}
