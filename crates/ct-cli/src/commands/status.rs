//! Status command for showing stored data per user.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use ct_core::Filters;
use ct_engine::Engine;

pub fn run<W: Write>(writer: &mut W, engine: &Engine, database_path: &Path) -> Result<()> {
    let db = engine.db();
    writeln!(writer, "Coding time status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Heartbeats: {}", db.count_heartbeats(None)?)?;

    let users = engine.users()?;
    if users.is_empty() {
        writeln!(writer, "No users.")?;
        return Ok(());
    }

    writeln!(writer, "Users:")?;
    for user in users {
        let last = db
            .latest_heartbeat(&user.id, &Filters::new())?
            .map_or_else(
                || "never".to_string(),
                |heartbeat| heartbeat.time.with_timezone(&user.time_zone).to_rfc3339(),
            );
        writeln!(
            writer,
            "- {}: {} heartbeats, {} durations, {} summaries, last active {last}",
            user.id,
            db.count_heartbeats(Some(&user.id))?,
            db.count_durations(&user.id)?,
            db.count_summaries(&user.id)?,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use ct_core::{Heartbeat, User, UserId};
    use ct_db::Database;
    use ct_engine::EngineConfig;
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn status_lists_users_with_last_activity() {
        let engine = Engine::new(Database::open_in_memory().unwrap(), EngineConfig::default());
        let mut output = Vec::new();
        run(&mut output, &engine, Path::new("/tmp/ct.db")).unwrap();
        assert!(String::from_utf8(output).unwrap().ends_with("No users.\n"));

        let time = DateTime::parse_from_rfc3339("2024-01-15T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let alice = User::new(UserId::new("alice").unwrap(), time);
        engine.create_user(&alice).unwrap();
        engine
            .db()
            .insert_heartbeats(&[Heartbeat::new(alice.id.clone(), time, "main.rs")])
            .unwrap();

        let mut output = Vec::new();
        run(&mut output, &engine, Path::new("/tmp/ct.db")).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output);
    }
}
