//! One-shot runs of the scheduled jobs.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};

use ct_engine::Engine;

use super::util::{load_user, user_id};

pub fn aggregate<W: Write>(
    writer: &mut W,
    engine: &Engine,
    users: &[String],
    now: DateTime<Utc>,
) -> Result<()> {
    let user_ids = users.iter().map(|id| user_id(id)).collect::<Result<Vec<_>>>()?;
    let report = engine.aggregator().run(now, &user_ids)?;
    writeln!(
        writer,
        "Aggregated {} users: {} summaries stored, {} failed, {} skipped",
        report.users, report.summaries, report.failed, report.skipped
    )?;
    Ok(())
}

pub fn cleanup<W: Write>(writer: &mut W, engine: &Engine, now: DateTime<Utc>) -> Result<()> {
    if !engine.housekeeping().retention_enabled() {
        writeln!(writer, "Data retention is disabled; nothing to clean up.")?;
        return Ok(());
    }
    let report = engine.housekeeping().run(now)?;
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    writeln!(
        writer,
        "{verb} {} heartbeats, {} durations and {} summaries of {} users",
        report.heartbeats, report.durations, report.summaries, report.users
    )?;
    Ok(())
}

/// Rebuilds stored durations for the given users, or all users.
pub fn regenerate_durations<W: Write>(
    writer: &mut W,
    engine: &Engine,
    users: &[String],
    force: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let users = if users.is_empty() {
        engine.users()?
    } else {
        users
            .iter()
            .map(|id| load_user(engine, id))
            .collect::<Result<Vec<_>>>()?
    };
    for user in users {
        let stored = engine.durations().regenerate(&user, force, now)?;
        writeln!(writer, "{}: {stored} durations", user.id)?;
    }
    Ok(())
}
