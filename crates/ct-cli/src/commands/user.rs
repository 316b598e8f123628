//! User management commands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Utc, Weekday};

use ct_core::User;
use ct_core::day::parse_tz;
use ct_engine::Engine;

use super::util::{load_user, user_id, write_json};
use crate::cli::UserPrefs;

/// Zone of the machine running the command, or UTC when unknown.
fn system_time_zone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "could not detect time zone, using UTC");
        "UTC".to_string()
    })
}

fn apply(user: &mut User, prefs: &UserPrefs) -> Result<()> {
    if let Some(tz) = &prefs.tz {
        user.time_zone = parse_tz(tz)?;
    }
    if let Some(week_start) = &prefs.week_start {
        user.start_of_week = week_start
            .parse::<Weekday>()
            .map_err(|_| anyhow::anyhow!("invalid week start: {week_start}"))?;
    }
    if let Some(timeout) = prefs.timeout {
        user.heartbeats_timeout_secs = timeout;
    }
    if let Some(public) = prefs.public {
        user.public_leaderboard = public;
    }
    if let Some(share) = prefs.share_badges {
        user.share_badges = share;
    }
    if let Some(exclude) = prefs.exclude_from_retention {
        user.exclude_from_retention = exclude;
    }
    Ok(())
}

pub fn add<W: Write>(writer: &mut W, engine: &Engine, id: &str, prefs: &UserPrefs) -> Result<()> {
    let mut user = User::new(user_id(id)?, Utc::now());
    if prefs.tz.is_none() {
        user.time_zone = parse_tz(&system_time_zone()).unwrap_or(chrono_tz::Tz::UTC);
    }
    apply(&mut user, prefs)?;
    engine
        .create_user(&user)
        .with_context(|| format!("failed to create user {id}"))?;
    writeln!(writer, "Created user {} ({})", user.id, user.time_zone)?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, engine: &Engine, json: bool) -> Result<()> {
    let users = engine.users()?;
    if json {
        return write_json(writer, &users);
    }
    if users.is_empty() {
        writeln!(writer, "No users.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{:<20}  {:<24}  {:<5}  {:>7}  {:<6}",
        "ID", "Time zone", "Week", "Timeout", "Public"
    )?;
    for user in users {
        writeln!(
            writer,
            "{:<20}  {:<24}  {:<5}  {:>6}s  {:<6}",
            user.id.as_str(),
            user.time_zone.name(),
            user.start_of_week.to_string(),
            user.heartbeats_timeout().num_seconds(),
            if user.public_leaderboard { "yes" } else { "no" },
        )?;
    }
    Ok(())
}

pub fn update<W: Write>(
    writer: &mut W,
    engine: &Engine,
    id: &str,
    prefs: &UserPrefs,
) -> Result<()> {
    let mut user = load_user(engine, id)?;
    apply(&mut user, prefs)?;
    engine.update_user(&user)?;
    // Without a running server nobody listens for the update event.
    engine.leaderboard().sync_user(&user, Utc::now())?;
    writeln!(writer, "Updated user {}", user.id)?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, engine: &Engine, id: &str) -> Result<()> {
    engine.delete_user(&user_id(id)?)?;
    writeln!(writer, "Deleted user {id}")?;
    Ok(())
}
