//! Leaderboard commands.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};

use ct_core::{EntityType, Interval};
use ct_engine::{Engine, LeaderboardQuery};

use super::util::{format_duration, user_id, write_json};

pub fn generate<W: Write>(writer: &mut W, engine: &Engine, now: DateTime<Utc>) -> Result<()> {
    let leaderboard = engine.leaderboard();
    if !leaderboard.enabled() {
        bail!("leaderboard is disabled in the configuration");
    }
    let listed = leaderboard.generate(now)?;
    writeln!(writer, "Leaderboard for {} lists {listed} users", leaderboard.scope())?;
    Ok(())
}

/// Options of `ct leaderboard show`.
#[derive(Debug, Clone, Default)]
pub struct ShowOptions<'a> {
    pub interval: Option<&'a str>,
    pub by: Option<&'a str>,
    pub key: Option<&'a str>,
    pub page: usize,
    pub page_size: usize,
    pub user: Option<&'a str>,
    pub json: bool,
}

pub fn show<W: Write>(writer: &mut W, engine: &Engine, options: &ShowOptions<'_>) -> Result<()> {
    let interval = match options.interval {
        Some(interval) => interval.parse::<Interval>()?,
        None => engine.leaderboard().scope(),
    };
    let by = options.by.map(str::parse::<EntityType>).transpose()?;
    let requester = options.user.map(user_id).transpose()?;
    let query = LeaderboardQuery {
        interval,
        by,
        key: options.key.map(str::to_string),
        page: options.page.max(1),
        page_size: options.page_size.max(1),
        requester,
    };
    let rows = engine.leaderboard().read(&query)?;

    if options.json {
        return write_json(writer, &rows);
    }
    if rows.is_empty() {
        writeln!(writer, "No entries for {interval}.")?;
        return Ok(());
    }
    for row in rows {
        let key = row.key.as_deref().map(|key| format!("  [{key}]")).unwrap_or_default();
        writeln!(
            writer,
            "{:>4}. {:<24} {:>10}{key}",
            row.rank,
            row.user_id.as_str(),
            format_duration(row.total_ms)
        )?;
    }
    Ok(())
}
