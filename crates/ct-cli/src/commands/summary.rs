//! Summary command for showing coding time per dimension.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ct_core::compat::SummariesView;
use ct_core::{EntityType, Filters, Summary, User, day};
use ct_engine::{Engine, SummaryOptions, SummaryRequest};

use super::util::{format_duration, load_user, resolve_range, write_json};
use crate::cli::SummaryArgs;

/// Rows shown per dimension in the text output.
const TOP_ITEMS: usize = 10;

fn filters(args: &SummaryArgs) -> Filters {
    let mut filters = Filters::new();
    for (entity_type, values) in [
        (EntityType::Project, &args.project),
        (EntityType::Language, &args.language),
        (EntityType::Editor, &args.editor),
        (EntityType::OperatingSystem, &args.operating_system),
        (EntityType::Machine, &args.machine),
        (EntityType::Label, &args.label),
        (EntityType::Branch, &args.branch),
        (EntityType::Entity, &args.entity),
        (EntityType::Category, &args.category),
    ] {
        for value in values {
            filters.insert(entity_type, value);
        }
    }
    filters
}

pub fn run<W: Write>(
    writer: &mut W,
    engine: &Engine,
    args: &SummaryArgs,
    now: DateTime<Utc>,
) -> Result<()> {
    let user = load_user(engine, &args.user)?;
    let (from, to) = resolve_range(
        &user,
        args.interval.as_deref(),
        args.from.as_deref(),
        args.to.as_deref(),
        now,
    )?;
    let filters = filters(args);

    if args.compat {
        let days = per_day(engine, &user, from, to, &filters, args.recompute)?;
        return write_json(writer, &SummariesView::new(&days, user.time_zone, now));
    }

    let request = SummaryRequest::new(user.clone(), from, to)
        .with_filters(filters)
        .recompute(args.recompute);
    let summary = engine
        .summaries()
        .generate(&request, SummaryOptions::default(), &CancellationToken::new())?;

    if args.json {
        return write_json(writer, &summary);
    }
    write_text(writer, &user, &summary)
}

/// One summary per local day. Days before the user's first heartbeat are
/// skipped so that open-ended ranges stay short.
fn per_day(
    engine: &Engine,
    user: &User,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    filters: &Filters,
    recompute: bool,
) -> Result<Vec<Summary>> {
    let first = engine
        .db()
        .heartbeat_bounds(std::slice::from_ref(&user.id))?
        .first()
        .map(|bounds| day::begin_of_day(bounds.first, user.time_zone));
    let from = first.map_or(from, |first| from.max(first));

    let cancel = CancellationToken::new();
    let mut days = Vec::new();
    for (day_from, day_to) in day::split_by_days(from, to, user.time_zone) {
        let request = SummaryRequest::new(user.clone(), day_from, day_to)
            .with_filters(filters.clone())
            .recompute(recompute);
        days.push(
            engine
                .summaries()
                .generate(&request, SummaryOptions::default(), &cancel)?,
        );
    }
    Ok(days)
}

fn write_text<W: Write>(writer: &mut W, user: &User, summary: &Summary) -> Result<()> {
    let tz = user.time_zone;
    writeln!(
        writer,
        "{}: {} to {}",
        user.id,
        summary.from.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        summary.to.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
    )?;
    writeln!(writer, "Total: {}", format_duration(summary.total_ms()))?;

    if summary.is_empty() {
        writeln!(writer, "No activity.")?;
        return Ok(());
    }

    for entity_type in EntityType::ALL {
        let items = summary.items(entity_type);
        if items.is_empty() {
            continue;
        }
        writeln!(writer)?;
        writeln!(writer, "{}:", heading(entity_type))?;
        for item in items.iter().take(TOP_ITEMS) {
            writeln!(writer, "  {:<32} {:>10}", item.key, format_duration(item.total_ms))?;
        }
        if items.len() > TOP_ITEMS {
            writeln!(writer, "  ... {} more", items.len() - TOP_ITEMS)?;
        }
    }
    Ok(())
}

const fn heading(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Project => "Projects",
        EntityType::Language => "Languages",
        EntityType::Editor => "Editors",
        EntityType::OperatingSystem => "Operating systems",
        EntityType::Machine => "Machines",
        EntityType::Label => "Labels",
        EntityType::Branch => "Branches",
        EntityType::Entity => "Files",
        EntityType::Category => "Categories",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use clap::Parser;
    use ct_core::{Heartbeat, UserId};
    use ct_db::Database;
    use ct_engine::EngineConfig;
    use insta::assert_snapshot;

    use super::*;
    use crate::{Cli, Commands};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn args(extra: &[&str]) -> SummaryArgs {
        let mut argv = vec!["ct", "summary", "--user", "alice"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Some(Commands::Summary(args)) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    /// Alice codes an hour on `ct` and half an hour on `blog`.
    fn engine() -> Engine {
        let engine = Engine::new(Database::open_in_memory().unwrap(), EngineConfig::default());
        let alice = User::new(UserId::new("alice").unwrap(), utc("2024-01-01T00:00:00Z"));
        engine.create_user(&alice).unwrap();

        let mut heartbeats = Vec::new();
        let sessions = [("2024-01-15T09:00:00Z", 60, "ct"), ("2024-01-15T14:00:00Z", 30, "blog")];
        for (start, minutes, project) in sessions {
            let start = utc(start);
            for step in 0..=minutes * 2 {
                let mut heartbeat = Heartbeat::new(
                    alice.id.clone(),
                    start + TimeDelta::seconds(step * 30),
                    format!("{project}/main.rs"),
                );
                heartbeat.project = project.to_string();
                heartbeat.language = "Rust".to_string();
                heartbeat.rehash();
                heartbeats.push(heartbeat);
            }
        }
        engine.db().insert_heartbeats(&heartbeats).unwrap();
        engine
    }

    fn output(engine: &Engine, extra: &[&str]) -> String {
        let mut output = Vec::new();
        run(&mut output, engine, &args(extra), utc("2024-01-16T12:00:00Z")).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn text_lists_projects_by_time() {
        let output = output(&engine(), &["--from", "2024-01-15", "--to", "2024-01-16"]);
        assert_snapshot!(output);
    }

    #[test]
    fn filters_restrict_the_total() {
        let json = output(
            &engine(),
            &["--from", "2024-01-15", "--to", "2024-01-16", "--project", "blog", "--json"],
        );
        let summary: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary.total_ms(), 30 * 60_000);
    }

    #[test]
    fn compat_document_has_one_entry_per_day() {
        // The 14th precedes the first heartbeat and is skipped.
        let json = output(&engine(), &["--from", "2024-01-14", "--to", "2024-01-16", "--compat"]);
        assert_snapshot!(json);
    }
}
