//! Cron schedules for background jobs.
//!
//! Expressions use six fields with seconds (`sec min hour dom month dow`).
//! Two legacy shorthands are still accepted and rewritten on load:
//! `HH:MM` (daily) and `weekday,HH:MM` (weekly).
//!
//! Fire times are evaluated in the server's local time zone.

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ct_core::ValidationError;

/// Rewrites legacy shorthands to cron. Cron input is returned unchanged.
pub fn normalize(expression: &str) -> Result<Cow<'_, str>, ValidationError> {
    let expression = expression.trim();
    let invalid = |message: &str| ValidationError::InvalidSchedule {
        value: expression.to_string(),
        message: message.to_string(),
    };

    if let Some((hour, minute)) = split_clock(expression) {
        let (hour, minute) =
            clock(hour, minute).ok_or_else(|| invalid("time of day out of range"))?;
        return Ok(Cow::Owned(format!("0 {minute} {hour} * * *")));
    }
    if let Some((day, time)) = expression.split_once(',') {
        let day = day.trim();
        let is_word = !day.is_empty() && day.bytes().all(|b| b.is_ascii_alphabetic());
        if is_word {
            if let Some((hour, minute)) = split_clock(time.trim()) {
                let weekday = weekday(day).ok_or_else(|| invalid("unknown weekday"))?;
                let (hour, minute) =
                    clock(hour, minute).ok_or_else(|| invalid("time of day out of range"))?;
                return Ok(Cow::Owned(format!("0 {minute} {hour} * * {weekday}")));
            }
        }
    }
    Ok(Cow::Borrowed(expression))
}

/// Parses a cron expression or legacy shorthand.
pub fn parse(expression: &str) -> Result<Schedule, ValidationError> {
    let normalized = normalize(expression)?;
    Schedule::from_str(&normalized).map_err(|err| ValidationError::InvalidSchedule {
        value: expression.trim().to_string(),
        message: err.to_string(),
    })
}

/// Parses a semicolon-separated list of schedules.
pub fn parse_list(expressions: &str) -> Result<Vec<Schedule>, ValidationError> {
    expressions
        .split(';')
        .map(str::trim)
        .filter(|expression| !expression.is_empty())
        .map(parse)
        .collect()
}

/// Splits `H:MM` or `HH:MM` into its digit groups.
fn split_clock(value: &str) -> Option<(&str, &str)> {
    let (hour, minute) = value.split_once(':')?;
    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let shaped = (1..=2).contains(&hour.len()) && minute.len() == 2;
    (shaped && digits(hour) && digits(minute)).then_some((hour, minute))
}

fn clock(hour: &str, minute: &str) -> Option<(u32, u32)> {
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

fn weekday(name: &str) -> Option<&'static str> {
    let name = name.to_ascii_lowercase();
    let abbreviation = match name.get(..3)? {
        "mon" => "Mon",
        "tue" => "Tue",
        "wed" => "Wed",
        "thu" => "Thu",
        "fri" => "Fri",
        "sat" => "Sat",
        "sun" => "Sun",
        _ => return None,
    };
    Some(abbreviation)
}

/// Runs `job` at every upcoming fire time of `schedule` until cancelled.
///
/// The job should be cheap; heavy work belongs on a job queue.
pub fn spawn(
    name: &'static str,
    schedule: Schedule,
    cancel: CancellationToken,
    job: impl Fn() + Send + Sync + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some((next, wait)) = next_fire(&schedule, Local::now()) else {
                tracing::warn!(job = name, "schedule has no upcoming fire time");
                return;
            };
            tracing::debug!(job = name, next = %next, "scheduled");
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(wait) => {
                    tracing::info!(job = name, "running scheduled job");
                    job();
                }
            }
        }
    })
}

/// The first fire time after `now` and how long to sleep until it.
fn next_fire(schedule: &Schedule, now: DateTime<Local>) -> Option<(DateTime<Local>, StdDuration)> {
    let next = schedule.after(&now).next()?;
    Some((next, (next - now).to_std().unwrap_or_default()))
}
