//! Local-day arithmetic in a user's IANA time zone.
//!
//! Every value passed in or out is an absolute instant (`DateTime<Utc>`). Days,
//! weeks, months and years are computed in the given zone and converted back,
//! so callers never compare instants that were reinterpreted in another zone.

use chrono::{
    DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

use crate::types::ValidationError;

/// Parses an IANA zone name such as `Europe/Berlin`.
pub fn parse_tz(name: &str) -> Result<Tz, ValidationError> {
    name.parse::<Tz>()
        .map_err(|_| ValidationError::UnknownTimeZone {
            value: name.to_string(),
        })
}

/// Converts a local date at midnight to an instant.
/// Ambiguous midnights resolve to the earlier instant; a midnight skipped by a
/// DST transition resolves to the first valid hour after it.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut hour = 0;
    loop {
        let naive = date.and_time(NaiveTime::MIN) + chrono::TimeDelta::hours(hour);
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                return dt.with_timezone(&Utc);
            }
            LocalResult::None if hour < 3 => hour += 1,
            LocalResult::None => return naive.and_utc(),
        }
    }
}

/// The local calendar date an instant falls on.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Start of the local day containing `instant`.
pub fn begin_of_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    local_midnight(local_date(instant, tz), tz)
}

/// Start of the local day following the one containing `instant`.
pub fn begin_of_next_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let date = local_date(instant, tz);
    date.checked_add_days(Days::new(1))
        .map_or(instant, |next| local_midnight(next, tz))
}

/// Snaps `instant` up to a local day boundary. Already aligned instants are kept.
pub fn ceil_to_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    if is_day_aligned(instant, tz) {
        instant
    } else {
        begin_of_next_day(instant, tz)
    }
}

/// Whether `instant` is exactly a local midnight.
pub fn is_day_aligned(instant: DateTime<Utc>, tz: Tz) -> bool {
    begin_of_day(instant, tz) == instant
}

/// Start of today in the given zone.
pub fn begin_of_today(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    begin_of_day(now, tz)
}

/// Start of the week containing `now`, where weeks begin on `week_start`.
pub fn begin_of_week(now: DateTime<Utc>, tz: Tz, week_start: Weekday) -> DateTime<Utc> {
    let today = local_date(now, tz);
    let offset =
        (7 + today.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    let start = today
        .checked_sub_days(Days::new(u64::from(offset)))
        .unwrap_or(today);
    local_midnight(start, tz)
}

/// Start of the month containing `now`.
pub fn begin_of_month(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let today = local_date(now, tz);
    let first = today.with_day(1).unwrap_or(today);
    local_midnight(first, tz)
}

/// Start of the year containing `now`.
pub fn begin_of_year(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let today = local_date(now, tz);
    let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
    local_midnight(first, tz)
}

/// Shifts an instant by whole local days, keeping the wall-clock time.
pub fn add_days(instant: DateTime<Utc>, tz: Tz, days: i64) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz).naive_local();
    let shifted = if days >= 0 {
        local.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        local.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map_or(instant, |dt| dt.with_timezone(&Utc))
}

/// Shifts an instant by whole local months, clamping the day of month.
pub fn add_months(instant: DateTime<Utc>, tz: Tz, months: i32) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz).naive_local();
    let shifted = if months >= 0 {
        local.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        local.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map_or(instant, |dt| dt.with_timezone(&Utc))
}

/// Splits `[from, to)` on local day boundaries.
///
/// The first and last pieces may be partial days. An empty range yields nothing.
pub fn split_by_days(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    tz: Tz,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut ranges = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let next = begin_of_next_day(cursor, tz).min(to);
        if next <= cursor {
            break;
        }
        ranges.push((cursor, next));
        cursor = next;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn begin_of_day_respects_zone() {
        let tz = parse_tz("Europe/Berlin").unwrap();
        // 23:30 UTC on Jan 15 is already Jan 16 in Berlin.
        let start = begin_of_day(utc("2024-01-15T23:30:00Z"), tz);
        assert_eq!(start, utc("2024-01-15T23:00:00Z"));
    }

    #[test]
    fn ceil_keeps_aligned_instants() {
        let tz = Tz::UTC;
        let midnight = utc("2024-01-16T00:00:00Z");
        assert_eq!(ceil_to_day(midnight, tz), midnight);
        assert_eq!(ceil_to_day(utc("2024-01-15T12:00:00Z"), tz), midnight);
    }

    #[test]
    fn split_by_days_produces_partial_edges() {
        let tz = Tz::UTC;
        let ranges = split_by_days(utc("2024-01-15T12:00:00Z"), utc("2024-01-17T06:00:00Z"), tz);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], (utc("2024-01-15T12:00:00Z"), utc("2024-01-16T00:00:00Z")));
        assert_eq!(ranges[2], (utc("2024-01-17T00:00:00Z"), utc("2024-01-17T06:00:00Z")));
    }

    #[test]
    fn split_by_days_handles_dst_day() {
        let tz = parse_tz("Europe/Berlin").unwrap();
        // 2024-03-31 is 23 hours long in Berlin.
        let from = local_midnight(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), tz);
        let to = local_midnight(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), tz);
        let ranges = split_by_days(from, to, tz);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].1 - ranges[0].0).num_hours(), 23);
    }

    #[test]
    fn begin_of_week_is_computed_in_user_zone() {
        let tz = parse_tz("America/Los_Angeles").unwrap();
        // Monday 2024-01-15 03:00 UTC is still Sunday evening in Los Angeles.
        let now = utc("2024-01-15T03:00:00Z");
        let start = begin_of_week(now, tz, Weekday::Mon);
        assert_eq!(start, utc("2024-01-08T08:00:00Z"));
        let sunday_start = begin_of_week(now, tz, Weekday::Sun);
        assert_eq!(sunday_start, utc("2024-01-14T08:00:00Z"));
    }

    #[test]
    fn month_and_year_starts() {
        let tz = Tz::UTC;
        let now = utc("2024-05-17T10:00:00Z");
        assert_eq!(begin_of_month(now, tz), utc("2024-05-01T00:00:00Z"));
        assert_eq!(begin_of_year(now, tz), utc("2024-01-01T00:00:00Z"));
        assert_eq!(add_months(now, tz, -6), utc("2023-11-17T10:00:00Z"));
        assert_eq!(add_days(now, tz, -7), utc("2024-05-10T10:00:00Z"));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        assert!(parse_tz("Mars/Olympus").is_err());
    }
}
