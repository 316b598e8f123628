//! Symbolic time ranges and client date parsing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::day;
use crate::types::ValidationError;

/// Named ranges understood by every read endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Today,
    Yesterday,
    PastDay,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    Past7Days,
    Past7DaysYesterday,
    Past14Days,
    Past30Days,
    Past6Months,
    Past12Months,
    Any,
}

impl Interval {
    pub const ALL: [Self; 15] = [
        Self::Today,
        Self::Yesterday,
        Self::PastDay,
        Self::ThisWeek,
        Self::LastWeek,
        Self::ThisMonth,
        Self::LastMonth,
        Self::ThisYear,
        Self::Past7Days,
        Self::Past7DaysYesterday,
        Self::Past14Days,
        Self::Past30Days,
        Self::Past6Months,
        Self::Past12Months,
        Self::Any,
    ];

    /// Canonical identifier, also stored with leaderboard rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
            Self::PastDay => "last_24_hours",
            Self::ThisWeek => "week",
            Self::LastWeek => "last_week",
            Self::ThisMonth => "month",
            Self::LastMonth => "last_month",
            Self::ThisYear => "year",
            Self::Past7Days => "last_7_days",
            Self::Past7DaysYesterday => "last_7_days_yesterday",
            Self::Past14Days => "last_14_days",
            Self::Past30Days => "last_30_days",
            Self::Past6Months => "last_6_months",
            Self::Past12Months => "last_12_months",
            Self::Any => "all_time",
        }
    }

    /// Every accepted spelling, including the human-readable labels that
    /// third-party clients send.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Today => &["today", "Today"],
            Self::Yesterday => &["yesterday", "day", "Yesterday"],
            Self::PastDay => &["last_24_hours", "24_hours", "Last 24 Hours"],
            Self::ThisWeek => &["week", "this_week", "This Week"],
            Self::LastWeek => &["last_week", "Last Week"],
            Self::ThisMonth => &["month", "this_month", "This Month"],
            Self::LastMonth => &["last_month", "Last Month"],
            Self::ThisYear => &["year", "this_year", "This Year"],
            Self::Past7Days => &["7_days", "last_7_days", "Last 7 Days"],
            Self::Past7DaysYesterday => &["last_7_days_yesterday", "Last 7 Days from Yesterday"],
            Self::Past14Days => &["14_days", "last_14_days", "Last 14 Days"],
            Self::Past30Days => &["30_days", "last_30_days", "Last 30 Days"],
            Self::Past6Months => &["6_months", "last_6_months", "Last 6 Months"],
            Self::Past12Months => &["12_months", "last_12_months", "last_year", "Last 12 Months"],
            Self::Any => &["any", "all_time", "All Time"],
        }
    }

    /// Resolves to `[from, to)` as instants, computing calendar boundaries in
    /// the user's zone.
    pub fn resolve(
        self,
        now: DateTime<Utc>,
        tz: Tz,
        week_start: Weekday,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = day::begin_of_today(now, tz);
        match self {
            Self::Today => (today, now),
            Self::Yesterday => (day::add_days(today, tz, -1), today),
            Self::PastDay => (now - TimeDelta::hours(24), now),
            Self::ThisWeek => (day::begin_of_week(now, tz, week_start), now),
            Self::LastWeek => {
                let this_week = day::begin_of_week(now, tz, week_start);
                (day::add_days(this_week, tz, -7), this_week)
            }
            Self::ThisMonth => (day::begin_of_month(now, tz), now),
            Self::LastMonth => {
                let this_month = day::begin_of_month(now, tz);
                (day::add_months(this_month, tz, -1), this_month)
            }
            Self::ThisYear => (day::begin_of_year(now, tz), now),
            Self::Past7Days => (day::add_days(now, tz, -7), now),
            Self::Past7DaysYesterday => {
                let yesterday = day::add_days(today, tz, -1);
                (day::add_days(yesterday, tz, -7), yesterday)
            }
            Self::Past14Days => (day::add_days(now, tz, -14), now),
            Self::Past30Days => (day::add_days(now, tz, -30), now),
            Self::Past6Months => (day::add_months(now, tz, -6), now),
            Self::Past12Months => (day::add_months(now, tz, -12), now),
            Self::Any => (DateTime::<Utc>::UNIX_EPOCH, now),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.aliases().contains(&s))
            .ok_or_else(|| ValidationError::UnknownInterval {
                value: s.to_string(),
            })
    }
}

impl Serialize for Interval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a client date. RFC 3339 values keep their own offset; bare
/// `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS` values are local to `tz`.
pub fn parse_date_time(
    field: &'static str,
    value: &str,
    tz: Tz,
) -> Result<DateTime<Utc>, ValidationError> {
    let value = value.trim();
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(day::local_midnight(date, tz));
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        dt
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        dt
    } else {
        return Err(invalid());
    };

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}
