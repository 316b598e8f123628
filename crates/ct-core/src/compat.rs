//! View models compatible with the commercial v1 summaries API and the
//! shields.io endpoint badge.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::day;
use crate::entity::{EntityType, UNKNOWN_KEY};
use crate::summary::{Summary, SummaryItem};

/// User agents that may fetch badges outside of dev mode start with this.
pub const SHIELDS_USER_AGENT_PREFIX: &str = "Shields.io/";

const BADGE_LABEL: &str = "coding time";
const BADGE_COLOR: &str = "blue";

/// Formats whole seconds as `1 hr 5 mins`, rounded to the minute.
pub fn format_text(total_secs: i64) -> String {
    let minutes = (total_secs.max(0) + 30) / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let unit = |n: i64, singular: &str, plural: &str| {
        format!("{n} {}", if n == 1 { singular } else { plural })
    };
    if hours == 0 {
        return unit(minutes, "min", "mins");
    }
    format!("{} {}", unit(hours, "hr", "hrs"), unit(minutes, "min", "mins"))
}

/// `H:MM:SS` for item entries.
pub fn format_digital(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    format!(
        "{}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// `H:MM` for totals.
pub fn format_digital_short(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    format!("{}:{:02}", total_secs / 3600, (total_secs % 3600) / 60)
}

#[allow(clippy::cast_precision_loss)]
fn percent(part_secs: i64, whole_secs: i64) -> f64 {
    if whole_secs <= 0 {
        return 0.0;
    }
    ((part_secs as f64 / whole_secs as f64) * 10_000.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummariesEntry {
    pub name: String,
    pub digital: String,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub percent: f64,
    pub text: String,
    pub total_seconds: i64,
}

impl SummariesEntry {
    fn new(item: &SummaryItem, dimension_secs: i64) -> Self {
        let total = item.total_secs();
        Self {
            name: item.key.clone(),
            digital: format_digital(total),
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
            percent: percent(total, dimension_secs),
            text: format_text(total),
            total_seconds: total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrandTotal {
    pub digital: String,
    pub hours: i64,
    pub minutes: i64,
    pub text: String,
    pub total_seconds: i64,
}

impl GrandTotal {
    fn new(total_secs: i64) -> Self {
        Self {
            digital: format_digital_short(total_secs),
            hours: total_secs / 3600,
            minutes: (total_secs % 3600) / 60,
            text: format_text(total_secs),
            total_seconds: total_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayRange {
    pub date: String,
    pub start: String,
    pub end: String,
    pub timezone: String,
}

/// Totals of one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummariesData {
    pub projects: Vec<SummariesEntry>,
    pub languages: Vec<SummariesEntry>,
    pub editors: Vec<SummariesEntry>,
    pub operating_systems: Vec<SummariesEntry>,
    pub machines: Vec<SummariesEntry>,
    pub categories: Vec<SummariesEntry>,
    pub dependencies: Vec<SummariesEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<SummariesEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<SummariesEntry>>,
    pub grand_total: GrandTotal,
    pub range: DayRange,
}

impl SummariesData {
    fn new(summary: &Summary, tz: Tz) -> Self {
        let entries = |entity_type: EntityType| -> Vec<SummariesEntry> {
            let items = summary.items(entity_type);
            let dimension_secs: i64 = items.iter().map(SummaryItem::total_secs).sum();
            items
                .iter()
                .map(|item| SummariesEntry::new(item, dimension_secs))
                .collect()
        };
        let optional = |entity_type: EntityType| {
            let entries = entries(entity_type);
            let only_unknown = entries.iter().all(|entry| entry.name == UNKNOWN_KEY);
            (!only_unknown).then_some(entries)
        };

        Self {
            projects: entries(EntityType::Project),
            languages: entries(EntityType::Language),
            editors: entries(EntityType::Editor),
            operating_systems: entries(EntityType::OperatingSystem),
            machines: entries(EntityType::Machine),
            categories: entries(EntityType::Category),
            dependencies: Vec::new(),
            branches: optional(EntityType::Branch),
            entities: optional(EntityType::Entity),
            grand_total: GrandTotal::new(summary_secs(summary)),
            range: DayRange {
                date: day::local_date(summary.from, tz).to_string(),
                start: rfc3339(summary.from),
                end: rfc3339(summary.to),
                timezone: tz.name().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeTotal {
    pub seconds: i64,
    pub text: String,
    pub digital: String,
    pub decimal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyAverage {
    pub holidays: i64,
    pub days_including_holidays: i64,
    pub days_minus_holidays: i64,
    /// Average excluding time in unknown languages.
    pub seconds: i64,
    pub text: String,
    pub seconds_including_other_language: i64,
    pub text_including_other_language: String,
}

/// Response body of the v1 summaries endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummariesView {
    pub data: Vec<SummariesData>,
    pub start: String,
    pub end: String,
    pub cumulative_total: CumulativeTotal,
    pub daily_average: DailyAverage,
}

impl SummariesView {
    /// Builds the view from per-day summaries in chronological order.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(days: &[Summary], tz: Tz, now: DateTime<Utc>) -> Self {
        let start = days.iter().map(|s| s.from).min().unwrap_or(now);
        let end = days.iter().map(|s| s.to).max().unwrap_or(now);

        let total: i64 = days.iter().map(summary_secs).sum();
        let known: i64 = days
            .iter()
            .map(|s| {
                summary_secs(s) - (s.total_by_key(EntityType::Language, UNKNOWN_KEY) + 500) / 1000
            })
            .sum();
        let num_days = i64::try_from(day::split_by_days(start, end, tz).len())
            .unwrap_or(1)
            .max(1);

        Self {
            data: days.iter().map(|s| SummariesData::new(s, tz)).collect(),
            start: rfc3339(start),
            end: rfc3339(end),
            cumulative_total: CumulativeTotal {
                seconds: total,
                text: format_text(total),
                digital: format_digital_short(total),
                decimal: format!("{:.2}", total as f64 / 3600.0),
            },
            daily_average: DailyAverage {
                holidays: 0,
                days_including_holidays: num_days,
                days_minus_holidays: num_days,
                seconds: known / num_days,
                text: format_text(known / num_days),
                seconds_including_other_language: total / num_days,
                text_including_other_language: format_text(total / num_days),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllTimeRange {
    pub start: String,
    pub start_date: String,
    pub end: String,
    pub end_date: String,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllTimeData {
    pub total_seconds: i64,
    pub text: String,
    pub is_up_to_date: bool,
    pub range: AllTimeRange,
}

/// Response body of the all-time-since-today endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllTimeView {
    pub data: AllTimeData,
}

impl AllTimeView {
    pub fn new(summary: &Summary, tz: Tz) -> Self {
        let total = summary_secs(summary);
        let date = |instant: DateTime<Utc>| {
            instant
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        };
        Self {
            data: AllTimeData {
                total_seconds: total,
                text: format_text(total),
                is_up_to_date: true,
                range: AllTimeRange {
                    start: rfc3339(summary.from),
                    start_date: date(summary.from),
                    end: rfc3339(summary.to),
                    end_date: date(summary.to),
                    timezone: tz.name().to_string(),
                },
            },
        }
    }
}

/// Shields.io endpoint badge payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub schema_version: u8,
    pub label: String,
    pub message: String,
    pub color: String,
}

impl Badge {
    pub fn new(summary: &Summary) -> Self {
        Self {
            schema_version: 1,
            label: BADGE_LABEL.to_string(),
            message: format_text(summary_secs(summary)),
            color: BADGE_COLOR.to_string(),
        }
    }
}

/// Whether a badge request with this `User-Agent` may be served.
pub fn badge_request_allowed(user_agent: Option<&str>, dev_mode: bool) -> bool {
    dev_mode || user_agent.is_some_and(|ua| ua.starts_with(SHIELDS_USER_AGENT_PREFIX))
}

fn summary_secs(summary: &Summary) -> i64 {
    (summary.total_ms() + 500) / 1000
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day_summary(from: &str, to: &str, items: &[(EntityType, &str, i64)]) -> Summary {
        let mut summary = Summary::new(UserId::new("alice").unwrap(), utc(from), utc(to));
        for (entity_type, key, secs) in items {
            summary.push_item(SummaryItem::new(*entity_type, *key, secs * 1000));
        }
        summary.finalize();
        summary
    }

    #[test]
    fn text_uses_singular_and_plural_units() {
        assert_eq!(format_text(3900), "1 hr 5 mins");
        assert_eq!(format_text(7260), "2 hrs 1 min");
        assert_eq!(format_text(0), "0 mins");
        assert_eq!(format_text(89), "1 min");
    }

    #[test]
    fn digital_formats() {
        assert_eq!(format_digital(3723), "1:02:03");
        assert_eq!(format_digital_short(3723), "1:02");
        assert_eq!(format_digital_short(36_000), "10:00");
    }

    #[test]
    fn entries_carry_percent_with_two_decimals() {
        let summary = day_summary(
            "2024-01-15T00:00:00Z",
            "2024-01-16T00:00:00Z",
            &[
                (EntityType::Project, "a", 200),
                (EntityType::Project, "b", 100),
                (EntityType::Language, "Rust", 300),
            ],
        );
        let view = SummariesView::new(&[summary], Tz::UTC, utc("2024-01-16T00:00:00Z"));
        let data = &view.data[0];
        assert_eq!(data.projects[0].percent, 66.67);
        assert_eq!(data.projects[1].percent, 33.33);
        assert_eq!(data.grand_total.total_seconds, 300);
        assert_eq!(data.range.date, "2024-01-15");
        assert!(data.branches.is_none());
    }

    #[test]
    fn daily_average_excludes_unknown_language() {
        let days = [
            day_summary(
                "2024-01-15T00:00:00Z",
                "2024-01-16T00:00:00Z",
                &[(EntityType::Language, "Go", 3600), (EntityType::Language, UNKNOWN_KEY, 3600)],
            ),
            day_summary("2024-01-16T00:00:00Z", "2024-01-17T00:00:00Z", &[]),
        ];
        let view = SummariesView::new(&days, Tz::UTC, utc("2024-01-17T00:00:00Z"));
        assert_eq!(view.cumulative_total.seconds, 7200);
        assert_eq!(view.cumulative_total.decimal, "2.00");
        assert_eq!(view.daily_average.days_including_holidays, 2);
        assert_eq!(view.daily_average.seconds, 1800);
        assert_eq!(view.daily_average.seconds_including_other_language, 3600);
    }

    #[test]
    fn badge_payload_and_gate() {
        let summary = day_summary(
            "2024-01-15T00:00:00Z",
            "2024-01-16T00:00:00Z",
            &[(EntityType::Project, "a", 3900)],
        );
        let json = serde_json::to_value(Badge::new(&summary)).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["message"], "1 hr 5 mins");

        assert!(badge_request_allowed(Some("Shields.io/2003a"), false));
        assert!(!badge_request_allowed(Some("curl/8.0"), false));
        assert!(!badge_request_allowed(None, false));
        assert!(badge_request_allowed(None, true));
    }
}
