//! Wire payloads from editor plugins and their normalization into heartbeats.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::heartbeat::{Heartbeat, HeartbeatType, truncate_to_millis};
use crate::language_mapping::{LanguageRules, canonical_name};
use crate::types::{UserId, ValidationError};
use crate::user_agent::parse_user_agent;

/// Heartbeats may not be more than this far in the future.
const MAX_FUTURE_SKEW: TimeDelta = TimeDelta::days(1);

/// The `time` field as sent by clients: float or integer seconds, or a date
/// string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PayloadTime {
    Seconds(f64),
    Text(String),
}

impl PayloadTime {
    /// Normalizes to a millisecond-precision instant.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_instant(&self) -> Result<DateTime<Utc>, ValidationError> {
        let invalid = |value: String| ValidationError::InvalidDate { field: "time", value };
        match self {
            Self::Seconds(secs) => {
                if !secs.is_finite() {
                    return Err(invalid(secs.to_string()));
                }
                DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
                    .ok_or_else(|| invalid(secs.to_string()))
            }
            Self::Text(text) => {
                if let Ok(secs) = text.trim().parse::<f64>() {
                    return Self::Seconds(secs).to_instant();
                }
                DateTime::parse_from_rfc3339(text.trim())
                    .map(|parsed| truncate_to_millis(parsed.with_timezone(&Utc)))
                    .map_err(|_| invalid(text.clone()))
            }
        }
    }
}

/// One heartbeat as posted by a plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub entity: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub dependencies: Option<serde_json::Value>,
    #[serde(default)]
    pub lineno: Option<i64>,
    #[serde(default)]
    pub cursorpos: Option<i64>,
    #[serde(default)]
    pub is_write: Option<bool>,
    pub time: PayloadTime,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default, alias = "machine")]
    pub machine_name: Option<String>,
}

/// Request-level values that apply to every heartbeat in a batch.
#[derive(Debug, Clone)]
pub struct IngestContext<'a> {
    pub user_id: &'a UserId,
    pub now: DateTime<Utc>,
    /// Value of the request's `User-Agent` header.
    pub user_agent: Option<&'a str>,
    /// Value of the request's `X-Machine-Name` header.
    pub machine_name: Option<&'a str>,
    /// Older heartbeats are rejected when set.
    pub max_age: Option<TimeDelta>,
    pub origin: &'a str,
    pub rules: &'a LanguageRules,
}

/// Validates and normalizes one payload.
pub fn normalize(
    payload: &HeartbeatPayload,
    ctx: &IngestContext<'_>,
) -> Result<Heartbeat, ValidationError> {
    let entity = payload.entity.trim();
    if entity.is_empty() {
        return Err(ValidationError::InvalidHeartbeat {
            message: "entity must not be empty".to_string(),
        });
    }

    let time = payload.time.to_instant()?;
    if time > ctx.now + MAX_FUTURE_SKEW {
        return Err(ValidationError::InvalidHeartbeat {
            message: format!("time {time} is in the future"),
        });
    }
    if let Some(max_age) = ctx.max_age {
        if time < ctx.now - max_age {
            return Err(ValidationError::InvalidHeartbeat {
                message: format!("time {time} is older than {} days", max_age.num_days()),
            });
        }
    }

    let kind: HeartbeatType = payload.kind.as_deref().unwrap_or_default().parse()?;
    let user_agent = payload
        .user_agent
        .as_deref()
        .or(ctx.user_agent)
        .unwrap_or_default();
    let parsed = parse_user_agent(user_agent);

    let mut heartbeat = Heartbeat::new(ctx.user_id.clone(), time, entity);
    heartbeat.kind = kind;
    heartbeat.category = text(payload.category.as_ref());
    heartbeat.project = text(payload.project.as_ref());
    heartbeat.branch = text(payload.branch.as_ref());
    heartbeat.language = canonical_name(&text(payload.language.as_ref()), EntityType::Language);
    heartbeat.editor = parsed
        .as_ref()
        .map_or_else(|| text(payload.editor.as_ref()), |ua| ua.editor.clone());
    heartbeat.operating_system = parsed
        .as_ref()
        .map_or_else(|| text(payload.operating_system.as_ref()), |ua| ua.operating_system.clone());
    heartbeat.machine = payload
        .machine_name
        .as_deref()
        .or(ctx.machine_name)
        .unwrap_or_default()
        .trim()
        .to_string();
    heartbeat.is_write = payload.is_write.unwrap_or(false);
    heartbeat.user_agent = user_agent.to_string();
    heartbeat.origin = ctx.origin.to_string();
    heartbeat.created_at = ctx.now;
    heartbeat.rehash();
    heartbeat.augment(ctx.rules);
    Ok(heartbeat)
}

fn text(value: Option<&String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Outcome for one item of an ingest batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the heartbeat was a replay of one already stored.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl ItemStatus {
    pub const fn created() -> Self {
        Self {
            status: 201,
            error: None,
            skipped: false,
        }
    }

    pub const fn duplicate() -> Self {
        Self {
            status: 201,
            error: None,
            skipped: true,
        }
    }

    pub fn rejected(error: &ValidationError) -> Self {
        Self {
            status: 400,
            error: Some(error.to_string()),
            skipped: false,
        }
    }
}

/// Response for a whole ingest batch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub responses: Vec<ItemStatus>,
}

impl IngestReport {
    pub fn inserted(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| r.status == 201 && !r.skipped)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.responses.iter().filter(|r| r.skipped).count()
    }

    pub fn rejected(&self) -> usize {
        self.responses.iter().filter(|r| r.status >= 400).count()
    }
}
