//! Heartbeats: single timestamped moments of editor activity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityType;
use crate::language_mapping::LanguageRules;
use crate::types::{UserId, ValidationError};

/// What a heartbeat's `entity` string refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeartbeatType {
    #[default]
    File,
    App,
    Domain,
    Url,
}

impl HeartbeatType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::App => "app",
            Self::Domain => "domain",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for HeartbeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeartbeatType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" | "" => Ok(Self::File),
            "app" => Ok(Self::App),
            "domain" => Ok(Self::Domain),
            "url" => Ok(Self::Url),
            _ => Err(ValidationError::UnknownHeartbeatType {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for HeartbeatType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HeartbeatType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A normalized heartbeat as stored.
///
/// Empty attribute strings mean "not sent"; they surface as `unknown` in
/// summaries. `time` always has millisecond precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub user_id: UserId,
    pub time: DateTime<Utc>,
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: HeartbeatType,
    pub category: String,
    pub project: String,
    pub branch: String,
    pub language: String,
    pub editor: String,
    pub operating_system: String,
    pub machine: String,
    pub is_write: bool,
    pub user_agent: String,
    pub origin: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl Heartbeat {
    /// Creates a heartbeat with only the required fields set.
    pub fn new(user_id: UserId, time: DateTime<Utc>, entity: impl Into<String>) -> Self {
        let mut heartbeat = Self {
            user_id,
            time: truncate_to_millis(time),
            entity: entity.into(),
            kind: HeartbeatType::File,
            category: String::new(),
            project: String::new(),
            branch: String::new(),
            language: String::new(),
            editor: String::new(),
            operating_system: String::new(),
            machine: String::new(),
            is_write: false,
            user_agent: String::new(),
            origin: String::new(),
            hash: String::new(),
            created_at: time,
        };
        heartbeat.rehash();
        heartbeat
    }

    /// Raw attribute value for a native dimension. Labels have no value here.
    pub fn value(&self, entity_type: EntityType) -> &str {
        match entity_type {
            EntityType::Project => &self.project,
            EntityType::Language => &self.language,
            EntityType::Editor => &self.editor,
            EntityType::OperatingSystem => &self.operating_system,
            EntityType::Machine => &self.machine,
            EntityType::Branch => &self.branch,
            EntityType::Entity => &self.entity,
            EntityType::Category => &self.category,
            EntityType::Label => "",
        }
    }

    /// Content hash over the fields that identify a replayed event.
    ///
    /// Editor, OS and machine are deliberately absent: the same keystroke sent
    /// through two plugins is still one event.
    pub fn content_hash(&self) -> String {
        let content = format!(
            "heartbeat|{}|{}|{}|{}|{}|{}|{}|{}",
            self.user_id,
            self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.entity,
            self.kind,
            self.project,
            self.branch,
            self.language,
            self.is_write,
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
    }

    /// Recomputes [`Heartbeat::hash`] after fields changed.
    pub fn rehash(&mut self) {
        self.hash = self.content_hash();
    }

    /// Applies extension rules to the language. A matching rule always wins
    /// over the plugin-reported language.
    pub fn augment(&mut self, rules: &LanguageRules) {
        if self.kind != HeartbeatType::File || rules.is_empty() {
            return;
        }
        let Some(language) = rules.language_for(&self.entity) else {
            return;
        };
        if self.language != language {
            self.language = language.to_string();
            self.rehash();
        }
    }
}

/// Drops sub-millisecond precision so stored and in-memory values agree.
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language_mapping::LanguageMapping;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    #[test]
    fn hash_ignores_editor_and_os() {
        let mut a = Heartbeat::new(alice(), at(1_673_810_732), "file1");
        let mut b = a.clone();
        a.editor = "vscode".into();
        b.editor = "goland".into();
        b.operating_system = "Linux".into();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn hash_depends_on_time_and_user() {
        let a = Heartbeat::new(alice(), at(1_673_810_732), "file1");
        let b = Heartbeat::new(alice(), at(1_673_810_733), "file1");
        let c = Heartbeat::new(UserId::new("bob").unwrap(), at(1_673_810_732), "file1");
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn augment_overrides_language_and_rehashes() {
        let rules = LanguageRules::resolve(
            std::iter::empty(),
            &[LanguageMapping {
                id: 1,
                user_id: alice(),
                extension: "py".into(),
                language: "Python3".into(),
            }],
        );
        let mut heartbeat = Heartbeat::new(alice(), at(0), "~/dev/file.py");
        heartbeat.language = "Python".into();
        heartbeat.rehash();
        let before = heartbeat.hash.clone();
        heartbeat.augment(&rules);
        assert_eq!(heartbeat.language, "Python3");
        assert_ne!(heartbeat.hash, before);
    }

    #[test]
    fn value_returns_native_fields() {
        let mut heartbeat = Heartbeat::new(alice(), at(0), "main.rs");
        heartbeat.project = "codetime".into();
        assert_eq!(heartbeat.value(EntityType::Project), "codetime");
        assert_eq!(heartbeat.value(EntityType::Entity), "main.rs");
        assert_eq!(heartbeat.value(EntityType::Machine), "");
        assert_eq!(heartbeat.value(EntityType::Label), "");
    }

    #[test]
    fn time_is_truncated_to_millis() {
        let time = DateTime::from_timestamp(10, 123_456_789).unwrap();
        let heartbeat = Heartbeat::new(alice(), time, "x");
        assert_eq!(heartbeat.time.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn heartbeat_type_parses() {
        assert_eq!("url".parse::<HeartbeatType>().unwrap(), HeartbeatType::Url);
        assert!("window".parse::<HeartbeatType>().is_err());
    }
}
