//! Entity dimensions as the single source of truth for summary item types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Key used for items whose value was empty or is missing from older data.
pub const UNKNOWN_KEY: &str = "unknown";

/// One dimension along which activity is aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Project,
    Language,
    Editor,
    OperatingSystem,
    Machine,
    Label,
    Branch,
    Entity,
    Category,
}

impl EntityType {
    /// Every dimension, in display order.
    pub const ALL: [Self; 9] = [
        Self::Project,
        Self::Language,
        Self::Editor,
        Self::OperatingSystem,
        Self::Machine,
        Self::Label,
        Self::Branch,
        Self::Entity,
        Self::Category,
    ];

    /// Dimensions carried by heartbeats themselves (everything but labels).
    pub const NATIVE: [Self; 8] = [
        Self::Project,
        Self::Language,
        Self::Editor,
        Self::OperatingSystem,
        Self::Machine,
        Self::Branch,
        Self::Entity,
        Self::Category,
    ];

    /// Dimensions written to the summary store. Labels are derived on read and
    /// entities are only computed for detailed requests.
    pub const PERSISTED: [Self; 7] = [
        Self::Project,
        Self::Language,
        Self::Editor,
        Self::OperatingSystem,
        Self::Machine,
        Self::Branch,
        Self::Category,
    ];

    /// Dimensions that aliases may rewrite.
    pub const ALIASABLE: [Self; 7] = [
        Self::Project,
        Self::Language,
        Self::Editor,
        Self::OperatingSystem,
        Self::Machine,
        Self::Branch,
        Self::Category,
    ];

    /// Canonical string form, also used for storage and query parameters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Language => "language",
            Self::Editor => "editor",
            Self::OperatingSystem => "operating_system",
            Self::Machine => "machine",
            Self::Label => "label",
            Self::Branch => "branch",
            Self::Entity => "entity",
            Self::Category => "category",
        }
    }

    /// Heartbeat/duration column holding this dimension, if it is native.
    pub const fn column(self) -> Option<&'static str> {
        match self {
            Self::Project => Some("project"),
            Self::Language => Some("language"),
            Self::Editor => Some("editor"),
            Self::OperatingSystem => Some("operating_system"),
            Self::Machine => Some("machine"),
            Self::Branch => Some("branch"),
            Self::Entity => Some("entity"),
            Self::Category => Some("category"),
            Self::Label => None,
        }
    }

    /// Stable small integer used in the `summary_items.type` and
    /// `leaderboard_items.by` columns.
    pub const fn code(self) -> u8 {
        match self {
            Self::Project => 0,
            Self::Language => 1,
            Self::Editor => 2,
            Self::OperatingSystem => 3,
            Self::Machine => 4,
            Self::Label => 5,
            Self::Branch => 6,
            Self::Entity => 7,
            Self::Category => 8,
        }
    }

    /// Inverse of [`EntityType::code`].
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Project),
            1 => Some(Self::Language),
            2 => Some(Self::Editor),
            3 => Some(Self::OperatingSystem),
            4 => Some(Self::Machine),
            5 => Some(Self::Label),
            6 => Some(Self::Branch),
            7 => Some(Self::Entity),
            8 => Some(Self::Category),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" | "projects" => Ok(Self::Project),
            "language" | "languages" => Ok(Self::Language),
            "editor" | "editors" => Ok(Self::Editor),
            "operating_system" | "operating_systems" | "os" => Ok(Self::OperatingSystem),
            "machine" | "machines" => Ok(Self::Machine),
            "label" | "labels" => Ok(Self::Label),
            "branch" | "branches" => Ok(Self::Branch),
            "entity" | "entities" | "file" => Ok(Self::Entity),
            "category" | "categories" => Ok(Self::Category),
            _ => Err(ValidationError::UnknownEntityType {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for EntityType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_variants() {
        for variant in EntityType::ALL {
            let parsed: EntityType = variant.as_str().parse().expect("should parse");
            assert_eq!(parsed, variant);
            assert_eq!(EntityType::from_code(variant.code()), Some(variant));
        }
    }

    #[test]
    fn plural_and_short_forms_parse() {
        assert_eq!("os".parse::<EntityType>().unwrap(), EntityType::OperatingSystem);
        assert_eq!("projects".parse::<EntityType>().unwrap(), EntityType::Project);
    }

    #[test]
    fn label_has_no_column() {
        assert!(EntityType::Label.column().is_none());
        assert_eq!(EntityType::OperatingSystem.column(), Some("operating_system"));
    }

    #[test]
    fn unknown_type_errors() {
        let err = "weather".parse::<EntityType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown entity type: weather");
    }
}
