//! Entity filters shared by every read path.
//!
//! A filter maps entity types to sets of acceptable values. Types are ANDed,
//! values within a type are ORed. The value `-` selects the unknown bucket and
//! is stored as the empty string, matching how heartbeats record missing
//! attributes.

use std::collections::{BTreeMap, BTreeSet};

use crate::alias::AliasResolver;
use crate::duration::Duration;
use crate::entity::{EntityType, UNKNOWN_KEY};
use crate::heartbeat::Heartbeat;
use crate::project_label::ProjectLabels;

/// Query token selecting items with no value.
pub const UNKNOWN_FILTER_TOKEN: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filters {
    by_type: BTreeMap<EntityType, BTreeSet<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Filters::insert`].
    #[must_use]
    pub fn with(mut self, entity_type: EntityType, value: &str) -> Self {
        self.insert(entity_type, value);
        self
    }

    /// Adds an acceptable value for a type.
    pub fn insert(&mut self, entity_type: EntityType, value: &str) {
        let value = value.trim();
        let stored = if value == UNKNOWN_FILTER_TOKEN {
            String::new()
        } else {
            value.to_string()
        };
        self.by_type.entry(entity_type).or_default().insert(stored);
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub fn contains_type(&self, entity_type: EntityType) -> bool {
        self.by_type.contains_key(&entity_type)
    }

    pub fn values(&self, entity_type: EntityType) -> Option<&BTreeSet<String>> {
        self.by_type.get(&entity_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &BTreeSet<String>)> {
        self.by_type.iter().map(|(entity_type, values)| (*entity_type, values))
    }

    /// Per-file durations are only worth computing when drilling into a project
    /// or into specific files.
    pub fn wants_entities(&self) -> bool {
        self.contains_type(EntityType::Project) || self.contains_type(EntityType::Entity)
    }

    /// Whether a raw attribute value passes the filter for its type.
    pub fn matches_value(&self, entity_type: EntityType, value: &str) -> bool {
        self.by_type
            .get(&entity_type)
            .is_none_or(|values| values.contains(value))
    }

    /// Whether a summary item key passes the filter. `unknown` keys stand for
    /// empty values.
    pub fn matches_key(&self, entity_type: EntityType, key: &str) -> bool {
        let Some(values) = self.by_type.get(&entity_type) else {
            return true;
        };
        values.contains(key) || (key == UNKNOWN_KEY && values.contains(""))
    }

    pub fn matches_heartbeat(&self, heartbeat: &Heartbeat) -> bool {
        self.by_type
            .keys()
            .filter(|entity_type| entity_type.column().is_some())
            .all(|entity_type| self.matches_value(*entity_type, heartbeat.value(*entity_type)))
    }

    /// Durations built coarsely carry no entity, so an entity filter is only
    /// checked when the duration has one.
    pub fn matches_duration(&self, duration: &Duration) -> bool {
        self.by_type
            .keys()
            .filter(|entity_type| entity_type.column().is_some())
            .filter(|entity_type| {
                **entity_type != EntityType::Entity || !duration.entity.is_empty()
            })
            .all(|entity_type| self.matches_value(*entity_type, duration.value(*entity_type)))
    }

    /// Adds every value aliased to a filtered key, so filtering by the key
    /// also finds data recorded under its aliases.
    #[must_use]
    pub fn with_aliases(&self, resolver: &AliasResolver) -> Self {
        let mut expanded = self.clone();
        for (entity_type, values) in &self.by_type {
            if !EntityType::ALIASABLE.contains(entity_type) {
                continue;
            }
            let set = expanded.by_type.entry(*entity_type).or_default();
            for value in values {
                set.extend(resolver.values_for(*entity_type, value));
            }
        }
        expanded
    }

    /// Replaces a label filter by the projects carrying those labels. The
    /// projects are merged into any existing project filter. A label that
    /// matches no project leaves an empty project set, which matches nothing.
    #[must_use]
    pub fn with_project_labels(&self, labels: &ProjectLabels) -> Self {
        let mut expanded = self.clone();
        let Some(label_values) = expanded.by_type.remove(&EntityType::Label) else {
            return expanded;
        };
        let projects = expanded.by_type.entry(EntityType::Project).or_default();
        for label in &label_values {
            projects.extend(labels.projects_for(label).map(str::to_string));
        }
        expanded
    }

    /// Stable textual form for cache keys and logs.
    pub fn fingerprint(&self) -> String {
        self.by_type
            .iter()
            .map(|(entity_type, values)| {
                let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{entity_type}={}", joined.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}
