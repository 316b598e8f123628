//! Summaries: per-dimension activity totals over a time window.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alias::AliasResolver;
use crate::duration::Duration;
use crate::entity::{EntityType, UNKNOWN_KEY};
use crate::filters::Filters;
use crate::project_label::ProjectLabels;
use crate::types::UserId;

/// Items below half a second round to zero seconds and are dropped.
const MIN_ITEM_TOTAL_MS: i64 = 500;

/// One (dimension, key, total) row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub key: String,
    /// Total time in milliseconds.
    pub total_ms: i64,
}

impl SummaryItem {
    pub fn new(entity_type: EntityType, key: impl Into<String>, total_ms: i64) -> Self {
        Self {
            entity_type,
            key: key.into(),
            total_ms,
        }
    }

    pub const fn total_secs(&self) -> i64 {
        (self.total_ms + MIN_ITEM_TOTAL_MS) / 1000
    }
}

/// Totals for one user over `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Row id once persisted.
    #[serde(skip)]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub num_heartbeats: i64,
    items: BTreeMap<EntityType, Vec<SummaryItem>>,
}

impl Summary {
    pub fn new(user_id: UserId, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            from,
            to,
            num_heartbeats: 0,
            items: BTreeMap::new(),
        }
    }

    /// Folds durations into per-dimension totals, counting only the part of
    /// each duration inside `[from, to)`. Empty attributes count as `unknown`.
    pub fn from_durations(
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        durations: &[Duration],
        types: &[EntityType],
    ) -> Self {
        let mut totals: HashMap<(EntityType, &str), i64> = HashMap::new();
        for duration in durations {
            if duration.time >= to || duration.end() < from {
                continue;
            }
            let Some(clipped) = duration.clip(from, to) else {
                continue;
            };
            let length_ms = clipped.length.num_milliseconds();
            for entity_type in types {
                let key = match duration.value(*entity_type) {
                    "" => UNKNOWN_KEY,
                    value => value,
                };
                *totals.entry((*entity_type, key)).or_default() += length_ms;
            }
        }

        let mut summary = Self::new(user_id, from, to);
        for ((entity_type, key), total_ms) in totals {
            summary.push_item(SummaryItem::new(entity_type, key, total_ms));
        }
        summary.finalize();
        summary
    }

    /// Sums several summaries into one covering `[from, to)`.
    pub fn merge(
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        parts: impl IntoIterator<Item = Self>,
    ) -> Self {
        let mut totals: BTreeMap<(EntityType, String), i64> = BTreeMap::new();
        let mut num_heartbeats = 0;
        for part in parts {
            num_heartbeats += part.num_heartbeats;
            for item in part.items.into_values().flatten() {
                *totals.entry((item.entity_type, item.key)).or_default() += item.total_ms;
            }
        }

        let mut merged = Self::new(user_id, from, to);
        merged.num_heartbeats = num_heartbeats;
        for ((entity_type, key), total_ms) in totals {
            merged.push_item(SummaryItem::new(entity_type, key, total_ms));
        }
        merged.finalize();
        merged
    }

    pub fn items(&self, entity_type: EntityType) -> &[SummaryItem] {
        self.items
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all_items(&self) -> impl Iterator<Item = &SummaryItem> {
        self.items.values().flatten()
    }

    pub fn set_items(&mut self, entity_type: EntityType, items: Vec<SummaryItem>) {
        if items.is_empty() {
            self.items.remove(&entity_type);
        } else {
            self.items.insert(entity_type, items);
        }
    }

    pub fn push_item(&mut self, item: SummaryItem) {
        self.items.entry(item.entity_type).or_default().push(item);
    }

    /// True when no dimension has any item.
    pub fn is_empty(&self) -> bool {
        self.items.values().all(Vec::is_empty)
    }

    /// Drops zero-rounding items and sorts every dimension.
    pub fn finalize(&mut self) {
        for items in self.items.values_mut() {
            items.retain(|item| item.total_ms >= MIN_ITEM_TOTAL_MS);
            sort_items(items);
        }
        self.items.retain(|_, items| !items.is_empty());
    }

    pub fn total_by(&self, entity_type: EntityType) -> i64 {
        self.items(entity_type).iter().map(|item| item.total_ms).sum()
    }

    pub fn total_by_key(&self, entity_type: EntityType, key: &str) -> i64 {
        self.items(entity_type)
            .iter()
            .filter(|item| item.key == key)
            .map(|item| item.total_ms)
            .sum()
    }

    /// Wall-clock total, taken from the first dimension that has time.
    pub fn total_ms(&self) -> i64 {
        EntityType::ALL
            .iter()
            .map(|entity_type| self.total_by(*entity_type))
            .find(|total| *total > 0)
            .unwrap_or(0)
    }

    /// Item with the largest total for a dimension.
    pub fn max_by(&self, entity_type: EntityType) -> Option<&SummaryItem> {
        self.items(entity_type).first()
    }

    /// Gives every empty dimension a single `unknown` item carrying the
    /// summary's total, as long as at least one dimension has time.
    pub fn fill_unknown(&mut self) {
        let total = self.total_ms();
        if total <= 0 {
            return;
        }
        for entity_type in EntityType::ALL {
            if self.items(entity_type).is_empty() {
                let unknown = SummaryItem::new(entity_type, UNKNOWN_KEY, total);
                self.set_items(entity_type, vec![unknown]);
            }
        }
    }

    /// Rewrites item keys through the alias resolver and merges items that end
    /// up with the same key. Entities are never aliased.
    pub fn apply_aliases(&mut self, resolver: &AliasResolver) {
        if resolver.is_empty() {
            return;
        }
        for entity_type in EntityType::ALIASABLE {
            let Some(items) = self.items.remove(&entity_type) else {
                continue;
            };
            let mut merged: Vec<SummaryItem> = Vec::with_capacity(items.len());
            for item in items {
                let key = resolver.resolve(entity_type, &item.key);
                match merged.iter_mut().find(|existing| existing.key == key) {
                    Some(existing) => existing.total_ms += item.total_ms,
                    None => merged.push(SummaryItem::new(entity_type, key, item.total_ms)),
                }
            }
            sort_items(&mut merged);
            self.items.insert(entity_type, merged);
        }
    }

    /// Derives label items from project items. A project with several labels
    /// contributes to each; unlabeled time goes to `unknown`.
    pub fn apply_project_labels(&mut self, labels: &ProjectLabels) {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for item in self.items(EntityType::Project) {
            let mut labeled = false;
            for label in labels.labels_for(&item.key) {
                *totals.entry(label.to_string()).or_default() += item.total_ms;
                labeled = true;
            }
            if !labeled {
                *totals.entry(UNKNOWN_KEY.to_string()).or_default() += item.total_ms;
            }
        }
        let mut items: Vec<SummaryItem> = totals
            .into_iter()
            .map(|(key, total_ms)| SummaryItem::new(EntityType::Label, key, total_ms))
            .collect();
        sort_items(&mut items);
        self.set_items(EntityType::Label, items);
    }

    /// Drops items that fail the filter for their own dimension.
    ///
    /// Totals of other dimensions are left alone, so this only makes sense
    /// for callers interested in the filtered dimension.
    pub fn retain_matching(&mut self, filters: &Filters) {
        for (entity_type, items) in &mut self.items {
            items.retain(|item| filters.matches_key(*entity_type, &item.key));
        }
        self.items.retain(|_, items| !items.is_empty());
    }
}

/// Sorts by total descending, then key ascending.
pub fn sort_items(items: &mut [SummaryItem]) {
    items.sort_by(|a, b| b.total_ms.cmp(&a.total_ms).then_with(|| a.key.cmp(&b.key)));
}

/// Builds one summary per day range in parallel. `counts` holds the number
/// of heartbeats per range, in the same order.
pub fn summarize_ranges(
    user_id: &UserId,
    ranges: &[(DateTime<Utc>, DateTime<Utc>)],
    counts: &[i64],
    durations: &[Duration],
    types: &[EntityType],
) -> Vec<Summary> {
    ranges
        .par_iter()
        .enumerate()
        .map(|(index, (from, to))| {
            let mut summary =
                Summary::from_durations(user_id.clone(), *from, *to, durations, types);
            summary.num_heartbeats = counts.get(index).copied().unwrap_or(0);
            summary
        })
        .collect()
}
