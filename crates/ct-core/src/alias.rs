//! User-defined aliases that collapse several values into one key.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::types::UserId;

/// Rewrites `value` to `key` for one dimension of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: i64,
    pub user_id: UserId,
    pub entity_type: EntityType,
    pub key: String,
    pub value: String,
}

/// Forward and reverse alias lookup for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasResolver {
    forward: HashMap<(EntityType, String), String>,
    reverse: HashMap<(EntityType, String), BTreeSet<String>>,
}

impl AliasResolver {
    /// Builds a resolver. Chains (`a -> b`, `b -> c`) are followed to their end
    /// so that resolving an already resolved key is a no-op. Cycles stop at the
    /// first repeated value.
    pub fn new(aliases: &[Alias]) -> Self {
        let mut direct: HashMap<(EntityType, String), String> = HashMap::new();
        for alias in aliases {
            if alias.key == alias.value || alias.value.is_empty() {
                continue;
            }
            direct.insert((alias.entity_type, alias.value.clone()), alias.key.clone());
        }

        let mut forward = HashMap::with_capacity(direct.len());
        for (entity_type, value) in direct.keys() {
            let mut seen = BTreeSet::from([value.clone()]);
            let mut current = value.clone();
            while let Some(next) = direct.get(&(*entity_type, current.clone())) {
                if !seen.insert(next.clone()) {
                    break;
                }
                current.clone_from(next);
            }
            if current != *value {
                forward.insert((*entity_type, value.clone()), current);
            }
        }

        let mut reverse: HashMap<(EntityType, String), BTreeSet<String>> = HashMap::new();
        for ((entity_type, value), key) in &forward {
            reverse
                .entry((*entity_type, key.clone()))
                .or_default()
                .insert(value.clone());
        }

        Self { forward, reverse }
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Canonical key for a value, or the value itself when it has no alias.
    pub fn resolve<'a>(&'a self, entity_type: EntityType, value: &'a str) -> &'a str {
        self.forward
            .get(&(entity_type, value.to_string()))
            .map_or(value, String::as_str)
    }

    /// Every value that resolves to `key`, not including `key` itself.
    pub fn values_for(&self, entity_type: EntityType, key: &str) -> Vec<String> {
        self.reverse
            .get(&(entity_type, key.to_string()))
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }
}
