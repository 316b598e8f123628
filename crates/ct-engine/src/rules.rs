//! Per-user rewrite rules: aliases, project labels and language mappings.
//!
//! Alias resolvers are cached per user and dropped on every alias write.
//! Rule writes also evict the user's cached summaries.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use moka::sync::Cache;

use ct_core::{
    Alias, AliasResolver, EntityType, LanguageMapping, LanguageRules, ProjectLabel, ProjectLabels,
    UserId, ValidationError,
};
use ct_db::Database;

use crate::cache::SummaryCache;
use crate::config::EngineConfig;
use crate::error::EngineError;

const RESOLVER_CACHE_TTL: StdDuration = StdDuration::from_secs(60 * 60);
const RESOLVER_CACHE_CAPACITY: u64 = 10_000;

#[derive(Clone)]
pub struct RuleService {
    db: Database,
    resolvers: Cache<UserId, Arc<AliasResolver>>,
    summaries: SummaryCache,
    server_mappings: Arc<std::collections::BTreeMap<String, String>>,
}

impl std::fmt::Debug for RuleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleService")
            .field("cached_resolvers", &self.resolvers.entry_count())
            .finish_non_exhaustive()
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(value.to_string())
}

impl RuleService {
    pub fn new(db: Database, summaries: SummaryCache, config: &EngineConfig) -> Self {
        Self {
            db,
            resolvers: Cache::builder()
                .max_capacity(RESOLVER_CACHE_CAPACITY)
                .time_to_live(RESOLVER_CACHE_TTL)
                .build(),
            summaries,
            server_mappings: Arc::new(config.language_mappings.clone()),
        }
    }

    /// The user's alias resolver, loaded on first use.
    pub fn resolver(&self, user_id: &UserId) -> Result<Arc<AliasResolver>, EngineError> {
        if let Some(resolver) = self.resolvers.get(user_id) {
            return Ok(resolver);
        }
        let resolver = Arc::new(AliasResolver::new(&self.db.list_aliases(user_id)?));
        self.resolvers.insert(user_id.clone(), Arc::clone(&resolver));
        Ok(resolver)
    }

    pub fn add_alias(
        &self,
        user_id: &UserId,
        entity_type: EntityType,
        key: &str,
        value: &str,
    ) -> Result<i64, EngineError> {
        if !EntityType::ALIASABLE.contains(&entity_type) {
            return Err(ValidationError::UnknownEntityType {
                value: entity_type.to_string(),
            }
            .into());
        }
        let id = self.db.insert_alias(
            user_id,
            entity_type,
            &required("key", key)?,
            &required("value", value)?,
        )?;
        self.invalidate(user_id);
        tracing::info!(user = %user_id, entity_type = %entity_type, key, value, "added alias");
        Ok(id)
    }

    pub fn aliases(&self, user_id: &UserId) -> Result<Vec<Alias>, EngineError> {
        Ok(self.db.list_aliases(user_id)?)
    }

    pub fn delete_alias(&self, user_id: &UserId, id: i64) -> Result<(), EngineError> {
        if !self.db.delete_alias(user_id, id)? {
            return Err(EngineError::not_found("alias", id.to_string()));
        }
        self.invalidate(user_id);
        Ok(())
    }

    /// The user's labels as a lookup index.
    pub fn project_labels(&self, user_id: &UserId) -> Result<ProjectLabels, EngineError> {
        Ok(ProjectLabels::new(&self.db.list_project_labels(user_id)?))
    }

    pub fn add_project_label(
        &self,
        user_id: &UserId,
        project: &str,
        label: &str,
    ) -> Result<i64, EngineError> {
        let project = required("project", project)?;
        let id = self
            .db
            .insert_project_label(user_id, &project, &required("label", label)?)?;
        self.summaries.invalidate_user(user_id);
        Ok(id)
    }

    pub fn labels(&self, user_id: &UserId) -> Result<Vec<ProjectLabel>, EngineError> {
        Ok(self.db.list_project_labels(user_id)?)
    }

    pub fn delete_project_label(&self, user_id: &UserId, id: i64) -> Result<(), EngineError> {
        if !self.db.delete_project_label(user_id, id)? {
            return Err(EngineError::not_found("project label", id.to_string()));
        }
        self.summaries.invalidate_user(user_id);
        Ok(())
    }

    /// Server defaults merged with the user's own mappings.
    pub fn language_rules(&self, user_id: &UserId) -> Result<LanguageRules, EngineError> {
        let mappings = self.db.list_language_mappings(user_id)?;
        Ok(LanguageRules::resolve(self.server_mappings.iter(), &mappings))
    }

    pub fn set_language_mapping(
        &self,
        user_id: &UserId,
        extension: &str,
        language: &str,
    ) -> Result<i64, EngineError> {
        let extension = required("extension", extension)?;
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(ValidationError::Empty { field: "extension" }.into());
        }
        Ok(self
            .db
            .upsert_language_mapping(user_id, extension, &required("language", language)?)?)
    }

    pub fn language_mappings(&self, user_id: &UserId) -> Result<Vec<LanguageMapping>, EngineError> {
        Ok(self.db.list_language_mappings(user_id)?)
    }

    pub fn delete_language_mapping(&self, user_id: &UserId, id: i64) -> Result<(), EngineError> {
        if !self.db.delete_language_mapping(user_id, id)? {
            return Err(EngineError::not_found("language mapping", id.to_string()));
        }
        Ok(())
    }

    fn invalidate(&self, user_id: &UserId) {
        self.resolvers.invalidate(user_id);
        self.summaries.invalidate_user(user_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use ct_core::User;

    use super::*;

    fn setup() -> (RuleService, UserId) {
        let db = Database::open_in_memory().unwrap();
        let user_id = UserId::new("alice").unwrap();
        db.insert_user(&User::new(user_id.clone(), DateTime::UNIX_EPOCH)).unwrap();
        let config = EngineConfig::default();
        let cache = SummaryCache::new(config.summary_cache_ttl, 100);
        (RuleService::new(db, cache, &config), user_id)
    }

    #[test]
    fn alias_writes_refresh_the_resolver() {
        let (rules, user_id) = setup();
        assert!(rules.resolver(&user_id).unwrap().is_empty());

        let id = rules
            .add_alias(&user_id, EntityType::Project, "wakapi", "wakapi-mobile")
            .unwrap();
        let resolver = rules.resolver(&user_id).unwrap();
        assert_eq!(resolver.resolve(EntityType::Project, "wakapi-mobile"), "wakapi");

        rules.delete_alias(&user_id, id).unwrap();
        assert!(rules.resolver(&user_id).unwrap().is_empty());
        assert_eq!(rules.delete_alias(&user_id, id).unwrap_err().status_code(), 404);
    }

    #[test]
    fn aliases_reject_labels_and_blank_values() {
        let (rules, user_id) = setup();
        let err = rules.add_alias(&user_id, EntityType::Label, "a", "b").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = rules.add_alias(&user_id, EntityType::Project, "a", "  ").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn user_mappings_override_server_defaults() {
        let (rules, user_id) = setup();
        let defaults = rules.language_rules(&user_id).unwrap();
        assert_eq!(defaults.language_for("App.vue"), Some("Vue"));

        rules.set_language_mapping(&user_id, ".vue", "HTML").unwrap();
        let rules_now = rules.language_rules(&user_id).unwrap();
        assert_eq!(rules_now.language_for("App.vue"), Some("HTML"));
        assert_eq!(rules.language_mappings(&user_id).unwrap()[0].extension, "vue");
    }

    #[test]
    fn labels_index_projects() {
        let (rules, user_id) = setup();
        rules.add_project_label(&user_id, "ct", "work").unwrap();
        let labels = rules.project_labels(&user_id).unwrap();
        assert_eq!(labels.projects_for("work").collect::<Vec<_>>(), vec!["ct"]);
    }
}
