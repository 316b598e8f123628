//! The assembled service graph.

use std::sync::Arc;

use ct_core::{User, UserId};
use ct_db::Database;

use crate::aggregation::Aggregator;
use crate::cache::SummaryCache;
use crate::config::EngineConfig;
use crate::durations::DurationService;
use crate::error::EngineError;
use crate::events::{Event, EventBus};
use crate::housekeeping::Housekeeping;
use crate::ingest::IngestService;
use crate::leaderboard::LeaderboardService;
use crate::rules::RuleService;
use crate::summary::SummaryEngine;

/// Every engine service wired to one database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    config: Arc<EngineConfig>,
    cache: SummaryCache,
    events: EventBus,
    rules: RuleService,
    durations: DurationService,
    summaries: SummaryEngine,
    aggregator: Aggregator,
    housekeeping: Housekeeping,
    leaderboard: LeaderboardService,
    ingest: IngestService,
}

impl Engine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let cache = SummaryCache::new(config.summary_cache_ttl, config.summary_cache_capacity);
        let events = EventBus::new();
        let rules = RuleService::new(db.clone(), cache.clone(), &config);
        let durations = DurationService::new(
            db.clone(),
            config.stream_batch_size,
            config.duration_regeneration_interval,
        );
        let summaries =
            SummaryEngine::new(db.clone(), durations.clone(), rules.clone(), cache.clone());
        let aggregator = Aggregator::new(db.clone(), summaries.clone(), config.aggregation_workers);
        let housekeeping = Housekeeping::new(db.clone(), cache.clone(), &config);
        let leaderboard = LeaderboardService::new(db.clone(), summaries.clone(), &config);
        let ingest = IngestService::new(
            db.clone(),
            rules.clone(),
            events.clone(),
            cache.clone(),
            config.heartbeat_max_age,
        );
        Self {
            db,
            config: Arc::new(config),
            cache,
            events,
            rules,
            durations,
            summaries,
            aggregator,
            housekeeping,
            leaderboard,
            ingest,
        }
    }

    pub const fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    pub const fn rules(&self) -> &RuleService {
        &self.rules
    }

    pub const fn durations(&self) -> &DurationService {
        &self.durations
    }

    pub const fn summaries(&self) -> &SummaryEngine {
        &self.summaries
    }

    pub const fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub const fn housekeeping(&self) -> &Housekeeping {
        &self.housekeeping
    }

    pub const fn leaderboard(&self) -> &LeaderboardService {
        &self.leaderboard
    }

    pub const fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    pub fn create_user(&self, user: &User) -> Result<(), EngineError> {
        self.db.insert_user(user)?;
        tracing::info!(user = %user.id, "created user");
        Ok(())
    }

    pub fn user(&self, user_id: &UserId) -> Result<User, EngineError> {
        self.db
            .get_user(user_id)?
            .ok_or_else(|| EngineError::not_found("user", user_id.as_str()))
    }

    pub fn users(&self) -> Result<Vec<User>, EngineError> {
        Ok(self.db.list_users()?)
    }

    /// Stores new preferences and announces them. Cached summaries are
    /// dropped since the zone or timeout may have changed.
    pub fn update_user(&self, user: &User) -> Result<(), EngineError> {
        if !self.db.update_user(user)? {
            return Err(EngineError::not_found("user", user.id.as_str()));
        }
        self.cache.invalidate_user(&user.id);
        self.events.publish(Event::UserUpdated(user.clone()));
        Ok(())
    }

    /// Deletes a user with all their data.
    pub fn delete_user(&self, user_id: &UserId) -> Result<(), EngineError> {
        if !self.db.delete_user(user_id)? {
            return Err(EngineError::not_found("user", user_id.as_str()));
        }
        self.cache.invalidate_user(user_id);
        tracing::info!(user = %user_id, "deleted user");
        Ok(())
    }
}
