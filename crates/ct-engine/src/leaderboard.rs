//! Leaderboard snapshots.
//!
//! Rows are rebuilt per user from a summary over the configured interval and
//! ranked when read. Only users who opted in are listed.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ct_core::leaderboard::{DEFAULT_PAGE_SIZE, items_from_summary, paginate};
use ct_core::{EntityType, Interval, RankedItem, User, UserId};
use ct_db::Database;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::summary::{SummaryEngine, SummaryOptions, SummaryRequest};

/// A page of one ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub interval: Interval,
    /// `None` reads the general ranking.
    pub by: Option<EntityType>,
    /// Restricts an aggregated ranking to one key, such as one language.
    pub key: Option<String>,
    /// One-based.
    pub page: usize,
    pub page_size: usize,
    /// Appended to the page when ranked elsewhere.
    pub requester: Option<UserId>,
}

impl LeaderboardQuery {
    pub const fn new(interval: Interval) -> Self {
        Self {
            interval,
            by: None,
            key: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            requester: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaderboardService {
    db: Database,
    summaries: SummaryEngine,
    enabled: bool,
    scope: Interval,
    by: Vec<EntityType>,
}

impl LeaderboardService {
    pub fn new(db: Database, summaries: SummaryEngine, config: &EngineConfig) -> Self {
        Self {
            db,
            summaries,
            enabled: config.leaderboard_enabled,
            scope: config.leaderboard_scope,
            by: config.leaderboard_by.clone(),
        }
    }

    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    pub const fn scope(&self) -> Interval {
        self.scope
    }

    /// Rebuilds the snapshot for every user. Returns the number of users
    /// with rows afterwards.
    pub fn generate(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if !self.enabled {
            tracing::debug!("leaderboard disabled");
            return Ok(0);
        }
        let mut listed = 0;
        for user in self.db.list_users()? {
            match self.generate_for_user(&user, now) {
                Ok(0) => {}
                Ok(_) => listed += 1,
                Err(err) => {
                    tracing::error!(user = %user.id, error = %err, "leaderboard update failed");
                }
            }
        }
        tracing::info!(interval = %self.scope, users = listed, "leaderboard generated");
        Ok(listed)
    }

    /// Rebuilds one user's rows. Users who did not opt in, or had no
    /// activity in the interval, end up without rows.
    pub fn generate_for_user(&self, user: &User, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if !user.public_leaderboard {
            self.db.delete_leaderboard_items_by_user(&user.id)?;
            return Ok(0);
        }
        let (from, to) = self.scope.resolve(now, user.time_zone, user.start_of_week);
        let options = SummaryOptions {
            apply_aliases: true,
            apply_project_labels: false,
            use_cache: true,
        };
        let summary = self.summaries.generate(
            &SummaryRequest::new(user.clone(), from, to),
            options,
            &CancellationToken::new(),
        )?;
        if summary.total_ms() == 0 {
            self.db.delete_leaderboard_items_by_user(&user.id)?;
            return Ok(0);
        }
        let items = items_from_summary(&summary, self.scope, &self.by, now);
        let written = self.db.replace_leaderboard_items(&user.id, self.scope, &items)?;
        tracing::debug!(user = %user.id, rows = written, "leaderboard rows replaced");
        Ok(written)
    }

    /// Brings a user's rows in line with their opt-in after a preference
    /// change.
    pub fn sync_user(&self, user: &User, now: DateTime<Utc>) -> Result<(), EngineError> {
        if !self.enabled {
            return Ok(());
        }
        let listed = self.db.count_leaderboard_items(&user.id)? > 0;
        if user.public_leaderboard && !listed {
            self.generate_for_user(user, now)?;
        } else if !user.public_leaderboard && listed {
            let removed = self.db.delete_leaderboard_items_by_user(&user.id)?;
            tracing::info!(user = %user.id, removed, "removed from leaderboard");
        }
        Ok(())
    }

    pub fn read(&self, query: &LeaderboardQuery) -> Result<Vec<RankedItem>, EngineError> {
        let ranked = self
            .db
            .ranked_leaderboard(query.interval, query.by, query.key.as_deref())?;
        Ok(paginate(&ranked, query.page, query.page_size, query.requester.as_ref()))
    }

    /// One user's row in a ranking, if they are listed.
    pub fn user_rank(
        &self,
        interval: Interval,
        by: Option<EntityType>,
        key: Option<&str>,
        user_id: &UserId,
    ) -> Result<Option<RankedItem>, EngineError> {
        Ok(self
            .db
            .ranked_leaderboard(interval, by, key)?
            .into_iter()
            .find(|row| &row.user_id == user_id))
    }
}
