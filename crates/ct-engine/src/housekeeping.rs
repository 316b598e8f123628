//! Retention cleanup of raw activity data.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ct_core::{Filters, User, day};
use ct_db::Database;

use crate::cache::SummaryCache;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Rows removed (or, in a dry run, that would be removed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub users: usize,
    pub heartbeats: usize,
    pub durations: usize,
    pub summaries: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct Housekeeping {
    db: Database,
    cache: SummaryCache,
    retention_months: i32,
    dry_run: bool,
    keep_summaries: bool,
}

impl Housekeeping {
    pub fn new(db: Database, cache: SummaryCache, config: &EngineConfig) -> Self {
        Self {
            db,
            cache,
            retention_months: config.data_retention_months,
            dry_run: config.data_cleanup_dry_run,
            keep_summaries: config.keep_summaries_on_cleanup,
        }
    }

    pub const fn retention_enabled(&self) -> bool {
        self.retention_months > 0
    }

    /// Applies the retention window to every user not excluded from it.
    pub fn run(&self, now: DateTime<Utc>) -> Result<CleanupReport, EngineError> {
        let mut report = CleanupReport {
            dry_run: self.dry_run,
            ..CleanupReport::default()
        };
        if !self.retention_enabled() {
            tracing::debug!("data retention disabled, keeping everything");
            return Ok(report);
        }

        for user in self.db.list_users()? {
            if user.exclude_from_retention {
                tracing::debug!(user = %user.id, "excluded from retention");
                continue;
            }
            match self.cleanup_user(&user, now) {
                Ok(user_report) => {
                    report.users += 1;
                    report.heartbeats += user_report.heartbeats;
                    report.durations += user_report.durations;
                    report.summaries += user_report.summaries;
                }
                Err(err) => tracing::error!(user = %user.id, error = %err, "cleanup failed"),
            }
        }
        tracing::info!(
            users = report.users,
            heartbeats = report.heartbeats,
            durations = report.durations,
            summaries = report.summaries,
            dry_run = self.dry_run,
            "data cleanup finished"
        );
        Ok(report)
    }

    /// Removes one user's data older than the retention window, counted back
    /// in calendar months in their zone.
    pub fn cleanup_user(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, EngineError> {
        let mut report = CleanupReport {
            users: 1,
            dry_run: self.dry_run,
            ..CleanupReport::default()
        };
        if !self.retention_enabled() {
            return Ok(report);
        }
        let cutoff = day::add_months(now, user.time_zone, -self.retention_months);

        if self.dry_run {
            let heartbeats = self.db.count_heartbeats_between(
                &user.id,
                DateTime::<Utc>::UNIX_EPOCH,
                cutoff,
                &Filters::new(),
            )?;
            report.heartbeats = usize::try_from(heartbeats).unwrap_or_default();
            tracing::info!(
                user = %user.id,
                cutoff = %cutoff,
                heartbeats,
                "dry run, would delete heartbeats"
            );
            return Ok(report);
        }

        report.heartbeats = self.db.delete_heartbeats_by_user_before(&user.id, cutoff)?;
        report.durations = self.db.delete_durations_by_user_before(&user.id, cutoff)?;
        if !self.keep_summaries {
            report.summaries = self.db.delete_summaries_by_user_before(&user.id, cutoff)?;
        }
        self.cache.invalidate_user(&user.id);
        tracing::info!(
            user = %user.id,
            cutoff = %cutoff,
            heartbeats = report.heartbeats,
            durations = report.durations,
            summaries = report.summaries,
            "deleted old data"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEnv, utc};

    fn setup(retention_months: i32, dry_run: bool, keep_summaries: bool) -> TestEnv {
        TestEnv::with_config(EngineConfig {
            data_retention_months: retention_months,
            data_cleanup_dry_run: dry_run,
            keep_summaries_on_cleanup: keep_summaries,
            aggregation_workers: 1,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn deletes_heartbeats_past_the_window() {
        let env = setup(1, false, true);
        let user = env.user("alice", "UTC");
        env.session(&user, "2024-01-10T09:00:00Z", 10, "old");
        env.session(&user, "2024-02-20T09:00:00Z", 10, "new");
        env.engine.aggregator().run(utc("2024-02-21T00:00:00Z"), &[]).unwrap();
        let summaries = env.engine.db().count_summaries(&user.id).unwrap();

        let report = env.engine.housekeeping().run(utc("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(report.users, 1);
        assert_eq!(report.heartbeats, 21);
        assert_eq!(env.engine.db().count_heartbeats(Some(&user.id)).unwrap(), 21);
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), summaries);
    }

    #[test]
    fn summaries_go_too_unless_kept() {
        let env = setup(1, false, false);
        let user = env.user("alice", "UTC");
        env.session(&user, "2024-01-10T09:00:00Z", 10, "old");
        env.engine.aggregator().run(utc("2024-01-11T00:00:00Z"), &[]).unwrap();
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), 1);

        let report = env.engine.housekeeping().run(utc("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(report.summaries, 1);
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), 0);
    }

    #[test]
    fn dry_run_and_exclusion_keep_data() {
        let env = setup(1, true, false);
        let user = env.user("alice", "UTC");
        env.session(&user, "2024-01-10T09:00:00Z", 10, "old");
        let report = env.engine.housekeeping().run(utc("2024-03-01T12:00:00Z")).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.heartbeats, 21);
        assert_eq!(env.engine.db().count_heartbeats(Some(&user.id)).unwrap(), 21);

        let env = setup(1, false, false);
        let mut user = env.user("bob", "UTC");
        user.exclude_from_retention = true;
        env.engine.update_user(&user).unwrap();
        env.session(&user, "2024-01-10T09:00:00Z", 10, "old");
        let report = env.engine.housekeeping().run(utc("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(report.users, 0);
        assert_eq!(env.engine.db().count_heartbeats(Some(&user.id)).unwrap(), 21);
    }

    #[test]
    fn non_positive_retention_keeps_everything() {
        let env = setup(0, false, false);
        let user = env.user("alice", "UTC");
        env.session(&user, "2020-01-10T09:00:00Z", 10, "old");
        let report = env.engine.housekeeping().run(utc("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(report, CleanupReport::default());
        assert_eq!(env.engine.db().count_heartbeats(Some(&user.id)).unwrap(), 21);
    }
}
