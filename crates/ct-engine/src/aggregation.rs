//! Materialization of finished days into stored summaries.
//!
//! A run picks up every user where their last stored summary ends (or at the
//! local midnight before their first heartbeat) and persists one summary per
//! local day up to the start of today. Days in progress are never stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use ct_core::{Filters, Summary, User, UserId, day};
use ct_db::Database;

use crate::error::EngineError;
use crate::summary::SummaryEngine;

/// Days computed per pass, bounding the durations held in memory.
const DAYS_PER_CHUNK: usize = 30;

/// Key under which a user's first heartbeat time is recorded.
pub fn first_heartbeat_key(user_id: &UserId) -> String {
    format!("first_heartbeat_{user_id}")
}

/// Outcome of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub users: usize,
    pub summaries: usize,
    pub failed: usize,
    /// Set when another run was in progress and this one did nothing.
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    db: Database,
    summaries: SummaryEngine,
    workers: usize,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Aggregator {
    pub fn new(db: Database, summaries: SummaryEngine, workers: usize) -> Self {
        Self {
            db,
            summaries,
            workers: workers.max(1),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Aggregates the given users, or everyone when `user_ids` is empty.
    pub fn run(
        &self,
        now: DateTime<Utc>,
        user_ids: &[UserId],
    ) -> Result<AggregationReport, EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("aggregation already running, skipping");
            return Ok(AggregationReport {
                skipped: true,
                ..AggregationReport::default()
            });
        }
        let _guard = RunGuard(&self.running);

        let users: Vec<User> = self
            .db
            .list_users()?
            .into_iter()
            .filter(|user| user_ids.is_empty() || user_ids.contains(&user.id))
            .collect();
        let ids: Vec<UserId> = users.iter().map(|user| user.id.clone()).collect();
        let last_ends: HashMap<UserId, DateTime<Utc>> =
            self.db.last_summary_ends()?.into_iter().collect();
        let firsts: HashMap<UserId, DateTime<Utc>> = self
            .db
            .heartbeat_bounds(&ids)?
            .into_iter()
            .map(|bounds| (bounds.user_id, bounds.first))
            .collect();

        let mut jobs = Vec::new();
        for user in &users {
            let Some(first) = firsts.get(&user.id) else {
                tracing::debug!(user = %user.id, "no heartbeats, nothing to aggregate");
                continue;
            };
            if let Err(err) = self
                .db
                .put_key_value_if_absent(&first_heartbeat_key(&user.id), &first.to_rfc3339())
            {
                tracing::warn!(user = %user.id, error = %err, "failed to record first heartbeat");
            }
            let from = last_ends
                .get(&user.id)
                .copied()
                .unwrap_or_else(|| day::begin_of_day(*first, user.time_zone));
            let to = day::begin_of_today(now, user.time_zone);
            if from < to {
                jobs.push((user, from, to));
            }
        }

        tracing::info!(
            users = users.len(),
            pending = jobs.len(),
            workers = self.workers,
            "aggregating summaries"
        );
        let work = || {
            jobs.par_iter()
                .map(|(user, from, to)| (user, self.aggregate_user(user, *from, *to)))
                .collect::<Vec<_>>()
        };
        let results = match ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("ct-aggregate-{index}"))
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "failed to build aggregation pool, using the global one"
                );
                work()
            }
        };

        let mut report = AggregationReport {
            users: users.len(),
            ..AggregationReport::default()
        };
        for (user, result) in results {
            match result {
                Ok(count) => report.summaries += count,
                Err(err) => {
                    tracing::error!(user = %user.id, error = %err, "aggregation failed");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            summaries = report.summaries,
            failed = report.failed,
            "aggregation finished"
        );
        Ok(report)
    }

    /// Stores one summary per local day in `[from, to)`. Days without
    /// activity are stored empty so later runs start after them.
    fn aggregate_user(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let days = day::split_by_days(from, to, user.time_zone);
        let mut stored = 0;
        for chunk in days.chunks(DAYS_PER_CHUNK) {
            let (Some((chunk_from, _)), Some((_, chunk_to))) = (chunk.first(), chunk.last()) else {
                continue;
            };
            let cancel = CancellationToken::new();
            let mut computed: HashMap<DateTime<Utc>, Summary> = self
                .summaries
                .summarize_days(user, *chunk_from, *chunk_to, &Filters::new(), false, &cancel)?
                .into_iter()
                .map(|summary| (summary.from, summary))
                .collect();
            for (day_from, day_to) in chunk {
                let summary = computed
                    .remove(day_from)
                    .unwrap_or_else(|| Summary::new(user.id.clone(), *day_from, *day_to));
                match self.db.insert_summary(&summary) {
                    Ok(_) => stored += 1,
                    Err(err) => match EngineError::from(err) {
                        EngineError::Conflict(message) => {
                            tracing::warn!(
                                user = %user.id,
                                day = %day_from,
                                %message,
                                "summary already stored"
                            );
                        }
                        other => return Err(other),
                    },
                }
            }
        }
        tracing::debug!(user = %user.id, days = days.len(), stored, "aggregated user");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use ct_core::EntityType;

    use super::*;
    use crate::summary::{SummaryOptions, SummaryRequest};
    use crate::test_support::{TestEnv, utc};

    #[test]
    fn stores_finished_days_once() {
        let env = TestEnv::new();
        let user = env.user("alice", "UTC");
        env.session(&user, "2024-01-15T09:00:00Z", 30, "ct");
        env.session(&user, "2024-01-17T09:00:00Z", 20, "ct");
        env.session(&user, "2024-01-18T09:00:00Z", 10, "ct");
        let aggregator = env.engine.aggregator();
        let now = utc("2024-01-18T12:00:00Z");

        let report = aggregator.run(now, &[]).unwrap();
        assert_eq!(report.summaries, 3);
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), 3);
        assert!(
            env.engine
                .db()
                .get_key_value(&first_heartbeat_key(&user.id))
                .unwrap()
                .is_some()
        );

        let again = aggregator.run(now, &[]).unwrap();
        assert_eq!(again.summaries, 0);
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), 3);
    }

    #[test]
    fn stored_days_add_up_to_a_fresh_computation() {
        let env = TestEnv::new();
        let user = env.user("alice", "Europe/Berlin");
        env.session(&user, "2024-01-14T22:30:00Z", 60, "ct");
        env.session(&user, "2024-01-15T09:00:00Z", 30, "blog");
        env.session(&user, "2024-01-16T20:00:00Z", 45, "ct");
        env.engine.aggregator().run(utc("2024-01-17T12:00:00Z"), &[]).unwrap();

        let request = SummaryRequest::new(
            user.clone(),
            utc("2024-01-14T10:00:00Z"),
            utc("2024-01-17T12:00:00Z"),
        );
        let cancel = CancellationToken::new();
        let options = SummaryOptions {
            use_cache: false,
            ..SummaryOptions::default()
        };
        let stored = env.engine.summaries().generate(&request, options, &cancel).unwrap();
        let fresh = env
            .engine
            .summaries()
            .generate(&request.clone().recompute(true), options, &cancel)
            .unwrap();

        assert_eq!(stored.total_by(EntityType::Project), 135 * 60 * 1000);
        for entity_type in EntityType::ALL {
            assert_eq!(stored.items(entity_type), fresh.items(entity_type), "{entity_type}");
        }
        assert_eq!(stored.num_heartbeats, fresh.num_heartbeats);
    }

    #[test]
    fn users_without_heartbeats_are_skipped() {
        let env = TestEnv::new();
        let user = env.user("alice", "UTC");
        let report = env.engine.aggregator().run(utc("2024-01-18T12:00:00Z"), &[]).unwrap();
        assert_eq!((report.users, report.summaries), (1, 0));
        assert_eq!(env.engine.db().count_summaries(&user.id).unwrap(), 0);
    }

    #[test]
    fn restricted_to_requested_users() {
        let env = TestEnv::new();
        let alice = env.user("alice", "UTC");
        let bob = env.user("bob", "UTC");
        env.session(&alice, "2024-01-15T09:00:00Z", 30, "ct");
        env.session(&bob, "2024-01-15T09:00:00Z", 30, "ct");

        let report = env
            .engine
            .aggregator()
            .run(utc("2024-01-16T12:00:00Z"), std::slice::from_ref(&bob.id))
            .unwrap();
        assert_eq!(report.users, 1);
        assert_eq!(env.engine.db().count_summaries(&alice.id).unwrap(), 0);
        assert_eq!(env.engine.db().count_summaries(&bob.id).unwrap(), 1);
    }
}
