//! Duration retrieval and materialization.
//!
//! Durations are built live from the heartbeat stream. Coarse durations are
//! also materialized per user so reads can start from the stored rows and only
//! build the tail that came in since the last regeneration.

use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeDelta, Utc};
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;

use ct_core::{Duration, DurationBuilder, Filters, Granularity, User, UserId};
use ct_db::Database;

use crate::error::EngineError;

#[derive(Clone)]
pub struct DurationService {
    db: Database,
    batch_size: usize,
    /// Users with a regeneration scheduled inside the current interval.
    recent_regenerations: Cache<UserId, ()>,
}

impl std::fmt::Debug for DurationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationService")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl DurationService {
    pub fn new(db: Database, batch_size: usize, regeneration_interval: StdDuration) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            recent_regenerations: Cache::builder().time_to_live(regeneration_interval).build(),
        }
    }

    /// Durations of a user reaching into `[from, to)`, in start order.
    ///
    /// Heartbeats up to one timeout before `from` and after `to` are taken
    /// into account so that durations crossing either edge come out whole;
    /// callers clip them. Stored durations are used for coarse reads unless
    /// `skip_cache` is set or they were built with a different timeout.
    pub fn get(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Duration>, EngineError> {
        let timeout = user.heartbeats_timeout();
        if granularity == Granularity::Coarse && !skip_cache {
            let stored = self.db.durations_overlapping(&user.id, from - timeout, to)?;
            if !stored.is_empty() && stored.iter().all(|d| d.timeout == timeout) {
                let stored_end = stored.iter().map(Duration::end).max().unwrap_or(from);
                if stored_end >= to + timeout {
                    return Ok(stored);
                }
                let tail_from = stored_end + TimeDelta::milliseconds(1);
                let tail = self.live(user, tail_from, to + timeout, granularity, cancel)?;
                return Ok(stitch(stored, tail, timeout));
            }
            if !stored.is_empty() {
                tracing::debug!(
                    user = %user.id,
                    "stored durations use another timeout, building live"
                );
            }
        }
        self.live(user, from - timeout, to + timeout, granularity, cancel)
    }

    /// Builds durations from the heartbeats in `[from, to)`.
    pub fn live(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<Vec<Duration>, EngineError> {
        let mut builder = DurationBuilder::new(user.heartbeats_timeout(), granularity);
        let mut durations = Vec::new();
        let no_filters = Filters::new();
        for batch in self
            .db
            .stream_heartbeats(&user.id, from, to, &no_filters, self.batch_size)
        {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            durations.extend(batch?.iter().filter_map(|heartbeat| builder.push(heartbeat)));
        }
        durations.extend(builder.finish());
        Ok(durations)
    }

    /// Rebuilds the user's stored durations.
    ///
    /// Without `force` only the latest stored duration and everything after it
    /// is rebuilt; with `force` the whole history is.
    pub fn regenerate(
        &self,
        user: &User,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let from = if force {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            self.db
                .latest_duration(&user.id)?
                .map_or(DateTime::<Utc>::UNIX_EPOCH, |latest| latest.time)
        };
        let durations = self.live(user, from, now, Granularity::Coarse, &CancellationToken::new())?;
        let stored = self.db.replace_durations_from(&user.id, from, &durations)?;
        tracing::info!(
            user = %user.id,
            force,
            from = %from,
            count = stored,
            "regenerated durations"
        );
        Ok(stored)
    }

    /// Claims the user's regeneration slot. Returns `false` if a regeneration
    /// was already claimed within the interval.
    pub fn claim_regeneration(&self, user_id: &UserId) -> bool {
        self.recent_regenerations
            .entry(user_id.clone())
            .or_insert(())
            .is_fresh()
    }

    /// Gives a claimed slot back so the next heartbeats can claim it again.
    pub fn release_regeneration(&self, user_id: &UserId) {
        self.recent_regenerations.invalidate(user_id);
    }
}

/// Joins stored durations with freshly built ones that follow them. The seam
/// is merged when it continues the last stored run.
fn stitch(mut stored: Vec<Duration>, tail: Vec<Duration>, timeout: TimeDelta) -> Vec<Duration> {
    let mut tail = tail.into_iter();
    let Some(first) = tail.next() else {
        return stored;
    };
    match stored.last_mut() {
        Some(last) if last.group_hash == first.group_hash && first.time - last.end() <= timeout => {
            let gap = (first.time - last.end()).max(TimeDelta::zero());
            last.length += gap + first.length;
            last.num_heartbeats += first.num_heartbeats;
        }
        _ => stored.push(first),
    }
    stored.extend(tail);
    stored
}

#[cfg(test)]
mod tests {
    use ct_core::Heartbeat;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_705_300_000 + secs, 0).unwrap()
    }

    fn setup() -> (DurationService, Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = User::new(UserId::new("alice").unwrap(), t(0));
        db.insert_user(&user).unwrap();
        let service = DurationService::new(db.clone(), 2, StdDuration::from_secs(3600));
        (service, db, user)
    }

    fn ingest(db: &Database, user: &User, beats: &[(i64, &str)]) {
        let heartbeats: Vec<Heartbeat> = beats
            .iter()
            .map(|(secs, project)| {
                let entity = format!("{project}/main.rs");
                let mut heartbeat = Heartbeat::new(user.id.clone(), t(*secs), entity);
                heartbeat.project = (*project).to_string();
                heartbeat.rehash();
                heartbeat
            })
            .collect();
        db.insert_heartbeats(&heartbeats).unwrap();
    }

    fn shape(durations: &[Duration]) -> Vec<(i64, i64, i64)> {
        durations
            .iter()
            .map(|d| {
                let offset = d.time.timestamp() - t(0).timestamp();
                (offset, d.length.num_seconds(), d.num_heartbeats)
            })
            .collect()
    }

    #[test]
    fn basic_durations_from_store() {
        let (service, db, user) = setup();
        ingest(&db, &user, &[(0, "a"), (60, "a"), (120, "a"), (900, "a")]);

        let durations = service
            .get(&user, t(0), t(3600), Granularity::Coarse, true, &CancellationToken::new())
            .unwrap();
        assert_eq!(shape(&durations), vec![(0, 120, 3), (900, 0, 1)]);
    }

    #[test]
    fn attribute_change_splits_durations() {
        let (service, db, user) = setup();
        ingest(&db, &user, &[(0, "A"), (60, "B"), (120, "A")]);

        let durations = service
            .get(&user, t(0), t(3600), Granularity::Coarse, true, &CancellationToken::new())
            .unwrap();
        assert_eq!(shape(&durations), vec![(0, 0, 1), (60, 0, 1), (120, 0, 1)]);
    }

    #[test]
    fn stored_durations_are_extended_with_live_tail() {
        let (service, db, user) = setup();
        ingest(&db, &user, &[(0, "a"), (60, "a")]);
        service.regenerate(&user, false, t(100)).unwrap();
        ingest(&db, &user, &[(120, "a"), (2000, "a")]);

        let cancel = CancellationToken::new();
        let cached = service
            .get(&user, t(0), t(3600), Granularity::Coarse, false, &cancel)
            .unwrap();
        let live = service.get(&user, t(0), t(3600), Granularity::Coarse, true, &cancel).unwrap();
        assert_eq!(shape(&cached), vec![(0, 120, 3), (2000, 0, 1)]);
        assert_eq!(shape(&cached), shape(&live));
    }

    #[test]
    fn regenerate_rebuilds_from_latest() {
        let (service, db, user) = setup();
        ingest(&db, &user, &[(0, "a"), (60, "a")]);
        assert_eq!(service.regenerate(&user, false, t(100)).unwrap(), 1);
        ingest(&db, &user, &[(120, "a"), (2000, "a")]);
        service.regenerate(&user, false, t(3000)).unwrap();
        assert_eq!(db.count_durations(&user.id).unwrap(), 2);

        assert_eq!(service.regenerate(&user, true, t(3000)).unwrap(), 2);
        assert_eq!(db.count_durations(&user.id).unwrap(), 2);
    }

    #[test]
    fn stored_rows_with_other_timeout_are_ignored() {
        let (service, db, mut user) = setup();
        ingest(&db, &user, &[(0, "a"), (400, "a")]);
        service.regenerate(&user, true, t(1000)).unwrap();

        user.heartbeats_timeout_secs = 300;
        let durations = service
            .get(&user, t(0), t(1000), Granularity::Coarse, false, &CancellationToken::new())
            .unwrap();
        assert_eq!(shape(&durations), vec![(0, 0, 1), (400, 0, 1)]);
    }

    #[test]
    fn cancelled_reads_fail() {
        let (service, db, user) = setup();
        ingest(&db, &user, &[(0, "a"), (60, "a")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .get(&user, t(0), t(3600), Granularity::Coarse, true, &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn regeneration_is_claimed_once_per_interval() {
        let (service, _, user) = setup();
        assert!(service.claim_regeneration(&user.id));
        assert!(!service.claim_regeneration(&user.id));
        service.release_regeneration(&user.id);
        assert!(service.claim_regeneration(&user.id));
    }
}
