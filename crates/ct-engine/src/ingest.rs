//! Heartbeat ingestion.

use chrono::{DateTime, TimeDelta, Utc};

use ct_core::ingest::normalize;
use ct_core::{Heartbeat, HeartbeatPayload, IngestContext, IngestReport, ItemStatus, User};
use ct_db::Database;

use crate::aggregation::first_heartbeat_key;
use crate::cache::SummaryCache;
use crate::error::EngineError;
use crate::events::{Event, EventBus};
use crate::rules::RuleService;

/// Where a batch came from. Header values fill in for fields the payloads
/// leave out.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSource<'a> {
    pub user_agent: Option<&'a str>,
    pub machine_name: Option<&'a str>,
    pub origin: &'a str,
}

#[derive(Debug, Clone)]
pub struct IngestService {
    db: Database,
    rules: RuleService,
    events: EventBus,
    cache: SummaryCache,
    max_age: Option<TimeDelta>,
}

impl IngestService {
    pub const fn new(
        db: Database,
        rules: RuleService,
        events: EventBus,
        cache: SummaryCache,
        max_age: Option<TimeDelta>,
    ) -> Self {
        Self {
            db,
            rules,
            events,
            cache,
            max_age,
        }
    }

    /// Validates and stores a batch. Invalid items are reported, not fatal;
    /// replays of stored heartbeats are reported as skipped.
    pub fn ingest(
        &self,
        user: &User,
        payloads: &[HeartbeatPayload],
        source: IngestSource<'_>,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, EngineError> {
        let rules = self.rules.language_rules(&user.id)?;
        let ctx = IngestContext {
            user_id: &user.id,
            now,
            user_agent: source.user_agent,
            machine_name: source.machine_name,
            max_age: self.max_age,
            origin: source.origin,
            rules: &rules,
        };

        let mut statuses: Vec<Option<ItemStatus>> = Vec::with_capacity(payloads.len());
        let mut valid: Vec<Heartbeat> = Vec::new();
        for payload in payloads {
            match normalize(payload, &ctx) {
                Ok(heartbeat) => {
                    valid.push(heartbeat);
                    statuses.push(None);
                }
                Err(err) => {
                    tracing::debug!(user = %user.id, error = %err, "rejected heartbeat");
                    statuses.push(Some(ItemStatus::rejected(&err)));
                }
            }
        }

        let inserted = self.db.insert_heartbeats(&valid)?;
        let mut outcomes = inserted.iter();
        let responses = statuses
            .into_iter()
            .map(|status| {
                status.unwrap_or_else(|| match outcomes.next() {
                    Some(true) => ItemStatus::created(),
                    _ => ItemStatus::duplicate(),
                })
            })
            .collect();
        let report = IngestReport { responses };

        let created = report.inserted();
        let earliest = valid
            .iter()
            .zip(&inserted)
            .filter(|(_, stored)| **stored)
            .map(|(heartbeat, _)| heartbeat.time)
            .min();
        if let Some(earliest) = earliest {
            self.db
                .put_key_value_if_absent(&first_heartbeat_key(&user.id), &earliest.to_rfc3339())?;
            self.invalidate_from(user, earliest)?;
            self.events.publish(Event::HeartbeatsCreated {
                user: user.clone(),
                count: created,
                earliest,
            });
        }
        tracing::debug!(
            user = %user.id,
            created,
            skipped = report.skipped(),
            rejected = report.rejected(),
            "ingested heartbeats"
        );
        Ok(report)
    }

    /// Drops the stored durations and day summaries a heartbeat at `earliest`
    /// can change. Both are rebuilt from heartbeats on the next read.
    fn invalidate_from(&self, user: &User, earliest: DateTime<Utc>) -> Result<(), EngineError> {
        let durations = match self.db.latest_duration(&user.id)? {
            Some(latest) if earliest <= latest.end() => self
                .db
                .delete_durations_ending_after(&user.id, earliest - user.heartbeats_timeout())?,
            _ => 0,
        };
        let summaries = self.db.delete_summaries_by_user_ending_after(&user.id, earliest)?;
        if durations + summaries > 0 {
            self.cache.invalidate_user(&user.id);
            tracing::info!(
                user = %user.id,
                earliest = %earliest,
                durations,
                summaries,
                "late heartbeats invalidated stored data"
            );
        }
        Ok(())
    }
}
