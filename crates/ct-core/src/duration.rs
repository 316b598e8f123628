//! Durations: contiguous runs of heartbeats with matching attributes.
//!
//! The builder is pure and streaming. Heartbeats are pushed in time order and
//! closed durations come out as soon as they can no longer grow, so callers can
//! feed it batch by batch without holding the full heartbeat history.

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::entity::EntityType;
use crate::heartbeat::Heartbeat;
use crate::types::UserId;

/// Whether durations are split per file or only per project-level attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Granularity {
    /// Entity is ignored when grouping.
    #[default]
    Coarse,
    /// Entity participates in the group hash.
    PerEntity,
}

/// A maximal run of heartbeats sharing one attribute tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duration {
    pub user_id: UserId,
    pub time: DateTime<Utc>,
    pub length: TimeDelta,
    /// Timeout the duration was built with.
    pub timeout: TimeDelta,
    pub project: String,
    pub language: String,
    pub editor: String,
    pub operating_system: String,
    pub machine: String,
    pub category: String,
    pub branch: String,
    /// Empty when built with [`Granularity::Coarse`].
    pub entity: String,
    pub num_heartbeats: i64,
    pub group_hash: String,
}

impl Duration {
    /// Opens a zero-length duration at the heartbeat.
    pub fn from_heartbeat(
        heartbeat: &Heartbeat,
        timeout: TimeDelta,
        granularity: Granularity,
    ) -> Self {
        let entity = match granularity {
            Granularity::PerEntity => heartbeat.entity.clone(),
            Granularity::Coarse => String::new(),
        };
        let mut duration = Self {
            user_id: heartbeat.user_id.clone(),
            time: heartbeat.time,
            length: TimeDelta::zero(),
            timeout,
            project: heartbeat.project.clone(),
            language: heartbeat.language.clone(),
            editor: heartbeat.editor.clone(),
            operating_system: heartbeat.operating_system.clone(),
            machine: heartbeat.machine.clone(),
            category: heartbeat.category.clone(),
            branch: heartbeat.branch.clone(),
            entity,
            num_heartbeats: 1,
            group_hash: String::new(),
        };
        duration.group_hash = duration.compute_group_hash();
        duration
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.time + self.length
    }

    /// Raw attribute value for a native dimension.
    pub fn value(&self, entity_type: EntityType) -> &str {
        match entity_type {
            EntityType::Project => &self.project,
            EntityType::Language => &self.language,
            EntityType::Editor => &self.editor,
            EntityType::OperatingSystem => &self.operating_system,
            EntityType::Machine => &self.machine,
            EntityType::Branch => &self.branch,
            EntityType::Entity => &self.entity,
            EntityType::Category => &self.category,
            EntityType::Label => "",
        }
    }

    /// Hash of the grouping attributes. An empty entity contributes nothing, so
    /// coarse durations hash the same regardless of the files they touched.
    pub fn compute_group_hash(&self) -> String {
        let content = [
            self.project.as_str(),
            &self.language,
            &self.editor,
            &self.operating_system,
            &self.machine,
            &self.category,
            &self.branch,
            &self.entity,
        ]
        .join("\u{1f}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
    }

    /// Portion of this duration that falls inside `[from, to)`.
    ///
    /// A zero-length duration is kept when its instant lies inside the range.
    pub fn clip(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        let start = self.time.max(from);
        let end = self.end().min(to);
        let keep = if self.length.is_zero() {
            self.time >= from && self.time < to
        } else {
            start < end
        };
        if !keep {
            return None;
        }
        let mut clipped = self.clone();
        clipped.time = start;
        clipped.length = end - start;
        Some(clipped)
    }
}

/// Streaming duration builder for one user's time-ordered heartbeats.
#[derive(Debug)]
pub struct DurationBuilder {
    timeout: TimeDelta,
    granularity: Granularity,
    current: Option<Duration>,
}

impl DurationBuilder {
    pub const fn new(timeout: TimeDelta, granularity: Granularity) -> Self {
        Self {
            timeout,
            granularity,
            current: None,
        }
    }

    /// Feeds the next heartbeat. Returns the previous duration if this
    /// heartbeat closed it.
    pub fn push(&mut self, heartbeat: &Heartbeat) -> Option<Duration> {
        let next = Duration::from_heartbeat(heartbeat, self.timeout, self.granularity);
        let Some(current) = self.current.as_mut() else {
            self.current = Some(next);
            return None;
        };

        let gap = heartbeat.time - current.end();
        if gap > self.timeout || current.group_hash != next.group_hash {
            return self.current.replace(next);
        }

        // Out-of-order input never shrinks a duration.
        if gap > TimeDelta::zero() {
            current.length += gap;
        }
        current.num_heartbeats += 1;
        None
    }

    /// Closes and returns the open duration, if any.
    pub fn finish(&mut self) -> Option<Duration> {
        self.current.take()
    }
}

/// Builds all durations for a time-ordered heartbeat sequence.
pub fn build_durations<'a>(
    heartbeats: impl IntoIterator<Item = &'a Heartbeat>,
    timeout: TimeDelta,
    granularity: Granularity,
) -> Vec<Duration> {
    let mut builder = DurationBuilder::new(timeout, granularity);
    let mut durations: Vec<Duration> = heartbeats
        .into_iter()
        .filter_map(|heartbeat| builder.push(heartbeat))
        .collect();
    durations.extend(builder.finish());
    durations
}
