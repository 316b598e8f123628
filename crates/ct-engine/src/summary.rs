//! Summary generation.
//!
//! Every read path goes through [`SummaryEngine::generate`]. Unfiltered
//! requests reuse the day summaries written by the aggregation scheduler and
//! compute only the days around and between them; filtered requests compute
//! the whole range from durations. Computed parts are always split at the
//! user's local midnights, so a range summed from stored days and one
//! computed fresh agree.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ct_core::summary::summarize_ranges;
use ct_core::{Duration, EntityType, Filters, Granularity, Summary, User, day};
use ct_db::Database;

use crate::cache::{SummaryCache, SummaryKey};
use crate::durations::DurationService;
use crate::error::EngineError;
use crate::rules::RuleService;

/// What to summarize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub user: User,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub filters: Filters,
    /// Recompute from heartbeats, bypassing stored days, stored durations
    /// and the in-process cache.
    pub skip_cache: bool,
}

impl SummaryRequest {
    pub fn new(user: User, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            user,
            from,
            to,
            filters: Filters::new(),
            skip_cache: false,
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub const fn recompute(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }
}

/// Post-processing switches. Filtered requests always run without the cache
/// and without alias rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    pub apply_aliases: bool,
    pub apply_project_labels: bool,
    pub use_cache: bool,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            apply_aliases: true,
            apply_project_labels: true,
            use_cache: true,
        }
    }
}

impl SummaryOptions {
    fn fingerprint(self) -> String {
        format!(
            "aliases={};labels={}",
            u8::from(self.apply_aliases),
            u8::from(self.apply_project_labels)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SummaryEngine {
    db: Database,
    durations: DurationService,
    rules: RuleService,
    cache: SummaryCache,
}

impl SummaryEngine {
    pub const fn new(
        db: Database,
        durations: DurationService,
        rules: RuleService,
        cache: SummaryCache,
    ) -> Self {
        Self {
            db,
            durations,
            rules,
            cache,
        }
    }

    /// Summarizes `[from, to)` for one user.
    ///
    /// Item lists come back sorted by total descending, ties by key. A user
    /// without activity gets an empty summary, not an error.
    pub fn generate(
        &self,
        request: &SummaryRequest,
        options: SummaryOptions,
        cancel: &CancellationToken,
    ) -> Result<Summary, EngineError> {
        if request.from >= request.to {
            return Err(EngineError::InvalidRange {
                from: request.from,
                to: request.to,
            });
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let user = &request.user;
        let mut options = options;
        let filtered = !request.filters.is_empty();
        if filtered {
            options.use_cache = false;
            options.apply_aliases = false;
        }

        let key = SummaryKey {
            user_id: user.id.clone(),
            from: request.from,
            to: request.to,
            filters: request.filters.fingerprint(),
            options: options.fingerprint(),
        };
        if options.use_cache && !request.skip_cache {
            if let Some(hit) = self.cache.get(&key) {
                tracing::trace!(user = %user.id, "summary cache hit");
                return Ok(hit);
            }
        }

        let parts = if filtered {
            let filters = request
                .filters
                .with_project_labels(&self.rules.project_labels(&user.id)?)
                .with_aliases(&*self.rules.resolver(&user.id)?);
            let (from, to) = (request.from, request.to);
            self.summarize_days(user, from, to, &filters, request.skip_cache, cancel)?
        } else if request.skip_cache {
            self.summarize_days(user, request.from, request.to, &Filters::new(), true, cancel)?
        } else {
            self.retrieve(user, request.from, request.to, cancel)?
        };

        let mut summary = Summary::merge(user.id.clone(), request.from, request.to, parts);
        summary.fill_unknown();
        if options.apply_aliases {
            summary.apply_aliases(&*self.rules.resolver(&user.id)?);
        }
        if options.apply_project_labels {
            summary.apply_project_labels(&self.rules.project_labels(&user.id)?);
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if options.use_cache {
            self.cache.insert(key, &summary);
        }
        Ok(summary)
    }

    /// Unfiltered summary with default options.
    pub fn quick_summary(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Summary, EngineError> {
        self.generate(
            &SummaryRequest::new(user.clone(), from, to),
            SummaryOptions::default(),
            &CancellationToken::new(),
        )
    }

    /// Raw summaries of `[from, to)` computed from durations, one per local
    /// day or partial day that has activity. No aliases, labels or
    /// unknown-filling are applied.
    pub fn summarize_days(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filters: &Filters,
        skip_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Summary>, EngineError> {
        let granularity = if filters.wants_entities() {
            Granularity::PerEntity
        } else {
            Granularity::Coarse
        };
        let mut durations = self.durations.get(user, from, to, granularity, skip_cache, cancel)?;
        if !filters.is_empty() {
            durations.retain(|duration| filters.matches_duration(duration));
        }
        let (Some(first), Some(last)) = (
            durations.iter().map(|d| d.time).min(),
            durations.iter().map(Duration::end).max(),
        ) else {
            return Ok(Vec::new());
        };

        // Days without any duration reaching into them produce nothing.
        let ranges: Vec<_> = day::split_by_days(from, to, user.time_zone)
            .into_iter()
            .filter(|(start, end)| *end > first && *start <= last)
            .collect();

        let counts = ranges
            .iter()
            .map(|(start, end)| self.db.count_heartbeats_between(&user.id, *start, *end, filters))
            .collect::<Result<Vec<_>, _>>()?;

        let mut types = EntityType::PERSISTED.to_vec();
        if granularity == Granularity::PerEntity {
            types.push(EntityType::Entity);
        }
        tracing::debug!(
            user = %user.id,
            days = ranges.len(),
            durations = durations.len(),
            "summarizing from durations"
        );
        Ok(summarize_ranges(&user.id, &ranges, &counts, &durations, &types))
    }

    /// Stored day summaries inside the range plus computed summaries for
    /// everything they do not cover.
    fn retrieve(
        &self,
        user: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Summary>, EngineError> {
        let tz = user.time_zone;
        let stored: Vec<Summary> = self
            .db
            .summaries_within(&user.id, day::ceil_to_day(from, tz), day::begin_of_day(to, tz))?
            .into_iter()
            .filter(|s| day::is_day_aligned(s.from, tz) && day::is_day_aligned(s.to, tz))
            .collect();
        let (mut parts, missing) = missing_intervals(from, to, stored);
        tracing::debug!(
            user = %user.id,
            stored = parts.len(),
            missing = missing.len(),
            "retrieving summary"
        );
        for (start, end) in missing {
            parts.extend(self.summarize_days(user, start, end, &Filters::new(), false, cancel)?);
        }
        Ok(parts)
    }
}

/// Splits `[from, to)` into the stored summaries that tile it without
/// overlap and the uncovered intervals left between them.
fn missing_intervals(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    mut stored: Vec<Summary>,
) -> (Vec<Summary>, Vec<(DateTime<Utc>, DateTime<Utc>)>) {
    stored.sort_by_key(|s| (s.from, s.to));
    let mut kept = Vec::with_capacity(stored.len());
    let mut missing = Vec::new();
    let mut cursor = from;
    for summary in stored {
        if summary.from < cursor || summary.to > to {
            continue;
        }
        if summary.from > cursor {
            missing.push((cursor, summary.from));
        }
        cursor = summary.to;
        kept.push(summary);
    }
    if cursor < to {
        missing.push((cursor, to));
    }
    (kept, missing)
}
