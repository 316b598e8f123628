//! Runtime settings for the engine services.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::TimeDelta;

use ct_core::{EntityType, Interval};

/// Languages assigned by extension for every user unless they override them.
pub const DEFAULT_LANGUAGE_MAPPINGS: &[(&str, &str)] = &[
    ("astro", "Astro"),
    ("cjs", "JavaScript"),
    ("ipynb", "Python"),
    ("jsx", "JSX"),
    ("mjs", "JavaScript"),
    ("svelte", "Svelte"),
    ("tsx", "TSX"),
    ("vue", "Vue"),
];

/// Settings shared by the engine services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub summary_cache_ttl: StdDuration,
    pub summary_cache_capacity: u64,
    /// Ingestion rejects heartbeats older than this when set.
    pub heartbeat_max_age: Option<TimeDelta>,
    /// Months of raw data to keep; zero or less keeps everything.
    pub data_retention_months: i32,
    pub data_cleanup_dry_run: bool,
    pub keep_summaries_on_cleanup: bool,
    pub leaderboard_enabled: bool,
    pub leaderboard_scope: Interval,
    /// Dimensions with their own ranking next to the general one.
    pub leaderboard_by: Vec<EntityType>,
    /// Server-wide extension to language rules.
    pub language_mappings: BTreeMap<String, String>,
    pub stream_batch_size: usize,
    /// Worker threads used by one aggregation run.
    pub aggregation_workers: usize,
    /// Minimum spacing of event-triggered duration regeneration per user.
    pub duration_regeneration_interval: StdDuration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            summary_cache_ttl: StdDuration::from_secs(30 * 60),
            summary_cache_capacity: 10_000,
            heartbeat_max_age: None,
            data_retention_months: -1,
            data_cleanup_dry_run: false,
            keep_summaries_on_cleanup: true,
            leaderboard_enabled: true,
            leaderboard_scope: Interval::Past7Days,
            leaderboard_by: vec![EntityType::Language],
            language_mappings: DEFAULT_LANGUAGE_MAPPINGS
                .iter()
                .map(|(extension, language)| ((*extension).to_string(), (*language).to_string()))
                .collect(),
            stream_batch_size: ct_db::DEFAULT_STREAM_BATCH_SIZE,
            aggregation_workers: half_of_cpus(),
            duration_regeneration_interval: StdDuration::from_secs(12 * 60 * 60),
        }
    }
}

/// Half the available CPUs, rounded up.
pub fn half_of_cpus() -> usize {
    num_cpus::get().div_ceil(2).max(1)
}
