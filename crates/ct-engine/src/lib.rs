//! Services on top of the storage layer.
//!
//! This crate wires the domain logic to the database:
//! - Summary generation from stored days, stored durations and live data
//! - Aggregation, retention cleanup and leaderboard snapshots
//! - Rule management with the per-user caches it invalidates
//! - Job queues, cron timers and the in-process event bus of a server
//!
//! Everything except [`jobs`] and [`queue`] is synchronous and meant to be
//! called from blocking contexts; the runner moves work onto tokio's blocking
//! pool.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod durations;
mod engine;
mod error;
pub mod events;
pub mod housekeeping;
pub mod ingest;
pub mod jobs;
pub mod leaderboard;
pub mod queue;
pub mod rules;
pub mod schedule;
pub mod summary;

#[cfg(test)]
mod test_support;

pub use aggregation::AggregationReport;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use events::{Event, EventBus};
pub use housekeeping::CleanupReport;
pub use ingest::IngestSource;
pub use jobs::{BackgroundRunner, Schedules};
pub use leaderboard::LeaderboardQuery;
pub use queue::{QueueMetrics, QueueName};
pub use summary::{SummaryOptions, SummaryRequest};
