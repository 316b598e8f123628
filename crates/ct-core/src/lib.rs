//! Core domain logic for the coding-activity tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Ingestion: normalizing plugin payloads into heartbeats
//! - Durations: grouping heartbeats into contiguous work intervals
//! - Summaries: per-dimension totals, alias and label rewriting, filters
//! - Leaderboards and the v1-compatible view models

pub mod alias;
pub mod compat;
pub mod day;
pub mod duration;
pub mod entity;
pub mod filters;
pub mod heartbeat;
pub mod ingest;
pub mod interval;
pub mod language_mapping;
pub mod leaderboard;
pub mod project_label;
pub mod summary;
pub mod types;
pub mod user;
mod user_agent;

pub use alias::{Alias, AliasResolver};
pub use duration::{Duration, DurationBuilder, Granularity, build_durations};
pub use entity::{EntityType, UNKNOWN_KEY};
pub use filters::Filters;
pub use heartbeat::{Heartbeat, HeartbeatType};
pub use ingest::{HeartbeatPayload, IngestContext, IngestReport, ItemStatus};
pub use interval::{Interval, parse_date_time};
pub use language_mapping::{LanguageMapping, LanguageRules};
pub use leaderboard::{LeaderboardItem, RankedItem};
pub use project_label::{ProjectLabel, ProjectLabels};
pub use summary::{Summary, SummaryItem};
pub use types::{UserId, ValidationError};
pub use user::User;
pub use user_agent::{ParsedUserAgent, parse_user_agent};
