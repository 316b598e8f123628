//! CLI subcommand implementations.

pub mod ingest;
pub mod jobs;
pub mod leaderboard;
pub mod rules;
pub mod serve;
pub mod status;
pub mod summary;
pub mod user;
pub mod util;
