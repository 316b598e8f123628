//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Self-hosted coding-activity tracker.
///
/// Stores heartbeats sent by editor plugins and turns them into durations,
/// daily summaries and leaderboards.
#[derive(Debug, Parser)]
#[command(name = "ct", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the background schedulers until interrupted.
    Serve,

    /// Manage users.
    #[command(subcommand)]
    User(UserAction),

    /// Ingest a JSON array of heartbeats from stdin.
    Ingest {
        /// User the heartbeats belong to.
        #[arg(long)]
        user: String,

        /// User agent applied to heartbeats that carry none.
        #[arg(long)]
        user_agent: Option<String>,

        /// Machine name applied to heartbeats that carry none.
        #[arg(long)]
        machine: Option<String>,
    },

    /// Show a summary for a user.
    Summary(SummaryArgs),

    /// Persist summaries for finished days.
    Aggregate {
        /// Restrict to these users.
        #[arg(long)]
        user: Vec<String>,
    },

    /// Delete data older than the retention window.
    Cleanup {
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate or show leaderboards.
    #[command(subcommand)]
    Leaderboard(LeaderboardAction),

    /// Manage aliases.
    #[command(subcommand)]
    Alias(AliasAction),

    /// Manage project labels.
    #[command(subcommand)]
    Label(LabelAction),

    /// Manage language mappings.
    #[command(subcommand)]
    Mapping(MappingAction),

    /// Manage stored durations.
    #[command(subcommand)]
    Durations(DurationsAction),

    /// Show database status.
    Status,
}

/// User preference flags shared by `user add` and `user update`.
#[derive(Debug, Args)]
pub struct UserPrefs {
    /// IANA time zone, e.g. Europe/Berlin.
    #[arg(long)]
    pub tz: Option<String>,

    /// First day of the week, e.g. mon or sun.
    #[arg(long)]
    pub week_start: Option<String>,

    /// Idle gap in seconds that still joins heartbeats.
    #[arg(long)]
    pub timeout: Option<i64>,

    /// List the user on public leaderboards.
    #[arg(long)]
    pub public: Option<bool>,

    /// Allow badge requests for the user.
    #[arg(long)]
    pub share_badges: Option<bool>,

    /// Keep the user's data regardless of retention.
    #[arg(long)]
    pub exclude_from_retention: Option<bool>,
}

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create a user.
    Add {
        id: String,
        #[command(flatten)]
        prefs: UserPrefs,
    },
    /// List users.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Change a user's preferences.
    Update {
        id: String,
        #[command(flatten)]
        prefs: UserPrefs,
    },
    /// Delete a user and all their data.
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[arg(long)]
    pub user: String,

    /// Named interval such as today, week, 7_days or any.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub interval: Option<String>,

    /// Start, as RFC 3339 or YYYY-MM-DD[ HH:MM:SS] in the user's zone.
    #[arg(long)]
    pub from: Option<String>,

    /// End, exclusive. Defaults to now.
    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub project: Vec<String>,
    #[arg(long)]
    pub language: Vec<String>,
    #[arg(long)]
    pub editor: Vec<String>,
    #[arg(long)]
    pub operating_system: Vec<String>,
    #[arg(long)]
    pub machine: Vec<String>,
    #[arg(long)]
    pub label: Vec<String>,
    #[arg(long)]
    pub branch: Vec<String>,
    #[arg(long)]
    pub entity: Vec<String>,
    #[arg(long)]
    pub category: Vec<String>,

    /// Recompute from heartbeats instead of using stored data.
    #[arg(long)]
    pub recompute: bool,

    /// Print the v1-compatible per-day summaries document.
    #[arg(long, conflicts_with = "json")]
    pub compat: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum LeaderboardAction {
    /// Rebuild the leaderboard snapshot now.
    Generate,
    /// Show one page of a ranking.
    Show {
        /// Interval of the snapshot; defaults to the configured scope.
        #[arg(long)]
        interval: Option<String>,
        /// Dimension of an aggregated ranking, e.g. language.
        #[arg(long)]
        by: Option<String>,
        /// Key within the dimension, e.g. Rust.
        #[arg(long, requires = "by")]
        key: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = ct_core::leaderboard::DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Append this user's row when off the page.
        #[arg(long)]
        user: Option<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum AliasAction {
    /// Map VALUE to KEY for one dimension.
    Add {
        #[arg(long)]
        user: String,
        /// Dimension, e.g. project or language.
        #[arg(long = "type")]
        entity_type: String,
        key: String,
        value: String,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Delete {
        #[arg(long)]
        user: String,
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum LabelAction {
    /// Attach LABEL to PROJECT.
    Add {
        #[arg(long)]
        user: String,
        project: String,
        label: String,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Delete {
        #[arg(long)]
        user: String,
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum MappingAction {
    /// Assign LANGUAGE to files ending in EXTENSION.
    Add {
        #[arg(long)]
        user: String,
        extension: String,
        language: String,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Delete {
        #[arg(long)]
        user: String,
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum DurationsAction {
    /// Rebuild stored durations.
    Regenerate {
        /// Restrict to these users.
        #[arg(long)]
        user: Vec<String>,
        /// Rebuild the whole history instead of only the tail.
        #[arg(long)]
        force: bool,
    },
}
