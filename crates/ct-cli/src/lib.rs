//! Coding-activity tracker CLI library.
//!
//! This crate provides the `ct` command line and the configuration layer
//! shared by its subcommands.

mod cli;
pub mod commands;
mod config;

pub use cli::{
    AliasAction, Cli, Commands, DurationsAction, LabelAction, LeaderboardAction, MappingAction,
    SummaryArgs, UserAction, UserPrefs,
};
pub use config::Config;
