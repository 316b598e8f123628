use std::io;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ct_cli::commands::leaderboard::ShowOptions;
use ct_cli::commands::util::open_engine;
use ct_cli::commands::{ingest, jobs, leaderboard, rules, serve, status, summary, user};
use ct_cli::{Cli, Commands, Config, DurationsAction, LeaderboardAction, UserAction};

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    if let Commands::Cleanup { dry_run: true } = command {
        config.app.data_cleanup_dry_run = true;
    }
    let engine = open_engine(&config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let now = Utc::now();

    match command {
        Commands::Serve => serve::run(engine, &config.schedules())?,
        Commands::User(action) => match action {
            UserAction::Add { id, prefs } => user::add(&mut out, &engine, id, prefs)?,
            UserAction::List { json } => user::list(&mut out, &engine, *json)?,
            UserAction::Update { id, prefs } => user::update(&mut out, &engine, id, prefs)?,
            UserAction::Delete { id } => user::delete(&mut out, &engine, id)?,
        },
        Commands::Ingest {
            user,
            user_agent,
            machine,
        } => ingest::run(
            io::stdin().lock(),
            &mut out,
            &engine,
            user,
            user_agent.as_deref(),
            machine.as_deref(),
        )?,
        Commands::Summary(args) => summary::run(&mut out, &engine, args, now)?,
        Commands::Aggregate { user } => jobs::aggregate(&mut out, &engine, user, now)?,
        Commands::Cleanup { .. } => jobs::cleanup(&mut out, &engine, now)?,
        Commands::Leaderboard(action) => match action {
            LeaderboardAction::Generate => leaderboard::generate(&mut out, &engine, now)?,
            LeaderboardAction::Show {
                interval,
                by,
                key,
                page,
                page_size,
                user,
                json,
            } => leaderboard::show(
                &mut out,
                &engine,
                &ShowOptions {
                    interval: interval.as_deref(),
                    by: by.as_deref(),
                    key: key.as_deref(),
                    page: *page,
                    page_size: *page_size,
                    user: user.as_deref(),
                    json: *json,
                },
            )?,
        },
        Commands::Alias(action) => rules::alias(&mut out, &engine, action)?,
        Commands::Label(action) => rules::label(&mut out, &engine, action)?,
        Commands::Mapping(action) => rules::mapping(&mut out, &engine, action)?,
        Commands::Durations(DurationsAction::Regenerate { user, force }) => {
            jobs::regenerate_durations(&mut out, &engine, user, *force, now)?;
        }
        Commands::Status => status::run(&mut out, &engine, &config.database_path)?,
    }

    Ok(())
}
