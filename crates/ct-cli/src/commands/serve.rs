//! Foreground daemon running the scheduled jobs.

use anyhow::{Context, Result};

use ct_engine::{BackgroundRunner, Engine, Schedules};

/// Runs aggregation, leaderboard and cleanup on their schedules until
/// interrupted. Finished days are aggregated once at startup.
pub fn run(engine: Engine, schedules: &Schedules) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ct-serve")
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async move {
        let runner = BackgroundRunner::start(engine, schedules)
            .context("failed to start background jobs")?;
        runner.trigger_aggregation();
        tracing::info!("serving, press Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::info!("shutting down");

        for metrics in runner.metrics() {
            tracing::debug!(
                queue = metrics.queue,
                enqueued = metrics.enqueued,
                finished = metrics.finished,
                "queue totals"
            );
        }
        if !runner.shutdown().await {
            tracing::warn!("some jobs were still running at shutdown");
        }
        Ok::<_, anyhow::Error>(())
    })
}
