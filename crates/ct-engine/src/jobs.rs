//! Background runner: cron-triggered jobs and event reactions.
//!
//! Schedules only enqueue work; the heavy lifting happens on the named job
//! queues so a slow aggregation never delays the next timer.

use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::Event;
use crate::queue::{DRAIN_DEADLINE, JobQueues, QueueMetrics, QueueName};
use crate::schedule;

/// Cron expressions for the scheduled jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedules {
    pub aggregation: String,
    /// Semicolon-separated.
    pub leaderboard: String,
    pub cleanup: String,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            aggregation: "0 15 02 * * *".to_string(),
            leaderboard: "0 0 6 * * *;0 0 18 * * *".to_string(),
            cleanup: "0 0 6 * * Sun".to_string(),
        }
    }
}

struct Parsed {
    aggregation: Schedule,
    leaderboard: Vec<Schedule>,
    cleanup: Schedule,
}

impl Schedules {
    fn parse(&self) -> Result<Parsed, EngineError> {
        Ok(Parsed {
            aggregation: schedule::parse(&self.aggregation)?,
            leaderboard: schedule::parse_list(&self.leaderboard)?,
            cleanup: schedule::parse(&self.cleanup)?,
        })
    }
}

/// Owns the queues and timers of a running server.
pub struct BackgroundRunner {
    engine: Engine,
    queues: Arc<JobQueues>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for BackgroundRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRunner")
            .field("queues", &self.queues)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl BackgroundRunner {
    /// Starts queues, timers and the event listener. Must be called inside a
    /// tokio runtime. Fails before starting anything if a schedule is invalid.
    pub fn start(engine: Engine, schedules: &Schedules) -> Result<Self, EngineError> {
        let parsed = schedules.parse()?;
        let queues = Arc::new(JobQueues::start());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(schedule::spawn(
            "aggregation",
            parsed.aggregation,
            cancel.clone(),
            enqueue(&engine, &queues, QueueName::Processing, |engine| {
                if let Err(err) = engine.aggregator().run(Utc::now(), &[]) {
                    tracing::error!(error = %err, "aggregation failed");
                }
            }),
        ));

        if engine.leaderboard().enabled() {
            for expression in parsed.leaderboard {
                tasks.push(schedule::spawn(
                    "leaderboard",
                    expression,
                    cancel.clone(),
                    enqueue(&engine, &queues, QueueName::Default, |engine| {
                        if let Err(err) = engine.leaderboard().generate(Utc::now()) {
                            tracing::error!(error = %err, "leaderboard generation failed");
                        }
                    }),
                ));
            }
        }

        if engine.housekeeping().retention_enabled() {
            tasks.push(schedule::spawn(
                "cleanup",
                parsed.cleanup,
                cancel.clone(),
                enqueue(&engine, &queues, QueueName::Housekeeping, |engine| {
                    if let Err(err) = engine.housekeeping().run(Utc::now()) {
                        tracing::error!(error = %err, "data cleanup failed");
                    }
                }),
            ));
        } else {
            tracing::info!("data retention disabled, cleanup not scheduled");
        }

        let receiver = engine.events().subscribe();
        tasks.push(tokio::spawn(listen(
            engine.clone(),
            receiver,
            Arc::clone(&queues),
            cancel.clone(),
        )));
        tracing::info!(tasks = tasks.len(), "background jobs started");
        Ok(Self {
            engine,
            queues,
            cancel,
            tasks,
        })
    }

    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn metrics(&self) -> Vec<QueueMetrics> {
        self.queues.metrics()
    }

    /// Enqueues an aggregation run right away.
    pub fn trigger_aggregation(&self) -> bool {
        let engine = self.engine.clone();
        self.queues.dispatch(QueueName::Processing, move || {
            if let Err(err) = engine.aggregator().run(Utc::now(), &[]) {
                tracing::error!(error = %err, "aggregation failed");
            }
        })
    }

    /// Stops the timers and listener, then drains the queues. Returns
    /// `false` if queued work was still running at the deadline.
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "background task failed");
            }
        }
        self.queues.shutdown(DRAIN_DEADLINE).await
    }
}

/// A timer callback that hands `job` to a queue.
fn enqueue(
    engine: &Engine,
    queues: &Arc<JobQueues>,
    queue: QueueName,
    job: fn(&Engine),
) -> impl Fn() + Send + Sync + 'static {
    let engine = engine.clone();
    let queues = Arc::clone(queues);
    move || {
        let engine = engine.clone();
        if !queues.dispatch(queue, move || job(&engine)) {
            tracing::warn!(queue = %queue, "scheduled job not enqueued");
        }
    }
}

async fn listen(
    engine: Engine,
    mut receiver: broadcast::Receiver<Event>,
    queues: Arc<JobQueues>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };
        match event {
            Ok(event) => handle(&engine, &queues, event),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event listener lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("event listener stopped");
}

fn handle(engine: &Engine, queues: &JobQueues, event: Event) {
    match event {
        Event::HeartbeatsCreated { user, count, earliest } => {
            let durations = engine.durations();
            if !durations.claim_regeneration(&user.id) {
                tracing::trace!(
                    user = %user.id,
                    count,
                    %earliest,
                    "duration regeneration already scheduled"
                );
                return;
            }
            let user_id = user.id.clone();
            let worker = engine.clone();
            let dispatched = queues.dispatch(QueueName::Processing, move || {
                if let Err(err) = worker.durations().regenerate(&user, false, Utc::now()) {
                    tracing::error!(user = %user.id, error = %err, "duration regeneration failed");
                }
            });
            if !dispatched {
                tracing::warn!(user = %user_id, "duration regeneration not enqueued");
                durations.release_regeneration(&user_id);
            }
        }
        Event::UserUpdated(user) => {
            let user_id = user.id.clone();
            let worker = engine.clone();
            let dispatched = queues.dispatch(QueueName::Default, move || {
                if let Err(err) = worker.leaderboard().sync_user(&user, Utc::now()) {
                    tracing::error!(user = %user.id, error = %err, "leaderboard sync failed");
                }
            });
            if !dispatched {
                tracing::warn!(user = %user_id, "leaderboard sync not enqueued");
            }
        }
    }
}
