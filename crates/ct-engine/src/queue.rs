//! Named, bounded job queues for background work.
//!
//! Each queue owns a fixed number of worker tasks. Jobs are blocking closures
//! (they talk to SQLite) and run on tokio's blocking thread pool.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::half_of_cpus;

/// Pending jobs per queue before dispatch starts rejecting.
pub const QUEUE_DEPTH: usize = 4096;

/// How long shutdown waits for running and queued jobs.
pub const DRAIN_DEADLINE: StdDuration = StdDuration::from_secs(2);

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueName {
    Default,
    Processing,
    Reports,
    Mail,
    Imports,
    Housekeeping,
}

impl QueueName {
    pub const ALL: [Self; 6] = [
        Self::Default,
        Self::Processing,
        Self::Reports,
        Self::Mail,
        Self::Imports,
        Self::Housekeeping,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "ct.default",
            Self::Processing => "ct.processing",
            Self::Reports => "ct.reports",
            Self::Mail => "ct.mail",
            Self::Imports => "ct.imports",
            Self::Housekeeping => "ct.housekeeping",
        }
    }

    pub fn default_workers(self) -> usize {
        match self {
            Self::Processing | Self::Housekeeping => half_of_cpus(),
            Self::Default | Self::Reports | Self::Mail | Self::Imports => 1,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    finished: AtomicU64,
}

/// Job counts of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    pub queue: &'static str,
    pub workers: usize,
    pub enqueued: u64,
    pub finished: u64,
}

struct Queue {
    sender: mpsc::Sender<Job>,
    workers: usize,
    counters: Arc<Counters>,
}

/// The set of named queues. Must be created inside a tokio runtime.
pub struct JobQueues {
    queues: BTreeMap<QueueName, Queue>,
    closing: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for JobQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueues")
            .field("metrics", &self.metrics())
            .finish_non_exhaustive()
    }
}

impl JobQueues {
    /// Starts every queue with its default worker count.
    pub fn start() -> Self {
        Self::with_workers(|name| name.default_workers())
    }

    pub fn with_workers(workers: impl Fn(QueueName) -> usize) -> Self {
        let closing = CancellationToken::new();
        let mut queues = BTreeMap::new();
        let mut handles = Vec::new();
        for name in QueueName::ALL {
            let count = workers(name).max(1);
            let (sender, receiver) = mpsc::channel::<Job>(QUEUE_DEPTH);
            let receiver = Arc::new(Mutex::new(receiver));
            let counters = Arc::new(Counters::default());
            for _ in 0..count {
                handles.push(tokio::spawn(run_worker(
                    name,
                    Arc::clone(&receiver),
                    Arc::clone(&counters),
                    closing.clone(),
                )));
            }
            tracing::debug!(queue = %name, workers = count, "started job queue");
            queues.insert(
                name,
                Queue {
                    sender,
                    workers: count,
                    counters,
                },
            );
        }
        Self {
            queues,
            closing,
            handles: std::sync::Mutex::new(handles),
        }
    }

    /// Enqueues a job. Returns `false` when the queue is full or shutting down.
    pub fn dispatch(&self, name: QueueName, job: impl FnOnce() + Send + 'static) -> bool {
        if self.closing.is_cancelled() {
            tracing::warn!(queue = %name, "rejecting job, queues are shutting down");
            return false;
        }
        let Some(queue) = self.queues.get(&name) else {
            return false;
        };
        match queue.sender.try_send(Box::new(job)) {
            Ok(()) => {
                queue.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                tracing::warn!(queue = %name, error = %err, "dropping job");
                false
            }
        }
    }

    pub fn metrics(&self) -> Vec<QueueMetrics> {
        self.queues
            .iter()
            .map(|(name, queue)| QueueMetrics {
                queue: name.as_str(),
                workers: queue.workers,
                enqueued: queue.counters.enqueued.load(Ordering::Relaxed),
                finished: queue.counters.finished.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Stops accepting jobs and waits up to `deadline` for queued and running
    /// jobs. Returns `false` if the deadline passed first.
    pub async fn shutdown(&self, deadline: StdDuration) -> bool {
        self.closing.cancel();
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let drained = tokio::time::timeout(deadline, async {
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "queue worker failed");
                }
            }
        })
        .await
        .is_ok();
        if !drained {
            tracing::warn!(deadline_ms = deadline.as_millis(), "job queues did not drain in time");
        }
        drained
    }
}

async fn run_worker(
    name: QueueName,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
    closing: CancellationToken,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                job = receiver.recv() => job,
                () = closing.cancelled() => receiver.try_recv().ok(),
            }
        };
        let Some(job) = job else {
            break;
        };
        if let Err(err) = tokio::task::spawn_blocking(job).await {
            tracing::error!(queue = %name, error = %err, "job panicked");
        }
        counters.finished.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(queue = %name, "queue worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_jobs_and_counts_them() {
        let queues = JobQueues::with_workers(|_| 2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            assert!(queues.dispatch(QueueName::Processing, move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(queues.shutdown(DRAIN_DEADLINE).await);
        assert_eq!(done.load(Ordering::SeqCst), 10);
        let processing = queues
            .metrics()
            .into_iter()
            .find(|m| m.queue == "ct.processing")
            .unwrap();
        assert_eq!((processing.enqueued, processing.finished), (10, 10));
    }

    #[tokio::test]
    async fn rejects_jobs_after_shutdown() {
        let queues = JobQueues::with_workers(|_| 1);
        assert!(queues.shutdown(DRAIN_DEADLINE).await);
        assert!(!queues.dispatch(QueueName::Default, || {}));
    }

    #[test]
    fn default_worker_counts() {
        assert_eq!(QueueName::Reports.default_workers(), 1);
        assert!(QueueName::Processing.default_workers() >= 1);
        assert_eq!(QueueName::Housekeeping.to_string(), "ct.housekeeping");
    }
}
