//! Bounded worker pool shared by the hashing and storing phases.
//!
//! The queue is filled with every job before any worker starts and is closed
//! right after, so workers stop when it drains. Each worker counts its own
//! failures and stops pulling work once it goes over its error budget; the
//! rest of the queue is still served by the other workers. The pool returns
//! only after every worker has finished.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Implemented by per-job results so workers can count their failures
pub trait Outcome {
    fn is_failure(&self) -> bool;
}

/// Everything one worker did
#[derive(Debug)]
pub struct WorkerReport<O> {
    pub worker: usize,
    pub outcomes: Vec<O>,
    pub errors: usize,
    /// Stopped because its error budget was exceeded
    pub gave_up: bool,
}

/// Combined view of all workers after the join
#[derive(Debug)]
pub struct PoolReport<O> {
    pub workers: Vec<WorkerReport<O>>,
    /// Workers that panicked; their in-flight job has no outcome
    pub crashed: usize,
}

impl<O> PoolReport<O> {
    pub fn errors(&self) -> usize {
        self.workers.iter().map(|w| w.errors).sum()
    }

    pub fn gave_up(&self) -> usize {
        self.workers.iter().filter(|w| w.gave_up).count()
    }

    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.outcomes.len()).sum()
    }

    pub fn into_outcomes(self) -> impl Iterator<Item = O> {
        self.workers.into_iter().flat_map(|w| w.outcomes)
    }
}

/// Pool sizing for one phase
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub phase: &'static str,
    pub workers: usize,
    pub error_budget: usize,
}

/// Run `work` over every job with `settings.workers` concurrent workers.
pub async fn run<J, O, F, Fut>(settings: PoolSettings, jobs: Vec<J>, work: F) -> PoolReport<O>
where
    J: Send + 'static,
    O: Outcome + Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let (tx, rx) = async_channel::bounded(jobs.len().max(1));
    for job in jobs {
        // capacity matches the job count, this never waits
        if tx.send(job).await.is_err() {
            break;
        }
    }
    tx.close();

    let work = Arc::new(work);
    let mut handles = Vec::with_capacity(settings.workers);

    for worker in 0..settings.workers.max(1) {
        let rx = rx.clone();
        let work = Arc::clone(&work);

        handles.push(tokio::spawn(async move {
            let mut report = WorkerReport {
                worker,
                outcomes: Vec::new(),
                errors: 0,
                gave_up: false,
            };

            while let Ok(job) = rx.recv().await {
                let outcome = work(job).await;
                if outcome.is_failure() {
                    report.errors += 1;
                }
                report.outcomes.push(outcome);

                if report.errors > settings.error_budget {
                    warn!(
                        "{} worker {} exceeded max error count ({}), shutting it down",
                        settings.phase, worker, settings.error_budget
                    );
                    report.gave_up = true;
                    break;
                }

                if report.outcomes.len() % 100 == 0 {
                    debug!(
                        "{} worker {} has processed {} files",
                        settings.phase,
                        worker,
                        report.outcomes.len()
                    );
                }
            }

            report
        }));
    }

    let mut workers = Vec::with_capacity(handles.len());
    let mut crashed = 0;
    for handle in handles {
        match handle.await {
            Ok(report) => workers.push(report),
            Err(e) => {
                crashed += 1;
                error!("{} worker task failed: {}", settings.phase, e);
            }
        }
    }

    if !rx.is_empty() {
        warn!(
            "{} left {} files unprocessed after all workers stopped",
            settings.phase,
            rx.len()
        );
    }

    PoolReport { workers, crashed }
}
