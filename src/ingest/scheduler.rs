// src/ingest/scheduler.rs
//! Recurring job scheduler.
//!
//! Every job runs on its own tokio task: fire, wait `period` after the firing
//! completed, fire again. Cancellation is a `watch` message to the job task,
//! checked before each firing and raced against the wait, so an in-flight
//! firing always runs to completion.
//!
//! A firing begins when the job invokes its action. The job holds a read
//! borrow of the cancel flag from the check until the firing is spawned, and
//! cancelling writes the flag, so the two never interleave.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Identifies a job inside one [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

struct Job {
    id: JobId,
    label: String,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<Vec<Job>>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. The first firing happens right away; each following
    /// firing starts `period` after the previous one returned.
    ///
    /// Errors and panics of `action` are logged and the job keeps its schedule.
    /// `action` runs while the cancel flag is borrowed and must not call back
    /// into this scheduler before returning its future.
    pub fn schedule<F, Fut>(&self, label: impl Into<String>, period: Duration, action: F) -> JobId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        let (cancel, cancel_rx) = watch::channel(false);

        {
            let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
            jobs.push(Job {
                id,
                label: label.clone(),
                cancel,
            });
        }

        tokio::spawn(run_job(label, period, action, cancel_rx));
        id
    }

    /// Cancel a single job. Returns false if it was not registered.
    pub fn cancel(&self, id: JobId) -> bool {
        let job = {
            let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
            match jobs.iter().position(|j| j.id == id) {
                Some(pos) => jobs.swap_remove(pos),
                None => return false,
            }
        };
        job.cancel.send_replace(true);
        debug!(job = %job.label, "job cancelled");
        true
    }

    /// Cancel every registered job and return how many there were.
    ///
    /// Once this returns, no job registered before the call invokes its
    /// action again. Firings already in progress finish on their own.
    pub fn clear(&self) -> usize {
        let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        let n = jobs.len();
        for job in jobs.drain(..) {
            job.cancel.send_replace(true);
        }
        n
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("scheduler mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels of the registered jobs, in registration order.
    pub fn labels(&self) -> Vec<String> {
        let jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        jobs.iter().map(|j| j.label.clone()).collect()
    }
}

async fn run_job<F, Fut>(label: String, period: Duration, action: F, mut cancel: watch::Receiver<bool>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    loop {
        let firing = {
            let cancelled = cancel.borrow_and_update();
            if *cancelled {
                break;
            }
            tokio::spawn(action())
        };
        settle(&label, firing).await;

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = cancel.changed() => {
                // Sender gone means the scheduler itself was dropped.
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!(job = %label, "job stopped");
}

/// Wait for a firing spawned on its own task, so a panic stays inside it.
async fn settle(label: &str, firing: JoinHandle<anyhow::Result<()>>) {
    match firing.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            counter!("relay_job_failures_total").increment(1);
            warn!(job = %label, error = %format!("{e:#}"), "job firing failed");
        }
        Err(join) => {
            counter!("relay_job_failures_total").increment(1);
            error!(job = %label, error = %join, "job firing panicked");
        }
    }
}
