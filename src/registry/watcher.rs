// src/registry/watcher.rs
//! Keeps one poll job per eligible target of a feed kind.
//!
//! Any registry change rebuilds the whole job set: clear, then reschedule
//! every eligible target. Every target's next fire time resets.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tracing::{info, warn};

use super::store::TargetStore;
use super::ChangeSignal;
use crate::error::StoreError;
use crate::ingest::scheduler::Scheduler;
use crate::ingest::{ensure_metrics_described, Reconciler};
use crate::model::FeedKind;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(600);

pub struct RegistryWatcher {
    kind: FeedKind,
    store: Arc<dyn TargetStore>,
    scheduler: Scheduler,
    reconciler: Arc<Reconciler>,
    period: Duration,
}

impl RegistryWatcher {
    pub fn new(kind: FeedKind, store: Arc<dyn TargetStore>, reconciler: Reconciler) -> Self {
        Self {
            kind,
            store,
            scheduler: Scheduler::new(),
            reconciler: Arc::new(reconciler),
            period: DEFAULT_POLL_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Replace the job set with one job per eligible target of this kind.
    /// Returns the number of jobs scheduled.
    pub async fn rebuild(&self) -> Result<usize, StoreError> {
        ensure_metrics_described();
        // List before clearing so a store failure leaves the old jobs running.
        let targets = self.store.list().await?;
        let eligible: Vec<String> = targets
            .into_iter()
            .filter(|t| t.kind == self.kind && t.is_eligible())
            .map(|t| t.id)
            .collect();

        let cleared = self.scheduler.clear();
        for id in &eligible {
            let reconciler = self.reconciler.clone();
            let target_id = id.clone();
            self.scheduler.schedule(id.clone(), self.period, move || {
                let reconciler = reconciler.clone();
                let target_id = target_id.clone();
                async move {
                    reconciler.poll(&target_id).await?;
                    Ok::<(), anyhow::Error>(())
                }
            });
        }

        gauge!("relay_scheduled_jobs", "kind" => self.kind.as_str()).set(eligible.len() as f64);
        info!(
            kind = %self.kind,
            cleared,
            scheduled = eligible.len(),
            "poll jobs rebuilt"
        );
        Ok(eligible.len())
    }

    /// Rebuild on every change signal until the notifier goes away.
    pub async fn run(self, mut signal: ChangeSignal) {
        while signal.changed().await {
            if let Err(e) = self.rebuild().await {
                warn!(kind = %self.kind, error = %e, "rebuild failed, keeping previous jobs");
            }
        }
        let stopped = self.scheduler.clear();
        info!(kind = %self.kind, stopped, "registry watcher stopped");
    }
}
