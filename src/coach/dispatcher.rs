//! Dispatcher loop
//!
//! Pulls due jobs from the scheduler and runs them. Between sweeps it sleeps
//! until the next due time (capped by `sweep_interval_secs`) or until a new
//! job is scheduled.

use super::Coach;
use crate::scheduler::{DueJob, JobKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Jobs run concurrently within one sweep.
const SWEEP_CONCURRENCY: usize = 8;

impl Coach {
    /// Run every job due now. Returns how many were taken from the queue.
    pub async fn sweep(&self) -> usize {
        let jobs = self.scheduler.take_due(self.clock.now_ms()).await;
        let count = jobs.len();
        if count > 0 {
            tracing::debug!("Dispatcher: {} job(s) due", count);
        }

        futures::stream::iter(jobs)
            .for_each_concurrent(SWEEP_CONCURRENCY, |job| self.run_job(job))
            .await;
        count
    }

    async fn run_job(&self, job: DueJob) {
        match job.key.kind {
            JobKind::Program => self.run_program(&job.key.contact).await,
            JobKind::Nudge(stage) => self.run_nudge(&job.key.contact, stage).await,
        }
    }

    /// How long to sleep before the next sweep.
    async fn idle_for(&self) -> Duration {
        let cap = Duration::from_secs(self.config.sweep_interval_secs);
        match self.scheduler.next_due().await {
            Some(due_at) => {
                let wait_ms = (due_at - self.clock.now_ms()).max(0) as u64;
                Duration::from_millis(wait_ms).min(cap)
            }
            None => cap,
        }
    }

    /// Dispatcher task. Returns when `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            "Dispatcher: started (sweep every {}s at most)",
            self.config.sweep_interval_secs
        );

        loop {
            self.sweep().await;
            let idle = self.idle_for().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(idle) => {}
                _ = self.scheduler.changed() => {}
            }
        }

        tracing::info!("Dispatcher: stopped");
    }
}
