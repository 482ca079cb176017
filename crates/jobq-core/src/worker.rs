//! Worker lifecycle and retry engine (spec §4.4).

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{WorkerTunables, STOP_FLAG_KEY};
use crate::error::{JobqError, Result};
use crate::executor::execute;
use crate::job::Job;
use crate::retry;
use crate::store::Store;

/// Mirrors the per-worker state machine from spec §4.4. Logged at each
/// transition and used directly by [`WorkerPhase::can_transition_to`] in
/// tests asserting the "no `Executing -> Exiting`" invariant; the worker
/// loop's own control flow is the actual state machine, this enum just
/// gives it a name to test against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Claiming,
    Executing,
    Settling,
    Exiting,
}

impl WorkerPhase {
    pub fn can_transition_to(self, next: WorkerPhase) -> bool {
        use WorkerPhase::{Claiming, Executing, Exiting, Idle, Settling};
        matches!(
            (self, next),
            (Idle, Claiming) | (Idle, Exiting) | (Claiming, Executing) | (Claiming, Idle) | (Executing, Settling) | (Settling, Idle)
        )
    }
}

/// A long-running actor identified by a stable `worker_id`.
pub struct Worker {
    store: Store,
    worker_id: String,
}

impl Worker {
    pub fn new(store: Store, worker_id: String) -> Self {
        Self { store, worker_id }
    }

    /// Register, poll-claim-execute-settle until the stop flag is observed
    /// or a storage error forces an exit, then unregister.
    pub async fn run(self) -> Result<()> {
        let pid = std::process::id() as i64;
        self.store.workers_register(&self.worker_id, pid).await?;
        info!(worker_id = %self.worker_id, pid, "worker started");

        let result = self.run_loop().await;

        if let Err(err) = &result {
            error!(worker_id = %self.worker_id, %err, "worker exiting due to storage error");
        }
        if let Err(unregister_err) = self.store.workers_unregister(&self.worker_id).await {
            warn!(worker_id = %self.worker_id, error = %unregister_err, "failed to unregister worker");
        }
        result
    }

    async fn run_loop(&self) -> Result<()> {
        loop {
            let stop_flag = self.store.config_get(STOP_FLAG_KEY).await?;
            if stop_flag.as_deref() == Some("1") {
                info!(worker_id = %self.worker_id, "stop flag observed, exiting");
                return Ok(());
            }

            let tunables = self.load_tunables().await?;
            let lease_duration = Duration::from_secs(tunables.lease_duration_seconds.max(1) as u64);

            let now = Utc::now();
            let claimed = self.store.claim_one(&self.worker_id, now, lease_duration).await?;

            let Some(job) = claimed else {
                tokio::time::sleep(Duration::from_millis(tunables.poll_interval_ms)).await;
                continue;
            };

            self.execute_and_settle(job, &tunables, lease_duration).await?;
        }
    }

    async fn load_tunables(&self) -> Result<WorkerTunables> {
        let rows = self.store.config_all().await?;
        Ok(WorkerTunables::from_rows(&rows))
    }

    async fn execute_and_settle(&self, job: Job, tunables: &WorkerTunables, lease_duration: Duration) -> Result<()> {
        let safety_margin = Duration::from_secs(1).min(lease_duration / 10);
        let exec_timeout = Duration::from_secs(tunables.exec_timeout_seconds).min(lease_duration.saturating_sub(safety_margin));

        let heartbeat = spawn_heartbeat_ticker(self.store.clone(), self.worker_id.clone(), job.id, lease_duration);

        debug!(job_id = job.id, worker_id = %self.worker_id, "executing job");
        let result = execute(&job.command, exec_timeout).await;
        heartbeat.abort();

        if result.succeeded() {
            match self.store.settle_success(job.id, &self.worker_id).await {
                Ok(()) => {}
                Err(JobqError::LeaseStolen { job_id, worker_id }) => {
                    warn!(job_id, worker_id, "settle_success rejected, lease was reclaimed");
                }
                Err(err) => return Err(err),
            }
            return Ok(());
        }

        let attempts = job.attempts + 1;
        let decision = retry::decide(
            Utc::now(),
            attempts,
            job.max_retries,
            tunables.base_backoff_seconds,
            tunables.max_backoff_seconds,
        );

        match self
            .store
            .settle_failure(job.id, &self.worker_id, &result.diagnostic(), decision.next_run_at, decision.to_dlq)
            .await
        {
            Ok(()) => {}
            Err(JobqError::LeaseStolen { job_id, worker_id }) => {
                warn!(job_id, worker_id, "settle_failure rejected, lease was reclaimed");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

/// Spawns the background heartbeat ticker for a job's lease, firing roughly
/// every third of the lease duration (spec §4.4). Aborted (not polled via a
/// flag) when the executor's future resolves.
fn spawn_heartbeat_ticker(store: Store, worker_id: String, job_id: i64, lease_duration: Duration) -> tokio::task::JoinHandle<()> {
    let period = (lease_duration / 3).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            let new_deadline = Utc::now() + chrono::Duration::from_std(lease_duration).unwrap_or_default();
            if let Err(err) = store.heartbeat(job_id, &worker_id, new_deadline).await {
                warn!(job_id, %worker_id, %err, "heartbeat failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_forbids_executing_to_exiting() {
        assert!(!WorkerPhase::Executing.can_transition_to(WorkerPhase::Exiting));
    }

    #[test]
    fn state_machine_allows_idle_to_exiting() {
        assert!(WorkerPhase::Idle.can_transition_to(WorkerPhase::Exiting));
    }

    #[test]
    fn state_machine_allows_the_happy_cycle() {
        assert!(WorkerPhase::Idle.can_transition_to(WorkerPhase::Claiming));
        assert!(WorkerPhase::Claiming.can_transition_to(WorkerPhase::Executing));
        assert!(WorkerPhase::Executing.can_transition_to(WorkerPhase::Settling));
        assert!(WorkerPhase::Settling.can_transition_to(WorkerPhase::Idle));
    }

    #[test]
    fn state_machine_forbids_skipping_claim() {
        assert!(!WorkerPhase::Idle.can_transition_to(WorkerPhase::Executing));
    }
}
