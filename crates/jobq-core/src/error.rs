//! Domain error taxonomy (spec §7).
//!
//! `ExecutionFailure` deliberately has no variant here: a non-zero exit or a
//! timeout is normal domain output carried in [`crate::executor::ExecutionResult`],
//! not a Rust error — it drives the retry state machine rather than propagating.
//!
//! `ClaimConflict` has no variant here either, for the same reason spec §7
//! gives it no propagation path: a losing `claim_one` simply returns
//! `Ok(None)` rather than an `Err`, and the worker loop's next poll tick
//! *is* the retry — there is nothing to catch and re-raise. A genuine
//! SQLite busy-timeout failure surfaces as `Storage`, which is fatal per
//! spec §7's `StorageError` kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobqError {
    /// A settle call (`settle_success`/`settle_failure`/`heartbeat`) found
    /// that `claimed_by` no longer matches the caller — the lease was
    /// reclaimed by another worker in the meantime.
    #[error("lease on job {job_id} no longer held by worker {worker_id}")]
    LeaseStolen { job_id: i64, worker_id: String },

    /// The job named in a DLQ retry or settle call does not exist.
    #[error("job {0} not found")]
    NotFound(i64),

    /// The job named in a DLQ retry is not currently in the `dlq` state.
    #[error("job {0} is not in the dead-letter queue")]
    NotInDlq(i64),

    /// Underlying storage engine failure. Fatal to the calling worker.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Malformed admin input that clap's parser can't express structurally
    /// (negative retry bounds, unknown config key, non-dlq retry target).
    #[error("invalid input: {0}")]
    Input(String),
}

pub type Result<T> = std::result::Result<T, JobqError>;
