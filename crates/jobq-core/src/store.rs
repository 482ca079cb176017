//! The Store: the only component that touches persistent state (spec §4.1).
//!
//! Backed by SQLite through `sqlx`. The claim statement is the single place
//! where concurrent workers contend; every other mutation is a single
//! conditional `UPDATE` guarded by `claimed_by` (or `state = 'dlq'` for DLQ
//! retry), which is all the atomicity those operations need.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::config::DEFAULTS;
use crate::error::{JobqError, Result};
use crate::job::{Job, JobState, StateCounts, WorkerRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    command         TEXT NOT NULL,
    state           TEXT NOT NULL DEFAULT 'pending',
    attempts        INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 3,
    next_run_at     TEXT NOT NULL,
    claimed_by      TEXT,
    claimed_at      TEXT,
    lease_deadline  TEXT,
    last_error      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (state, next_run_at, id);
CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs (state);

CREATE TABLE IF NOT EXISTS workers (
    worker_id       TEXT PRIMARY KEY,
    pid             INTEGER NOT NULL,
    started_at      TEXT NOT NULL,
    last_heartbeat  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// A handle onto the embedded job database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite file at `path` with the
    /// pragmas a multi-connection job queue needs: WAL so readers don't
    /// block the poll loop's writers, a busy timeout so a losing `claim_one`
    /// blocks briefly rather than failing outright under contention.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(JobqError::Storage)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(StdDuration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests. Each call gets an isolated database.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        store.seed_defaults().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent schema creation, run by `jobq init`.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Seeds default config values, without overwriting any the operator
    /// has already set (`INSERT OR IGNORE`).
    pub async fn seed_defaults(&self) -> Result<()> {
        for (key, value) in DEFAULTS {
            sqlx::query("INSERT OR IGNORE INTO config (key, value) VALUES (?, ?)")
                .bind(*key)
                .bind(*value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // ---- Jobs ----------------------------------------------------------

    /// Inserts a `pending` row with `attempts = 0`, `next_run_at = now`.
    pub async fn enqueue(&self, command: &str, max_retries: i64) -> Result<i64> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (command, state, attempts, max_retries, next_run_at, created_at, updated_at)
            VALUES (?, 'pending', 0, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(command)
        .bind(max_retries)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        info!(job_id = id, %command, "enqueued job");
        Ok(id)
    }

    /// The central atomic primitive (spec §4.1). A single `UPDATE ...
    /// RETURNING` statement, guarded by a CTE selecting the lowest-`id`
    /// eligible row, wins or loses in one shot — no separate read-then-write
    /// race window exists for another connection to land in.
    ///
    /// Engines without `UPDATE ... RETURNING` (older SQLite, or a reference
    /// port against a bare DB-API cursor) must emulate this with a locked
    /// transaction instead: `BEGIN IMMEDIATE` to take the write lock up
    /// front, `SELECT ... LIMIT 1` for the candidate row, a conditional
    /// `UPDATE` on that specific id, then `COMMIT` — retrying the whole
    /// transaction if the engine reports a write conflict. The single
    /// statement used here is equivalent but atomic by construction rather
    /// than by lock discipline.
    pub async fn claim_one(&self, worker_id: &str, now: DateTime<Utc>, lease_duration: StdDuration) -> Result<Option<Job>> {
        let lease_deadline = now + chrono::Duration::from_std(lease_duration).unwrap_or_default();

        let row = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id FROM jobs
                WHERE (state = 'pending' AND next_run_at <= ?)
                   OR (state = 'running' AND lease_deadline <= ?)
                ORDER BY next_run_at ASC, id ASC
                LIMIT 1
            )
            UPDATE jobs
            SET state = 'running',
                claimed_by = ?,
                claimed_at = ?,
                lease_deadline = ?,
                updated_at = ?
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id, command, state, attempts, max_retries, next_run_at,
                      claimed_by, claimed_at, lease_deadline, last_error,
                      created_at, updated_at
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(worker_id)
        .bind(now)
        .bind(lease_deadline)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let job = row.map(|r| row_to_job(&r));
        if let Some(job) = &job {
            debug!(job_id = job.id, worker_id, "claimed job");
        }
        Ok(job)
    }

    /// `running -> completed`, conditioned on `claimed_by = worker_id`.
    pub async fn settle_success(&self, job_id: i64, worker_id: &str) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_deadline = NULL,
                updated_at = ?
            WHERE id = ? AND claimed_by = ? AND state = 'running'
            "#,
        )
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.diagnose_settle_miss(job_id, worker_id).await?);
        }
        info!(job_id, worker_id, "job completed");
        Ok(())
    }

    /// `running -> pending` (retry) or `running -> dlq`, conditioned on
    /// `claimed_by = worker_id`. Increments `attempts` and sets
    /// `last_error` unconditionally.
    pub async fn settle_failure(
        &self,
        job_id: i64,
        worker_id: &str,
        error: &str,
        next_run_at: DateTime<Utc>,
        to_dlq: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let target_state = if to_dlq { "dlq" } else { "pending" };

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?,
                attempts = attempts + 1,
                next_run_at = ?,
                last_error = ?,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_deadline = NULL,
                updated_at = ?
            WHERE id = ? AND claimed_by = ? AND state = 'running'
            "#,
        )
        .bind(target_state)
        .bind(next_run_at)
        .bind(error)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.diagnose_settle_miss(job_id, worker_id).await?);
        }
        if to_dlq {
            warn!(job_id, worker_id, "job moved to dead-letter queue");
        } else {
            info!(job_id, worker_id, next_run_at = %next_run_at, "job scheduled for retry");
        }
        Ok(())
    }

    async fn diagnose_settle_miss(&self, job_id: i64, worker_id: &str) -> Result<JobqError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match exists {
            Some(_) => JobqError::LeaseStolen {
                job_id,
                worker_id: worker_id.to_string(),
            },
            None => JobqError::NotFound(job_id),
        })
    }

    /// Extends `lease_deadline` while execution is in progress. A no-op
    /// (not an error) if the claim has already been stolen.
    pub async fn heartbeat(&self, job_id: i64, worker_id: &str, new_deadline: DateTime<Utc>) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_deadline = ?, updated_at = ?
            WHERE id = ? AND claimed_by = ? AND state = 'running'
            "#,
        )
        .bind(new_deadline)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(job_id, worker_id, "heartbeat no-op, claim already stolen");
        }
        Ok(())
    }

    /// Counts grouped by state, for `jobq status`.
    pub async fn counts_by_state(&self) -> Result<StateCounts> {
        let rows = sqlx::query("SELECT state, COUNT(*) as n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StateCounts::default();
        for row in rows {
            let state: String = row.get("state");
            let n: i64 = row.get("n");
            match state.as_str() {
                "pending" => counts.pending = n,
                "running" => counts.running = n,
                "completed" => counts.completed = n,
                "dlq" => counts.dlq = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// `jobq queue list [--state S]`.
    pub async fn list(&self, state_filter: Option<JobState>) -> Result<Vec<Job>> {
        let rows = match state_filter {
            Some(state) => {
                sqlx::query(
                    "SELECT id, command, state, attempts, max_retries, next_run_at, claimed_by, \
                     claimed_at, lease_deadline, last_error, created_at, updated_at \
                     FROM jobs WHERE state = ? ORDER BY next_run_at ASC, id ASC",
                )
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, command, state, attempts, max_retries, next_run_at, claimed_by, \
                     claimed_at, lease_deadline, last_error, created_at, updated_at \
                     FROM jobs ORDER BY next_run_at ASC, id ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_job).collect())
    }

    // ---- DLQ -------------------------------------------------------------

    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        self.list(Some(JobState::Dlq)).await
    }

    /// `dlq -> pending`, resetting `attempts` and clearing the claim,
    /// conditioned on the row currently being in `dlq`.
    pub async fn dlq_retry(&self, job_id: i64) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending',
                attempts = 0,
                claimed_by = NULL,
                claimed_at = NULL,
                lease_deadline = NULL,
                next_run_at = ?,
                updated_at = ?
            WHERE id = ? AND state = 'dlq'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => JobqError::NotInDlq(job_id),
                None => JobqError::NotFound(job_id),
            });
        }
        info!(job_id, "job retried from dead-letter queue");
        Ok(())
    }

    // ---- Config ------------------------------------------------------------

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn config_all(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| (r.get("key"), r.get("value"))).collect())
    }

    // ---- Workers -----------------------------------------------------------

    /// Upsert: a worker restarted under a reused `worker_id` replaces its
    /// stale row rather than erroring (spec §9, worker identity reuse).
    pub async fn workers_register(&self, worker_id: &str, pid: i64) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO workers (worker_id, pid, started_at, last_heartbeat)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                pid = excluded.pid,
                started_at = excluded.started_at,
                last_heartbeat = excluded.last_heartbeat
            "#,
        )
        .bind(worker_id)
        .bind(pid)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        info!(worker_id, pid, "worker registered");
        Ok(())
    }

    pub async fn workers_unregister(&self, worker_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM workers WHERE worker_id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        info!(worker_id, "worker unregistered");
        Ok(())
    }

    pub async fn workers_list(&self) -> Result<Vec<WorkerRecord>> {
        let rows = sqlx::query("SELECT worker_id, pid, started_at, last_heartbeat FROM workers ORDER BY worker_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| WorkerRecord {
                worker_id: r.get("worker_id"),
                pid: r.get("pid"),
                started_at: r.get("started_at"),
                last_heartbeat: r.get("last_heartbeat"),
            })
            .collect())
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Job {
    let state: String = row.get("state");
    Job {
        id: row.get("id"),
        command: row.get("command"),
        state: JobState::from_str(&state).unwrap_or(JobState::Pending),
        attempts: row.get("attempts"),
        max_retries: row.get("max_retries"),
        next_run_at: row.get("next_run_at"),
        claimed_by: row.get("claimed_by"),
        claimed_at: row.get("claimed_at"),
        lease_deadline: row.get("lease_deadline"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
