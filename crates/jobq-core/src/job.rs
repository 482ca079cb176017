//! Job and worker record types (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent state of a job row.
///
/// `Failed` is never written to the `state` column — it exists only as a
/// label the retry policy reasons about in memory between an execution
/// result and the settle call that follows it. A failed execution always
/// lands the row back in `Pending` (retry) or `Dlq` (exhausted), never in
/// `Failed` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Dlq,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dlq => "dlq",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dlq" => Ok(Self::Dlq),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work, as stored in the `jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub next_run_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_deadline: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row in the `workers` table (spec §3, "Worker record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub pid: i64,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Counts grouped by [`JobState`], used by `jobq status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub dlq: i64,
}
