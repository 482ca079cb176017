//! Argument parsing for the `jobq` binary (spec §4.7, §6).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jobq")]
#[command(about = "A durable local job queue")]
#[command(version)]
pub struct Cli {
    /// Path to the SQLite database file.
    ///
    /// Resolution order: this flag, then `JOBQ_DB_PATH`, then `./jobq.db`
    /// (spec §6, "Added: jobq init --db").
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Increase log verbosity (-v = debug, -vv = trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the schema and seed default config.
    Init,

    /// Job queue operations.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Print counts per job state plus the active worker count.
    Status,

    /// Dead-letter queue operations.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Worker process management.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Read or write a config entry.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// Enqueue a shell command.
    Add {
        /// The shell command to run.
        command: String,

        /// Override `default_max_retries` for this job.
        #[arg(long)]
        max_retries: Option<i64>,
    },

    /// List jobs, optionally filtered by state.
    List {
        /// Restrict to a single state (pending, running, completed, dlq).
        #[arg(long)]
        state: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DlqAction {
    /// List jobs currently quarantined in the dead-letter queue.
    List,

    /// Re-enqueue a dead-lettered job: `dlq -> pending`, `attempts` reset.
    Retry {
        /// Job id.
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Spawn worker processes.
    Start {
        /// Number of worker processes to spawn.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Set the `workers.stop` flag; returns immediately, does not wait.
    Stop,

    /// Print registered worker records.
    List,

    /// Internal: run a single worker loop in the current process.
    ///
    /// Not intended for interactive use; this is the subcommand `worker
    /// start` re-execs as a detached child (spec §4.5).
    #[command(hide = true)]
    Run {
        #[arg(long)]
        worker_id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the value of a config key.
    Get {
        key: String,
    },

    /// Set a config key to a value.
    Set {
        key: String,
        value: String,
    },
}
