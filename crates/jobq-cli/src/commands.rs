//! Dispatch from parsed [`crate::cli::Commands`] to `jobq-core` calls, plus
//! the output formatting for each verb (spec §4.7, §6).

use std::str::FromStr;

use anyhow::{bail, Result};
use jobq_core::{config as core_config, JobState, Store, Worker};

use crate::cli::{ConfigAction, DlqAction, QueueAction, WorkerAction};
use crate::{db, format, supervisor};

pub async fn init(db_path: Option<&str>) -> Result<()> {
    let store = db::connect(db_path).await?;
    store.init_schema().await?;
    store.seed_defaults().await?;
    println!("initialized {}", db::resolve_path(db_path));
    Ok(())
}

pub async fn queue(db_path: Option<&str>, action: QueueAction) -> Result<()> {
    let store = db::connect(db_path).await?;
    match action {
        QueueAction::Add { command, max_retries } => {
            let max_retries = match max_retries {
                Some(n) => n,
                None => default_max_retries(&store).await?,
            };
            let id = store.enqueue(&command, max_retries).await?;
            println!("Job {id} enqueued");
        }
        QueueAction::List { state } => {
            let filter = match state {
                Some(raw) => Some(JobState::from_str(&raw).map_err(anyhow::Error::msg)?),
                None => None,
            };
            let jobs = store.list(filter).await?;
            format::queue_table(&jobs);
        }
    }
    Ok(())
}

async fn default_max_retries(store: &Store) -> Result<i64> {
    let value = store.config_get("default_max_retries").await?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(3))
}

pub async fn status(db_path: Option<&str>) -> Result<()> {
    let store = db::connect(db_path).await?;
    let counts = store.counts_by_state().await?;
    let workers = store.workers_list().await?;
    println!("pending:   {}", counts.pending);
    println!("running:   {}", counts.running);
    println!("completed: {}", counts.completed);
    println!("dlq:       {}", counts.dlq);
    println!("workers:   {}", workers.len());
    Ok(())
}

pub async fn dlq(db_path: Option<&str>, action: DlqAction) -> Result<()> {
    let store = db::connect(db_path).await?;
    match action {
        DlqAction::List => {
            let jobs = store.dlq_list().await?;
            format::dlq_table(&jobs);
        }
        DlqAction::Retry { id } => {
            store.dlq_retry(id).await?;
            println!("Job {id} re-enqueued");
        }
    }
    Ok(())
}

pub async fn worker(db_path: Option<&str>, action: WorkerAction) -> Result<()> {
    let path = db::resolve_path(db_path);
    match action {
        WorkerAction::Start { count } => {
            let ids = supervisor::spawn_workers(&path, count)?;
            for id in &ids {
                println!("spawned worker {id}");
            }
        }
        WorkerAction::Stop => {
            let store = db::connect(Some(&path)).await?;
            store.config_set(core_config::STOP_FLAG_KEY, "1").await?;
            println!("stop flag set");
        }
        WorkerAction::List => {
            let store = db::connect(Some(&path)).await?;
            let workers = store.workers_list().await?;
            println!("{:<30} {:<10} {:<25} last_heartbeat", "worker_id", "pid", "started_at");
            for w in workers {
                println!(
                    "{:<30} {:<10} {:<25} {}",
                    w.worker_id,
                    w.pid,
                    w.started_at.to_rfc3339(),
                    w.last_heartbeat.to_rfc3339(),
                );
            }
        }
        WorkerAction::Run { worker_id } => {
            let store = db::connect(Some(&path)).await?;
            let worker = Worker::new(store, worker_id);
            worker.run().await?;
        }
    }
    Ok(())
}

pub async fn config(db_path: Option<&str>, action: ConfigAction) -> Result<()> {
    let store = db::connect(db_path).await?;
    match action {
        ConfigAction::Get { key } => match store.config_get(&key).await? {
            Some(value) => println!("{value}"),
            None => bail!("unknown config key: {key}"),
        },
        ConfigAction::Set { key, value } => {
            store.config_set(&key, &value).await?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}
