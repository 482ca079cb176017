//! Spawns and tracks worker processes (spec §4.5).
//!
//! The teacher workspace has no analogous process-spawning concern — its
//! job machinery assumes an already-running async task — so this module is
//! grounded on the pack's own CLI conventions (dev-cli re-execs itself for
//! detached long-running subcommands) rather than on `seesaw-job-postgres`.
//!
//! `worker start --count N` re-execs the current binary N times as `jobq
//! worker run --worker-id <id>` detached children. The Supervisor itself
//! keeps no durable record of what it spawned: the `workers` table row each
//! child writes on boot is the durable record (spec §4.5, "does not
//! resurrect crashed workers automatically").

use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Spawns `count` detached `jobq worker run` children against `db_path`.
/// Returns the worker ids assigned, in spawn order.
pub fn spawn_workers(db_path: &str, count: u32) -> Result<Vec<String>> {
    let exe = std::env::current_exe().context("resolving current executable path")?;
    let mut worker_ids = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let worker_id = format!("{}-{}", hostname(), uuid::Uuid::new_v4());

        Command::new(&exe)
            .arg("--db")
            .arg(db_path)
            .arg("worker")
            .arg("run")
            .arg("--worker-id")
            .arg(&worker_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawning worker process {worker_id}"))?;

        worker_ids.push(worker_id);
    }

    Ok(worker_ids)
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
