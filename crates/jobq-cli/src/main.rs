//! `jobq`: the admin surface for the durable local job queue (spec §4.7,
//! §6). Translates command-line verbs into `jobq-core::Store` calls and
//! formats output; exits 0 on success, non-zero on argument or storage
//! errors.

mod cli;
mod commands;
mod db;
mod format;
mod supervisor;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("jobq: failed to start async runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("jobq: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = cli.db.as_deref();
    match cli.command {
        Commands::Init => commands::init(db_path).await,
        Commands::Queue { action } => commands::queue(db_path, action).await,
        Commands::Status => commands::status(db_path).await,
        Commands::Dlq { action } => commands::dlq(db_path, action).await,
        Commands::Worker { action } => commands::worker(db_path, action).await,
        Commands::Config { action } => commands::config(db_path, action).await,
    }
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
