//! `jobq-core` — the durable local job queue's engine: the atomic claim
//! protocol, the worker lifecycle and retry engine, and the SQLite-backed
//! storage schema that makes both correct under concurrency.
//!
//! This crate owns no process-spawning or argument-parsing concerns; those
//! live in the `jobq-cli` binary crate, which is the only consumer of the
//! types exported here.

pub mod config;
pub mod error;
pub mod executor;
pub mod job;
mod process_group;
pub mod retry;
pub mod store;
pub mod worker;

pub use error::{JobqError, Result};
pub use job::{Job, JobState, StateCounts, WorkerRecord};
pub use store::Store;
pub use worker::Worker;
