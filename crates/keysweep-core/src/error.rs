//! Scan errors

use keysweep_filter::StoreError;
use thiserror::Error;

use crate::checkpoint::CheckpointError;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Invalid worker count: {0} (must be at least 1)")]
    InvalidWorkerCount(i64),
    #[error("{requested} workers requested but only {available} available; confirmation required")]
    WorkersNeedConfirmation { requested: usize, available: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("Worker {slot} failed: {message}")]
    Worker { slot: usize, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Worker protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}
