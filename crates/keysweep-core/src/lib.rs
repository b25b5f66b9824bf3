//! KeySweep Core Engine
//!
//! Resumable, cancellable, parallel scanning of a key-space against a
//! two-tier membership filter.

pub mod cancel;
pub mod checkpoint;
pub mod cursor;
mod error;
pub mod monitor;
pub mod online;
pub mod probe;
pub mod process;
pub mod protocol;
pub mod results;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod worker;

pub use cancel::Cancellation;
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use cursor::{scan_cursor, CursorReader, CursorWriter};
pub use error::ScanError;
pub use monitor::{ProgressMonitor, ProgressReport, RateSampler};
pub use online::{ActivityCheck, HttpActivityChecker, NetworkError};
pub use probe::{Probe, ProbeMode, Verifier};
pub use process::{serve, ProcessRunners, WorkerCommand};
pub use results::{MatchReason, MatchResult, ResultLog};
pub use scheduler::{ScanOutcome, ScanReport, Scheduler};
pub use session::{available_workers, resolve_workers, PoolKind, ScanConfig, ScanSession, SearchRange};
pub use source::{PositionSource, RandomStream, SequentialRange};
pub use worker::{ChunkOutcome, ChunkRunner, LocalRunner, LocalRunners, RunnerFactory};

// Re-exports for convenience
pub use keysweep_filter::{BloomConfig, ImportOptions, ImportReport, MemoryStore, SqliteStore, TargetStore, TwoTierFilter, Verdict};
pub use keysweep_keys::{AddressType, Bitcoin, Candidate, CandidateSource, KeyError};
