//! Scan session parameters

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::error::ScanError;
use crate::source::{PositionSource, RandomStream, SequentialRange};

/// Positions per task for sequential scans
pub const SEQUENTIAL_CHUNK: u64 = 1024;
/// Candidates per task for random scans
pub const RANDOM_CHUNK: u64 = 1000;

/// The key-space a scan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRange {
    /// `[start, end)` in strictly increasing order
    Sequential { start: u128, end: u128 },
    /// Unbounded random stream
    Random,
}

impl SearchRange {
    pub fn sequential(start: u128, end: u128) -> Result<Self, ScanError> {
        if start > end {
            return Err(ScanError::InvalidRange(format!(
                "start {} is greater than end {}",
                start, end
            )));
        }
        Ok(SearchRange::Sequential { start, end })
    }

    /// Parse `"A-B"`; a single number `"A"` is the empty range `[A, A)`
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        let text = text.trim();
        let (start, end) = match text.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (text, text),
        };

        let parse = |part: &str| {
            part.parse::<u128>()
                .map_err(|_| ScanError::InvalidRange(format!("'{}' is not a valid position", part)))
        };
        Self::sequential(parse(start)?, parse(end)?)
    }

    /// Number of positions, `None` for random streams
    pub fn len(&self) -> Option<u128> {
        match self {
            SearchRange::Sequential { start, end } => Some(end - start),
            SearchRange::Random => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Display for SearchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchRange::Sequential { start, end } => write!(f, "[{}, {})", start, end),
            SearchRange::Random => write!(f, "random"),
        }
    }
}

/// Worker pool back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Threads,
    Processes,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Threads => write!(f, "threads"),
            PoolKind::Processes => write!(f, "processes"),
        }
    }
}

/// Parallel units available on this machine
pub fn available_workers() -> usize {
    num_cpus::get().max(1)
}

/// Apply the worker-count policy: default to every available unit, reject
/// zero or negative counts, require confirmation above `available`.
pub fn resolve_workers(
    requested: Option<i64>,
    available: usize,
    confirmed: bool,
) -> Result<usize, ScanError> {
    let Some(requested) = requested else {
        return Ok(available.max(1));
    };

    if requested < 1 {
        return Err(ScanError::InvalidWorkerCount(requested));
    }

    let requested = usize::try_from(requested).map_err(|_| ScanError::InvalidWorkerCount(requested))?;
    if requested > available && !confirmed {
        return Err(ScanError::WorkersNeedConfirmation { requested, available });
    }
    Ok(requested)
}

/// Scan tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Positions per dispatched task
    pub chunk_size: u64,
    /// Progress sampling interval
    pub monitor_interval: Duration,
    /// Checkpoint write interval (sequential scans)
    pub checkpoint_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: SEQUENTIAL_CHUNK,
            monitor_interval: Duration::from_secs(2),
            checkpoint_interval: Duration::from_secs(2),
        }
    }
}

impl ScanConfig {
    /// Defaults with the chunk size suited to `range`
    pub fn for_range(range: &SearchRange) -> Self {
        let chunk_size = match range {
            SearchRange::Sequential { .. } => SEQUENTIAL_CHUNK,
            SearchRange::Random => RANDOM_CHUNK,
        };
        Self {
            chunk_size,
            ..Default::default()
        }
    }
}

/// Everything fixed for the duration of one scan
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub range: SearchRange,
    /// Start of the original range; equals `range` start unless resumed
    pub origin: u128,
    pub workers: usize,
    pub pool: PoolKind,
    pub config: ScanConfig,
    pub started_at: Instant,
}

impl ScanSession {
    pub fn new(range: SearchRange, workers: usize, pool: PoolKind) -> Self {
        let origin = match range {
            SearchRange::Sequential { start, .. } => start,
            SearchRange::Random => 0,
        };

        Self {
            range,
            origin,
            workers: workers.max(1),
            pool,
            config: ScanConfig::for_range(&range),
            started_at: Instant::now(),
        }
    }

    /// Continue a sequential scan from a saved checkpoint
    pub fn resume(checkpoint: &Checkpoint, workers: usize, pool: PoolKind) -> Self {
        Self {
            origin: checkpoint.range_start,
            ..Self::new(checkpoint.resume_range(), workers, pool)
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Fresh position source for this session's range
    pub fn positions(&self) -> Box<dyn PositionSource> {
        match self.range {
            SearchRange::Sequential { start, end } => Box::new(SequentialRange::new(start, end)),
            SearchRange::Random => Box::new(RandomStream::new()),
        }
    }

    /// End of the range, `None` for random streams
    pub fn end(&self) -> Option<u128> {
        match self.range {
            SearchRange::Sequential { end, .. } => Some(end),
            SearchRange::Random => None,
        }
    }
}
