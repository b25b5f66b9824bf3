//! Checkpoint persistence for resumable sequential scans

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cursor::CursorReader;
use crate::session::SearchRange;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed checkpoint: {0}")]
    Malformed(String),
    #[error("Failed to replace checkpoint file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Saved scan position: `cursor` within the original `[range_start, range_end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub cursor: u128,
    pub range_start: u128,
    pub range_end: u128,
}

impl Checkpoint {
    pub fn new(cursor: u128, range_start: u128, range_end: u128) -> Result<Self, CheckpointError> {
        if range_start > range_end || cursor < range_start || cursor > range_end {
            return Err(CheckpointError::Malformed(format!(
                "cursor {} outside [{}, {}]",
                cursor, range_start, range_end
            )));
        }
        Ok(Self {
            cursor,
            range_start,
            range_end,
        })
    }

    /// What is left to scan
    pub fn resume_range(&self) -> SearchRange {
        SearchRange::Sequential {
            start: self.cursor,
            end: self.range_end,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.range_end
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.cursor, self.range_start, self.range_end)
    }
}

impl FromStr for Checkpoint {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split('-').collect();
        let [cursor, start, end] = fields.as_slice() else {
            return Err(CheckpointError::Malformed(format!(
                "expected cursor-start-end, got {:?}",
                s.trim()
            )));
        };

        let number = |field: &str| {
            field
                .parse::<u128>()
                .map_err(|_| CheckpointError::Malformed(format!("'{}' is not a position", field)))
        };
        Self::new(number(*cursor)?, number(*start)?, number(*end)?)
    }
}

/// The checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is absent or empty
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| CheckpointError::Malformed(format!("not valid UTF-8: {}", e)))?;

        if text.trim().is_empty() {
            return Ok(None);
        }
        text.parse().map(Some)
    }

    /// Replace the checkpoint atomically: write a sibling temp file, then rename
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        write!(tmp, "{}", checkpoint)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(checkpoint = %checkpoint, "checkpoint saved");
        Ok(())
    }

    /// Remove the checkpoint once its range is finished
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Save the cursor every `interval` until `stop` closes
pub(crate) fn run_writer(
    store: &CheckpointStore,
    cursor: &CursorReader,
    range_start: u128,
    range_end: u128,
    interval: Duration,
    stop: &Receiver<()>,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        let Some(position) = cursor.snapshot() else {
            continue;
        };
        let saved = Checkpoint::new(position, range_start, range_end).and_then(|cp| store.save(&cp));
        if let Err(e) = saved {
            warn!(error = %e, "failed to save checkpoint");
        }
    }
}
