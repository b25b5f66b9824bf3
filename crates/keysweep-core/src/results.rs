//! Confirmed matches and the append-only result log

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Why a candidate was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Present in the authoritative store
    TargetConfirmed,
    /// Reported active by the online checker
    ActiveOnline,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::TargetConfirmed => write!(f, "target confirmed"),
            MatchReason::ActiveOnline => write!(f, "active online"),
        }
    }
}

/// A confirmed match
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub identifier: String,
    /// Exported secret (WIF)
    pub secret: String,
    pub reason: MatchReason,
    /// Key-space position, for positional scans
    #[serde(default, with = "crate::protocol::opt_decimal")]
    pub position: Option<u128>,
}

impl fmt::Debug for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResult")
            .field("identifier", &self.identifier)
            .field("secret", &"..")
            .field("reason", &self.reason)
            .field("position", &self.position)
            .finish()
    }
}

/// Append-only log: identifier line, then secret line, per match
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and sync to disk before returning
    pub fn append(&self, result: &MatchResult) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        // One write so concurrent worker processes never interleave lines
        file.write_all(format!("{}\n{}\n", result.identifier, result.secret).as_bytes())?;
        file.sync_data()
    }

    /// `(identifier, secret)` pairs logged so far
    pub fn entries(&self) -> io::Result<Vec<(String, String)>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let lines: Vec<&str> = text.lines().collect();
        Ok(lines
            .chunks_exact(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(identifier: &str) -> MatchResult {
        MatchResult {
            identifier: identifier.into(),
            secret: format!("secret-of-{identifier}"),
            reason: MatchReason::TargetConfirmed,
            position: None,
        }
    }

    #[test]
    fn test_append_two_lines_per_match() {
        let dir = tempfile::tempdir().unwrap();
        let log = ResultLog::new(dir.path().join("foundkey.txt"));
        assert!(log.entries().unwrap().is_empty());

        log.append(&result("1AAA")).unwrap();
        log.append(&result("1BBB")).unwrap();

        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "1AAA\nsecret-of-1AAA\n1BBB\nsecret-of-1BBB\n"
        );
        assert_eq!(log.entries().unwrap()[1].0, "1BBB");
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", result("1AAA"));
        assert!(debug.contains("1AAA"));
        assert!(!debug.contains("secret-of"));
    }
}
