//! Chunk runners

use std::ops::Range;
use std::sync::Arc;

use tracing::info;

use crate::cancel::Cancellation;
use crate::error::ScanError;
use crate::probe::Probe;
use crate::results::{MatchResult, ResultLog};
use crate::session::PoolKind;

/// How a chunk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Every position was tested
    Completed,
    /// Match recorded; positions from `next` on were not tested
    Found { result: MatchResult, next: u128 },
    /// Cancellation observed before `next` was tested
    Cancelled { next: u128 },
}

/// Runs chunks for one worker slot
pub trait ChunkRunner: Send {
    fn run_chunk(&mut self, chunk: Range<u128>) -> Result<ChunkOutcome, ScanError>;

    fn shutdown(self: Box<Self>) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Creates one runner per worker slot
pub trait RunnerFactory: Sync {
    fn kind(&self) -> PoolKind;

    fn spawn(&self, slot: usize, cancel: &Cancellation) -> Result<Box<dyn ChunkRunner>, ScanError>;
}

/// Tests positions on the calling thread
pub struct LocalRunner {
    slot: usize,
    probe: Arc<Probe>,
    results: Arc<ResultLog>,
    cancel: Cancellation,
}

impl LocalRunner {
    pub fn new(slot: usize, probe: Arc<Probe>, results: Arc<ResultLog>, cancel: Cancellation) -> Self {
        Self {
            slot,
            probe,
            results,
            cancel,
        }
    }
}

impl ChunkRunner for LocalRunner {
    fn run_chunk(&mut self, chunk: Range<u128>) -> Result<ChunkOutcome, ScanError> {
        for position in chunk {
            if self.cancel.is_set() {
                return Ok(ChunkOutcome::Cancelled { next: position });
            }

            if let Some(result) = self.probe.check(position)? {
                info!(
                    slot = self.slot,
                    identifier = %result.identifier,
                    reason = %result.reason,
                    "match found"
                );
                // Durable before anyone is told to stop
                self.results.append(&result)?;
                self.cancel.set();
                return Ok(ChunkOutcome::Found {
                    result,
                    next: position + 1,
                });
            }
        }
        Ok(ChunkOutcome::Completed)
    }
}

/// Thread-pool runners sharing one probe
pub struct LocalRunners {
    probe: Arc<Probe>,
    results: Arc<ResultLog>,
}

impl LocalRunners {
    pub fn new(probe: Probe, results: ResultLog) -> Self {
        Self {
            probe: Arc::new(probe),
            results: Arc::new(results),
        }
    }
}

impl RunnerFactory for LocalRunners {
    fn kind(&self) -> PoolKind {
        PoolKind::Threads
    }

    fn spawn(&self, slot: usize, cancel: &Cancellation) -> Result<Box<dyn ChunkRunner>, ScanError> {
        Ok(Box::new(LocalRunner::new(
            slot,
            self.probe.clone(),
            self.results.clone(),
            cancel.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeMode, Verifier};
    use keysweep_filter::{BloomConfig, MemoryStore, TwoTierFilter};
    use keysweep_keys::Bitcoin;

    // Address for private key 3
    const KEY_THREE: &str = "1CUNEBjYrCn2y1SdiUMohaKUi4wpP326Lb";

    fn runner(dir: &std::path::Path, cancel: &Cancellation) -> (LocalRunner, Arc<ResultLog>) {
        let store = Arc::new(MemoryStore::with_identifiers([KEY_THREE]));
        let filter = TwoTierFilter::new(store, BloomConfig { capacity: 100, false_positive_rate: 0.01 }).unwrap();
        let probe = Probe::new(Arc::new(Bitcoin::default()), Verifier::Membership(Arc::new(filter)), ProbeMode::Positional);
        let results = Arc::new(ResultLog::new(dir.join("foundkey.txt")));
        (LocalRunner::new(0, Arc::new(probe), results.clone(), cancel.clone()), results)
    }

    #[test]
    fn test_match_is_logged_then_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Cancellation::in_process();
        let (mut runner, results) = runner(dir.path(), &cancel);

        let outcome = runner.run_chunk(1..10).unwrap();
        let ChunkOutcome::Found { result, next } = outcome else {
            panic!("expected a match, got {outcome:?}");
        };
        assert_eq!(result.identifier, KEY_THREE);
        assert_eq!(next, 4);
        assert!(cancel.is_set());
        assert_eq!(results.entries().unwrap()[0].0, KEY_THREE);
    }

    #[test]
    fn test_cancelled_runner_tests_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Cancellation::in_process();
        let (mut runner, results) = runner(dir.path(), &cancel);

        cancel.set();
        assert_eq!(runner.run_chunk(1..10).unwrap(), ChunkOutcome::Cancelled { next: 1 });
        assert!(results.entries().unwrap().is_empty());
    }

    #[test]
    fn test_no_match_completes() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = Cancellation::in_process();
        let (mut runner, _) = runner(dir.path(), &cancel);

        assert_eq!(runner.run_chunk(4..20).unwrap(), ChunkOutcome::Completed);
        assert!(!cancel.is_set());
    }
}
