//! Scan scheduler
//!
//! Dispatches chunks of positions to a fixed set of worker slots until the
//! range is exhausted or cancellation is observed. Chunks go out through a
//! rendezvous channel, so a slot only receives a chunk when it is idle.
//! The published cursor is the low-water mark: the first position that
//! has not been fully tested.

use std::collections::BTreeMap;
use std::ops::Range;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::checkpoint::{self, Checkpoint, CheckpointStore};
use crate::cursor::{scan_cursor, CursorWriter};
use crate::error::ScanError;
use crate::monitor::{ProgressMonitor, ProgressReport};
use crate::results::MatchResult;
use crate::session::{PoolKind, ScanSession, SearchRange};
use crate::source::PositionSource;
use crate::worker::{ChunkOutcome, RunnerFactory};

/// How often the dispatcher re-checks cancellation while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Found(MatchResult),
    /// Every position in the range was tested
    Exhausted,
    /// Interrupted without a match
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Final low-water mark
    pub cursor: u128,
    pub elapsed: Duration,
}

type ProgressSink = Box<dyn FnMut(&ProgressReport) + Send>;

/// Runs one scan session
pub struct Scheduler {
    session: ScanSession,
    cancel: Cancellation,
    checkpoints: Option<CheckpointStore>,
    progress: Option<ProgressSink>,
}

impl Scheduler {
    pub fn new(session: ScanSession, cancel: Cancellation) -> Self {
        Self {
            session,
            cancel,
            checkpoints: None,
            progress: None,
        }
    }

    /// Persist the cursor periodically (sequential scans only)
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Receive a progress report every monitor interval
    pub fn on_progress<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&ProgressReport) + Send + 'static,
    {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Run to completion. The first worker error aborts the scan.
    pub fn run(self, factory: &dyn RunnerFactory) -> Result<ScanReport, ScanError> {
        let Scheduler {
            session,
            cancel,
            checkpoints,
            mut progress,
        } = self;

        // Worker processes need a flag they can map; it lives as long as the scan
        let _flag_dir = if factory.kind() == PoolKind::Processes && cancel.shared_path().is_none() {
            let dir = tempfile::tempdir()?;
            cancel.attach_shared(dir.path().join("cancel.flag"))?;
            Some(dir)
        } else {
            None
        };

        let sequential_end = match session.range {
            SearchRange::Sequential { start, end } => {
                if let Some(store) = &checkpoints {
                    store.save(&Checkpoint::new(start, session.origin, end)?)?;
                }
                Some(end)
            }
            SearchRange::Random => None,
        };

        info!(
            range = %session.range,
            workers = session.workers,
            pool = %factory.kind(),
            chunk_size = session.config.chunk_size,
            "scan starting"
        );

        let (writer, reader) = scan_cursor();
        let (task_tx, task_rx) = bounded::<Range<u128>>(0);
        let (done_tx, done_rx) = unbounded::<Completion>();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let dispatched = thread::scope(|scope| -> Result<Dispatch, ScanError> {
            let task_tx = task_tx;
            let stop_tx = stop_tx;

            for slot in 0..session.workers {
                let tasks = task_rx.clone();
                let done = done_tx.clone();
                let cancel = cancel.clone();
                thread::Builder::new()
                    .name(format!("keysweep-worker-{}", slot))
                    .spawn_scoped(scope, move || worker_loop(slot, factory, &cancel, tasks, done))?;
            }
            drop(task_rx);
            drop(done_tx);

            let mut side_threads = Vec::new();
            if let Some(sink) = progress.as_mut() {
                let monitor = ProgressMonitor::new(reader.clone(), &session);
                let (cancel, stop) = (cancel.clone(), stop_rx.clone());
                side_threads.push(
                    thread::Builder::new()
                        .name("keysweep-monitor".into())
                        .spawn_scoped(scope, move || monitor.run(&cancel, &stop, sink))?,
                );
            }
            if let (Some(store), Some(end)) = (&checkpoints, sequential_end) {
                let (reader, stop) = (reader.clone(), stop_rx.clone());
                let (origin, interval) = (session.origin, session.config.checkpoint_interval);
                side_threads.push(
                    thread::Builder::new()
                        .name("keysweep-checkpoint".into())
                        .spawn_scoped(scope, move || {
                            checkpoint::run_writer(store, &reader, origin, end, interval, &stop)
                        })?,
                );
            }

            let mut dispatch = Dispatch::new(session.positions(), writer);
            dispatch.run(&cancel, session.config.chunk_size, task_tx, &done_rx);

            // Side threads stop before the final checkpoint is written
            drop(stop_tx);
            for handle in side_threads {
                if handle.join().is_err() {
                    warn!("progress or checkpoint thread panicked");
                }
            }
            Ok(dispatch)
        })?;

        let cursor = dispatched.low_water_mark();
        let outcome = dispatched.into_outcome();

        // Saved on worker failure too
        if let (Some(store), Some(end)) = (&checkpoints, sequential_end) {
            let persisted = match &outcome {
                Ok(ScanOutcome::Exhausted) => store.clear(),
                _ => Checkpoint::new(cursor, session.origin, end).and_then(|cp| store.save(&cp)),
            };
            match (persisted, &outcome) {
                (Err(e), Ok(_)) => return Err(e.into()),
                (Err(e), Err(_)) => warn!(error = %e, "final checkpoint not saved"),
                (Ok(()), _) => {}
            }
        }
        let outcome = outcome?;

        let elapsed = session.started_at.elapsed();
        match &outcome {
            ScanOutcome::Found(result) => info!(identifier = %result.identifier, cursor = %cursor, "scan finished: match found"),
            ScanOutcome::Exhausted => info!(cursor = %cursor, "scan finished: range exhausted"),
            ScanOutcome::Stopped => info!(cursor = %cursor, "scan finished: stopped"),
        }

        Ok(ScanReport {
            outcome,
            cursor,
            elapsed,
        })
    }
}

/// Message from a worker slot back to the dispatcher
enum Completion {
    Chunk {
        chunk: Range<u128>,
        outcome: Result<ChunkOutcome, ScanError>,
    },
    /// The slot could not start
    Failed { error: ScanError },
}

fn worker_loop(
    slot: usize,
    factory: &dyn RunnerFactory,
    cancel: &Cancellation,
    tasks: Receiver<Range<u128>>,
    done: Sender<Completion>,
) {
    let mut runner = match factory.spawn(slot, cancel) {
        Ok(runner) => runner,
        Err(error) => {
            let _ = done.send(Completion::Failed { error });
            return;
        }
    };

    while !cancel.is_set() {
        let Ok(chunk) = tasks.recv() else {
            break;
        };

        let outcome = runner.run_chunk(chunk.clone());
        let failed = outcome.is_err();
        if done.send(Completion::Chunk { chunk, outcome }).is_err() || failed {
            break;
        }
    }

    if let Err(e) = runner.shutdown() {
        warn!(slot, error = %e, "worker shutdown failed");
    }
    debug!(slot, "worker stopped");
}

/// Dispatcher bookkeeping
struct Dispatch {
    source: Box<dyn PositionSource>,
    cursor: CursorWriter,
    published: Option<u128>,
    /// start -> end of chunks handed out and not yet reported
    in_flight: BTreeMap<u128, u128>,
    /// start -> end of positions left untested by stopped chunks
    gaps: BTreeMap<u128, u128>,
    exhausted: bool,
    found: Option<MatchResult>,
    failure: Option<ScanError>,
}

impl Dispatch {
    fn new(source: Box<dyn PositionSource>, cursor: CursorWriter) -> Self {
        let mut dispatch = Self {
            source,
            cursor,
            published: None,
            in_flight: BTreeMap::new(),
            gaps: BTreeMap::new(),
            exhausted: false,
            found: None,
            failure: None,
        };
        dispatch.publish();
        dispatch
    }

    fn run(
        &mut self,
        cancel: &Cancellation,
        chunk_size: u64,
        tasks: Sender<Range<u128>>,
        done: &Receiver<Completion>,
    ) {
        let mut pending: Option<Range<u128>> = None;

        loop {
            if cancel.is_set() || self.failure.is_some() {
                break;
            }
            if pending.is_none() && !self.exhausted {
                pending = self.source.next_chunk(chunk_size);
                self.exhausted = pending.is_none();
            }
            if self.exhausted && self.in_flight.is_empty() {
                break;
            }

            match pending.clone() {
                Some(chunk) => select! {
                    send(tasks, chunk.clone()) -> sent => match sent {
                        Ok(()) => {
                            self.in_flight.insert(chunk.start, chunk.end);
                            pending = None;
                        }
                        Err(_) => self.record_lost_workers(),
                    },
                    recv(done) -> message => self.receive(message.ok(), cancel),
                    default(POLL_INTERVAL) => {}
                },
                None => select! {
                    recv(done) -> message => self.receive(message.ok(), cancel),
                    default(POLL_INTERVAL) => {}
                },
            }
            self.publish();
        }

        // A chunk drawn but never sent is untested
        if let Some(chunk) = pending {
            self.gaps.insert(chunk.start, chunk.end);
        }

        // Idle workers exit once the task channel closes; busy ones finish
        // their current chunk and report back
        drop(tasks);
        for message in done.iter() {
            self.receive(Some(message), cancel);
        }
        if !self.in_flight.is_empty() {
            self.record_lost_workers();
        }
        self.publish();
    }

    fn receive(&mut self, message: Option<Completion>, cancel: &Cancellation) {
        let Some(message) = message else {
            self.record_lost_workers();
            return;
        };

        match message {
            Completion::Chunk { chunk, outcome } => {
                self.in_flight.remove(&chunk.start);
                match outcome {
                    Ok(ChunkOutcome::Completed) => {}
                    Ok(ChunkOutcome::Found { result, next }) => {
                        self.gap(next, chunk.end);
                        if self.found.is_none() {
                            self.found = Some(result);
                        } else {
                            info!(identifier = %result.identifier, "additional match found");
                        }
                    }
                    Ok(ChunkOutcome::Cancelled { next }) => self.gap(next, chunk.end),
                    Err(error) => {
                        self.gap(chunk.start, chunk.end);
                        self.fail(error, cancel);
                    }
                }
            }
            Completion::Failed { error } => self.fail(error, cancel),
        }
    }

    fn gap(&mut self, start: u128, end: u128) {
        if start < end {
            self.gaps.insert(start, end);
        }
    }

    fn fail(&mut self, error: ScanError, cancel: &Cancellation) {
        warn!(error = %error, "worker failed, stopping scan");
        cancel.set();
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    fn record_lost_workers(&mut self) {
        if self.failure.is_none() {
            self.failure = Some(ScanError::Worker {
                slot: 0,
                message: "all workers exited before the scan finished".into(),
            });
        }
    }

    /// First position not known to be tested
    fn low_water_mark(&self) -> u128 {
        let frontier = self.source.frontier();
        let in_flight = self.in_flight.keys().next().copied().unwrap_or(frontier);
        let gap = self.gaps.keys().next().copied().unwrap_or(frontier);
        frontier.min(in_flight).min(gap)
    }

    fn publish(&mut self) {
        let mark = self.low_water_mark();
        if self.published != Some(mark) {
            self.cursor.publish(mark);
            self.published = Some(mark);
        }
    }

    fn into_outcome(self) -> Result<ScanOutcome, ScanError> {
        if let Some(error) = self.failure {
            return Err(error);
        }
        if let Some(result) = self.found {
            return Ok(ScanOutcome::Found(result));
        }
        if self.exhausted && self.gaps.is_empty() && self.in_flight.is_empty() {
            return Ok(ScanOutcome::Exhausted);
        }
        Ok(ScanOutcome::Stopped)
    }
}
