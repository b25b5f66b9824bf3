//! Worker-process pool
//!
//! Each slot re-executes a worker command and feeds it chunks over stdin.
//! The child opens its own store handle and joins the run's shared
//! cancellation flag, passed as `--cancel-flag <path> --slot <n>`.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{debug, error, warn};

use crate::cancel::Cancellation;
use crate::error::ScanError;
use crate::protocol::{read_message, write_message, WorkerReply, WorkerRequest};
use crate::session::PoolKind;
use crate::worker::{ChunkOutcome, ChunkRunner, RunnerFactory};

/// Program and arguments that start a worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Spawns one worker process per slot
#[derive(Debug, Clone)]
pub struct ProcessRunners {
    command: WorkerCommand,
}

impl ProcessRunners {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }
}

impl RunnerFactory for ProcessRunners {
    fn kind(&self) -> PoolKind {
        PoolKind::Processes
    }

    fn spawn(&self, slot: usize, cancel: &Cancellation) -> Result<Box<dyn ChunkRunner>, ScanError> {
        let flag = cancel.shared_path().ok_or_else(|| ScanError::Worker {
            slot,
            message: "process pool needs a shared cancellation flag".into(),
        })?;

        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg("--cancel-flag")
            .arg(flag)
            .arg("--slot")
            .arg(slot.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        Ok(Box::new(ChildRunner::start(slot, child)?))
    }
}

/// Parent-side handle to one worker process
struct ChildRunner {
    slot: usize,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

impl ChildRunner {
    fn start(slot: usize, mut child: Child) -> Result<Self, ScanError> {
        let missing = |what: &str| ScanError::Worker {
            slot,
            message: format!("worker {} not captured", what),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        let mut runner = Self {
            slot,
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            reaped: false,
        };

        match runner.receive()? {
            WorkerReply::Ready { loaded } => {
                debug!(slot, loaded, pid = runner.child.id(), "worker process ready");
                Ok(runner)
            }
            other => Err(runner.unexpected(&other)),
        }
    }

    fn send(&mut self, request: &WorkerRequest) -> Result<(), ScanError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| ScanError::Worker {
            slot: self.slot,
            message: "worker stdin already closed".into(),
        })?;
        write_message(stdin, request)
    }

    fn receive(&mut self) -> Result<WorkerReply, ScanError> {
        match read_message(&mut self.stdout)? {
            Some(WorkerReply::Error { message }) => Err(ScanError::Worker {
                slot: self.slot,
                message,
            }),
            Some(reply) => Ok(reply),
            None => Err(ScanError::Worker {
                slot: self.slot,
                message: "worker process exited unexpectedly".into(),
            }),
        }
    }

    fn unexpected(&self, reply: &WorkerReply) -> ScanError {
        ScanError::Worker {
            slot: self.slot,
            message: format!("unexpected reply {:?}", reply),
        }
    }
}

impl ChunkRunner for ChildRunner {
    fn run_chunk(&mut self, chunk: Range<u128>) -> Result<ChunkOutcome, ScanError> {
        self.send(&WorkerRequest::Chunk {
            start: chunk.start,
            end: chunk.end,
        })?;

        match self.receive()? {
            WorkerReply::Done { start, end } if start == chunk.start && end == chunk.end => {
                Ok(ChunkOutcome::Completed)
            }
            WorkerReply::Found { result, next } => Ok(ChunkOutcome::Found { result, next }),
            WorkerReply::Stopped { next } => Ok(ChunkOutcome::Cancelled { next }),
            other => Err(self.unexpected(&other)),
        }
    }

    fn shutdown(mut self: Box<Self>) -> Result<(), ScanError> {
        if let Err(e) = self.send(&WorkerRequest::Shutdown) {
            debug!(slot = self.slot, error = %e, "worker already gone");
        }
        // Closing stdin lets the child see end of input
        self.stdin = None;

        let status = self.child.wait()?;
        self.reaped = true;
        if !status.success() {
            warn!(slot = self.slot, %status, "worker process exited with failure");
        }
        Ok(())
    }
}

impl Drop for ChildRunner {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Worker-process side: answer requests until shutdown or end of input.
/// `runner` is usually a [`LocalRunner`](crate::worker::LocalRunner) whose
/// cancellation is attached to the parent's shared flag.
pub fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    runner: &mut dyn ChunkRunner,
    loaded: usize,
) -> Result<(), ScanError>
where
    R: BufRead,
    W: Write,
{
    write_message(&mut writer, &WorkerReply::Ready { loaded })?;

    while let Some(request) = read_message::<_, WorkerRequest>(&mut reader)? {
        let (start, end) = match request {
            WorkerRequest::Chunk { start, end } => (start, end),
            WorkerRequest::Shutdown => break,
        };

        let reply = match runner.run_chunk(start..end) {
            Ok(ChunkOutcome::Completed) => WorkerReply::Done { start, end },
            Ok(ChunkOutcome::Found { result, next }) => WorkerReply::Found { result, next },
            Ok(ChunkOutcome::Cancelled { next }) => WorkerReply::Stopped { next },
            Err(e) => {
                error!(error = %e, "chunk failed");
                WorkerReply::Error {
                    message: e.to_string(),
                }
            }
        };
        write_message(&mut writer, &reply)?;
    }
    Ok(())
}
