//! KeySweep CLI
//!
//! Resumable, parallel key-space scanner.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keysweep_core::online::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use keysweep_core::protocol::{write_message, WorkerReply};
use keysweep_core::{
    available_workers, resolve_workers, serve, AddressType, Bitcoin, BloomConfig, Candidate,
    CandidateSource, Cancellation, CheckpointError, CheckpointStore, HttpActivityChecker,
    LocalRunner, LocalRunners, MatchResult, PoolKind, Probe, ProbeMode, ProcessRunners,
    ResultLog, RunnerFactory, ScanError, ScanOutcome, ScanReport, ScanSession, Scheduler,
    SearchRange, SqliteStore, TargetStore, TwoTierFilter, Verifier, WorkerCommand,
};
use keysweep_filter::ImportOptions;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "keysweep")]
#[command(author = "KeySweep Team")]
#[command(version)]
#[command(about = "Resumable, parallel key-space scanner", long_about = None)]
struct Cli {
    /// Target address database
    #[arg(long, global = true, default_value = "addresses.db")]
    db: PathBuf,

    /// Where confirmed matches are appended
    #[arg(long, global = true, default_value = "foundkey.txt")]
    results: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh random address and its private key
    Generate {
        /// Address type: p2pkh or p2wpkh
        #[arg(short, long, default_value = "p2pkh")]
        address_type: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the address for a WIF or hex private key
    Derive {
        secret: String,

        /// Address type: p2pkh or p2wpkh
        #[arg(short, long, default_value = "p2pkh")]
        address_type: String,
    },

    /// Import newline-delimited target addresses
    Import {
        file: PathBuf,

        /// Lines containing this text are skipped (empty disables)
        #[arg(long, default_value = "wallet")]
        marker: String,

        #[command(flatten)]
        bloom: BloomArgs,
    },

    /// Scan the key-space
    Scan {
        #[command(subcommand)]
        mode: ScanCommand,
    },

    /// Worker process for process pools
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Subcommand)]
enum ScanCommand {
    /// Random keys against the target database
    Random {
        #[command(flatten)]
        common: ScanArgs,
    },

    /// Consecutive keys over a range, resumable
    Sequential {
        /// Range as START-END (END exclusive); prompted for when absent
        #[arg(long)]
        range: Option<String>,

        /// Worker pool back-end
        #[arg(long, value_enum, default_value = "processes")]
        pool: PoolArg,

        /// Checkpoint file
        #[arg(long, default_value = "cache.txt")]
        checkpoint: PathBuf,

        /// Ignore any saved checkpoint
        #[arg(long)]
        restart: bool,

        #[command(flatten)]
        common: ScanArgs,
    },

    /// Random keys checked against an online balance API
    Online {
        /// Endpoint, with {address} substituted
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,

        #[command(flatten)]
        common: ScanArgs,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Number of workers (default: all cores)
    #[arg(short, long, allow_negative_numbers = true)]
    workers: Option<i64>,

    /// Allow more workers than available cores without asking
    #[arg(long)]
    force: bool,

    /// Positions per dispatched task
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Address type: p2pkh or p2wpkh
    #[arg(short, long, default_value = "p2pkh")]
    address_type: String,

    #[command(flatten)]
    bloom: BloomArgs,
}

#[derive(Args, Clone)]
struct BloomArgs {
    /// Expected number of target addresses
    #[arg(long, default_value_t = 10_000_000)]
    bloom_capacity: usize,

    /// Pre-filter false-positive rate
    #[arg(long, default_value_t = 0.001)]
    bloom_fp_rate: f64,
}

impl BloomArgs {
    fn config(&self) -> BloomConfig {
        BloomConfig {
            capacity: self.bloom_capacity,
            false_positive_rate: self.bloom_fp_rate,
        }
    }
}

#[derive(Args)]
struct WorkerArgs {
    #[arg(long)]
    cancel_flag: PathBuf,

    #[arg(long)]
    slot: usize,

    #[arg(long, default_value = "p2pkh")]
    address_type: String,

    #[command(flatten)]
    bloom: BloomArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum PoolArg {
    Threads,
    Processes,
}

impl From<PoolArg> for PoolKind {
    fn from(arg: PoolArg) -> Self {
        match arg {
            PoolArg::Threads => PoolKind::Threads,
            PoolArg::Processes => PoolKind::Processes,
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries results and the worker protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { address_type, json } => cmd_generate(&address_type, json),
        Commands::Derive { secret, address_type } => cmd_derive(&secret, &address_type),
        Commands::Import { file, marker, bloom } => cmd_import(&cli.db, &file, marker, &bloom),
        Commands::Scan { mode } => cmd_scan(&cli.db, &cli.results, mode),
        Commands::Worker(args) => cmd_worker(&cli.db, &cli.results, &args),
    }
}

fn cmd_generate(address_type: &str, json_output: bool) -> Result<()> {
    let source = Bitcoin::new(parse_address_type(address_type)?);
    let candidate = source.generate();

    if json_output {
        let value = serde_json::json!({
            "address": candidate.identifier,
            "private_key": candidate.export_secret(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_candidate(&candidate);
    }
    Ok(())
}

fn cmd_derive(secret: &str, address_type: &str) -> Result<()> {
    let source = Bitcoin::new(parse_address_type(address_type)?);
    let candidate = source.from_secret(secret)?;
    print_candidate(&candidate);
    Ok(())
}

fn cmd_import(db: &Path, file: &Path, marker: String, bloom: &BloomArgs) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("Failed to open database {}", db.display()))?;
    let filter = TwoTierFilter::new(Arc::new(store), bloom.config())?;
    let options = ImportOptions {
        exclusion_marker: marker,
        ..Default::default()
    };

    let (report, loaded) = filter
        .import(file, &options)
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!(
        "Imported {} new addresses ({} duplicates, {} skipped, {} failed)",
        report.inserted, report.duplicates, report.skipped, report.failed
    );
    println!("Filter loaded with {} addresses", loaded);
    Ok(())
}

fn cmd_scan(db: &Path, results: &Path, mode: ScanCommand) -> Result<()> {
    let cancel = Cancellation::in_process();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, stopping workers...");
            cancel.set();
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    match mode {
        ScanCommand::Random { common } => {
            let workers = confirm_workers(&common)?;
            let filter = open_filter(db, &common.bloom)?;
            let probe = Probe::new(
                source_for(&common)?,
                Verifier::Membership(filter),
                ProbeMode::Random,
            );
            let runners = LocalRunners::new(probe, ResultLog::new(results));
            let session = with_chunk_size(
                ScanSession::new(SearchRange::Random, workers, PoolKind::Threads),
                common.chunk_size,
            );
            run_scan(Scheduler::new(session, cancel), &runners, results)
        }

        ScanCommand::Sequential {
            range,
            pool,
            checkpoint,
            restart,
            common,
        } => {
            let workers = confirm_workers(&common)?;
            let checkpoints = CheckpointStore::new(checkpoint);
            if restart {
                checkpoints.clear()?;
            }

            let pool = PoolKind::from(pool);
            let session = match (load_checkpoint(&checkpoints)?, range) {
                (Some(saved), None) => {
                    info!(checkpoint = %saved, "resuming from checkpoint");
                    ScanSession::resume(&saved, workers, pool)
                }
                (saved, Some(text)) => {
                    if saved.is_some() {
                        warn!("--range given, ignoring saved checkpoint");
                    }
                    ScanSession::new(SearchRange::parse(&text)?, workers, pool)
                }
                (None, None) => ScanSession::new(prompt_range()?, workers, pool),
            };
            let session = with_chunk_size(session, common.chunk_size);
            let scheduler = Scheduler::new(session, cancel).with_checkpoints(checkpoints);

            match pool {
                PoolKind::Threads => {
                    let probe = Probe::new(
                        source_for(&common)?,
                        Verifier::Membership(open_filter(db, &common.bloom)?),
                        ProbeMode::Positional,
                    );
                    run_scan(scheduler, &LocalRunners::new(probe, ResultLog::new(results)), results)
                }
                PoolKind::Processes => {
                    let command = WorkerCommand::current_exe()
                        .context("Failed to locate the keysweep executable")?
                        .arg("--db")
                        .arg(db)
                        .arg("--results")
                        .arg(results)
                        .arg("worker")
                        .arg("--address-type")
                        .arg(&common.address_type)
                        .arg("--bloom-capacity")
                        .arg(common.bloom.bloom_capacity.to_string())
                        .arg("--bloom-fp-rate")
                        .arg(common.bloom.bloom_fp_rate.to_string());
                    run_scan(scheduler, &ProcessRunners::new(command), results)
                }
            }
        }

        ScanCommand::Online {
            endpoint,
            timeout,
            common,
        } => {
            let workers = confirm_workers(&common)?;
            let checker = HttpActivityChecker::new(endpoint, Duration::from_secs(timeout))?;
            let probe = Probe::new(
                source_for(&common)?,
                Verifier::Online(Arc::new(checker)),
                ProbeMode::Random,
            );
            let runners = LocalRunners::new(probe, ResultLog::new(results));
            // Every position is a network round trip
            let session = with_chunk_size(
                ScanSession::new(SearchRange::Random, workers, PoolKind::Threads),
                Some(common.chunk_size.unwrap_or(1)),
            );
            run_scan(Scheduler::new(session, cancel), &runners, results)
        }
    }
}

fn cmd_worker(db: &Path, results: &Path, args: &WorkerArgs) -> Result<()> {
    // The parent owns Ctrl-C and stops us through the shared flag
    ctrlc::set_handler(|| {}).context("Failed to install Ctrl-C handler")?;

    let mut stdout = io::stdout().lock();
    let (mut runner, loaded) = match prepare_worker(db, results, args) {
        Ok(ready) => ready,
        Err(e) => {
            let _ = write_message(&mut stdout, &WorkerReply::Error { message: format!("{:#}", e) });
            return Err(e);
        }
    };

    serve(io::stdin().lock(), stdout, &mut runner, loaded)?;
    Ok(())
}

fn prepare_worker(db: &Path, results: &Path, args: &WorkerArgs) -> Result<(LocalRunner, usize)> {
    let cancel = Cancellation::attached(&args.cancel_flag)
        .with_context(|| format!("Failed to open cancellation flag {}", args.cancel_flag.display()))?;
    let filter = open_filter(db, &args.bloom)?;
    let loaded = filter.loaded();

    let source: Arc<dyn CandidateSource> = Arc::new(Bitcoin::new(parse_address_type(&args.address_type)?));
    let probe = Probe::new(source, Verifier::Membership(filter), ProbeMode::Positional);
    let runner = LocalRunner::new(args.slot, Arc::new(probe), Arc::new(ResultLog::new(results)), cancel);
    Ok((runner, loaded))
}

fn run_scan(scheduler: Scheduler, factory: &dyn RunnerFactory, results: &Path) -> Result<()> {
    let session = scheduler.session();
    eprintln!("KeySweep v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Range:   {}", session.range);
    eprintln!("Workers: {} ({})", session.workers, factory.kind());
    eprintln!();

    let report = scheduler
        .on_progress(|progress| eprint!("\r{}", progress.format()))
        .run(factory)?;
    eprintln!();

    match &report.outcome {
        ScanOutcome::Found(result) => print_result(result, &report, results),
        ScanOutcome::Exhausted => println!("Range exhausted, no match found."),
        ScanOutcome::Stopped => println!("Scan stopped at position {}.", report.cursor),
    }
    Ok(())
}

fn open_filter(db: &Path, bloom: &BloomArgs) -> Result<Arc<TwoTierFilter>> {
    let store = SqliteStore::open(db).with_context(|| format!("Failed to open database {}", db.display()))?;
    if store.len()? == 0 {
        warn!(db = %db.display(), "target database is empty; run `keysweep import` first");
    }
    Ok(Arc::new(TwoTierFilter::new(Arc::new(store), bloom.config())?))
}

fn source_for(args: &ScanArgs) -> Result<Arc<dyn CandidateSource>> {
    Ok(Arc::new(Bitcoin::new(parse_address_type(&args.address_type)?)))
}

fn with_chunk_size(mut session: ScanSession, chunk_size: Option<u64>) -> ScanSession {
    if let Some(chunk_size) = chunk_size {
        session.config.chunk_size = chunk_size.max(1);
    }
    session
}

/// A malformed or finished checkpoint is reported and treated as absent
fn load_checkpoint(store: &CheckpointStore) -> Result<Option<keysweep_core::Checkpoint>> {
    match store.load() {
        Ok(Some(saved)) if saved.is_exhausted() => {
            info!(checkpoint = %saved, "saved range already finished");
            store.clear()?;
            Ok(None)
        }
        Ok(saved) => Ok(saved),
        Err(CheckpointError::Malformed(reason)) => {
            warn!(path = %store.path().display(), %reason, "ignoring malformed checkpoint");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn confirm_workers(args: &ScanArgs) -> Result<usize> {
    match resolve_workers(args.workers, available_workers(), args.force) {
        Err(ScanError::WorkersNeedConfirmation { requested, available }) => {
            let question = format!(
                "{} workers requested but only {} cores available. Continue? [y/N] ",
                requested, available
            );
            if io::stdin().is_terminal() && prompt(&question)?.eq_ignore_ascii_case("y") {
                Ok(requested)
            } else {
                warn!(requested, available, "using available cores; pass --force to oversubscribe");
                Ok(available.max(1))
            }
        }
        other => Ok(other?),
    }
}

fn prompt_range() -> Result<SearchRange> {
    if !io::stdin().is_terminal() {
        bail!("No checkpoint found; pass --range START-END");
    }
    Ok(SearchRange::parse(&prompt("Range to scan (START-END): ")?)?)
}

fn prompt(question: &str) -> Result<String> {
    eprint!("{}", question);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

fn print_candidate(candidate: &Candidate) {
    println!("Address:     {}", candidate.identifier);
    println!("Private Key: {}", candidate.export_secret());
}

fn print_result(result: &MatchResult, report: &ScanReport, results: &Path) {
    println!();
    println!("🎉 MATCH FOUND!");
    println!("{:-<60}", "");
    println!("Address:     {}", result.identifier);
    println!("Private Key: {}", result.secret);
    if let Some(position) = result.position {
        println!("Position:    {}", position);
    }
    println!("Reason:      {}", result.reason);
    println!("{:-<60}", "");
    println!("Time:        {:.2}s", report.elapsed.as_secs_f64());
    println!("Saved to:    {}", results.display());
}

fn parse_address_type(s: &str) -> Result<AddressType> {
    match s.to_lowercase().as_str() {
        "p2pkh" | "legacy" => Ok(AddressType::P2pkh),
        "p2wpkh" | "segwit" | "bech32" => Ok(AddressType::P2wpkh),
        _ => Err(anyhow::anyhow!("Unknown address type: {}", s)),
    }
}
