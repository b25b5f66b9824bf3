//! Progress monitor

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::cancel::Cancellation;
use crate::cursor::CursorReader;
use crate::session::ScanSession;

/// One progress sample
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Cursor at sample time
    pub position: Option<u128>,
    /// Positions completed since the start of the original range
    pub total: u128,
    /// Positions per second since the previous sample
    pub rate: f64,
    pub elapsed: Duration,
    /// Sequential scans only, and only once a rate is known
    pub eta: Option<Duration>,
}

impl ProgressReport {
    /// Get formatted progress string
    pub fn format(&self) -> String {
        let eta = match self.eta {
            Some(eta) => format_duration(eta.as_secs_f64()),
            None => "-".to_string(),
        };

        format!(
            "[{}key/s][Total {}][Elapsed {}][ETA {}]",
            format_count(self.rate),
            format_count(self.total as f64),
            format_duration(self.elapsed.as_secs_f64()),
            eta
        )
    }
}

/// Throughput between consecutive samples
#[derive(Debug, Default)]
pub struct RateSampler {
    last: Option<(u128, Instant)>,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` at `now` and return the rate since the previous sample.
    /// The first sample, an unchanged position, or zero elapsed time give 0.
    pub fn sample(&mut self, current: u128, now: Instant) -> f64 {
        let rate = match self.last {
            Some((previous, at)) => {
                let seconds = now.saturating_duration_since(at).as_secs_f64();
                let delta = current.saturating_sub(previous);
                if seconds > 0.0 {
                    delta as f64 / seconds
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.last = Some((current, now));
        rate
    }
}

/// Samples the cursor on a fixed interval
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    cursor: CursorReader,
    origin: u128,
    end: Option<u128>,
    started_at: Instant,
    interval: Duration,
}

impl ProgressMonitor {
    pub fn new(cursor: CursorReader, session: &ScanSession) -> Self {
        Self {
            cursor,
            origin: session.origin,
            end: session.end(),
            started_at: session.started_at,
            interval: session.config.monitor_interval,
        }
    }

    /// Take one sample
    pub fn report(&self, sampler: &mut RateSampler, now: Instant) -> ProgressReport {
        let position = self.cursor.snapshot();
        let current = position.unwrap_or(self.origin);
        let rate = sampler.sample(current, now);

        let eta = match self.end {
            Some(end) if rate > 0.0 => {
                let remaining = end.saturating_sub(current) as f64;
                Duration::try_from_secs_f64(remaining / rate).ok()
            }
            _ => None,
        };

        ProgressReport {
            position,
            total: current.saturating_sub(self.origin),
            rate,
            elapsed: now.saturating_duration_since(self.started_at),
            eta,
        }
    }

    /// Report every interval until cancellation or until `stop` closes
    pub fn run<F>(&self, cancel: &Cancellation, stop: &Receiver<()>, mut sink: F)
    where
        F: FnMut(&ProgressReport),
    {
        let mut sampler = RateSampler::new();
        // Prime so the first printed rate covers a full interval
        sampler.sample(self.cursor.snapshot().unwrap_or(self.origin), Instant::now());

        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            if cancel.is_set() {
                break;
            }
            sink(&self.report(&mut sampler, Instant::now()));
        }
    }
}

fn format_count(count: f64) -> String {
    if count >= 1e12 {
        format!("{:.2}T", count / 1e12)
    } else if count >= 1e9 {
        format!("{:.2}G", count / 1e9)
    } else if count >= 1e6 {
        format!("{:.2}M", count / 1e6)
    } else if count >= 1e3 {
        format!("{:.2}K", count / 1e3)
    } else {
        format!("{:.0}", count)
    }
}

fn format_duration(seconds: f64) -> String {
    if seconds <= 0.0 {
        return "now".to_string();
    }
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.0}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.0}m", seconds / 60.0)
    } else if seconds < 86400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else if seconds < 86400.0 * 365.0 {
        format!("{:.1}d", seconds / 86400.0)
    } else {
        format!("{:.1}y", seconds / (86400.0 * 365.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::scan_cursor;
    use crate::session::{PoolKind, SearchRange};
    use crossbeam_channel::bounded;

    #[test]
    fn test_unchanged_position_is_zero_rate() {
        let mut sampler = RateSampler::new();
        let t0 = Instant::now();
        assert_eq!(sampler.sample(500, t0), 0.0);
        assert_eq!(sampler.sample(500, t0 + Duration::from_secs(2)), 0.0);
    }

    #[test]
    fn test_zero_elapsed_does_not_divide() {
        let mut sampler = RateSampler::new();
        let t0 = Instant::now();
        sampler.sample(0, t0);
        assert_eq!(sampler.sample(1_000, t0), 0.0);
    }

    #[test]
    fn test_rate_uses_measured_time() {
        let mut sampler = RateSampler::new();
        let t0 = Instant::now();
        sampler.sample(1_000, t0);
        let rate = sampler.sample(5_000, t0 + Duration::from_secs(4));
        assert!((rate - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_eta_and_total() {
        let (writer, reader) = scan_cursor();
        let session = ScanSession::new(SearchRange::Sequential { start: 100, end: 1_100 }, 1, PoolKind::Threads);
        let monitor = ProgressMonitor::new(reader, &session);
        let mut sampler = RateSampler::new();
        let t0 = Instant::now();

        writer.publish(100);
        let first = monitor.report(&mut sampler, t0);
        assert_eq!(first.total, 0);
        assert_eq!(first.eta, None);

        writer.publish(600);
        let second = monitor.report(&mut sampler, t0 + Duration::from_secs(5));
        assert_eq!(second.total, 500);
        assert!((second.rate - 100.0).abs() < 1e-9);
        assert_eq!(second.eta, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_random_scan_has_no_eta() {
        let (writer, reader) = scan_cursor();
        let session = ScanSession::new(SearchRange::Random, 1, PoolKind::Threads);
        let monitor = ProgressMonitor::new(reader, &session);
        let mut sampler = RateSampler::new();
        let t0 = Instant::now();

        writer.publish(0);
        monitor.report(&mut sampler, t0);
        writer.publish(10_000);
        let report = monitor.report(&mut sampler, t0 + Duration::from_secs(1));
        assert_eq!(report.total, 10_000);
        assert_eq!(report.eta, None);
    }

    #[test]
    fn test_run_stops_on_cancellation() {
        let (_writer, reader) = scan_cursor();
        let mut session = ScanSession::new(SearchRange::Random, 1, PoolKind::Threads);
        session.config.monitor_interval = Duration::from_millis(5);
        let monitor = ProgressMonitor::new(reader, &session);

        let cancel = Cancellation::in_process();
        let (_stop_tx, stop_rx) = bounded::<()>(0);
        let mut reports = 0;
        monitor.run(&cancel, &stop_rx, |_| {
            reports += 1;
            if reports == 3 {
                cancel.set();
            }
        });
        assert_eq!(reports, 3);
    }

    #[test]
    fn test_format() {
        let report = ProgressReport {
            position: Some(1_500_000),
            total: 1_500_000,
            rate: 2_500.0,
            elapsed: Duration::from_secs(120),
            eta: None,
        };
        assert_eq!(report.format(), "[2.50Kkey/s][Total 1.50M][Elapsed 2m][ETA -]");
    }
}
