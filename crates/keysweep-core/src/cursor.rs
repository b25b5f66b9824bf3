//! Live scan position
//!
//! A u128 does not fit one atomic word, so the position is split into two
//! halves guarded by a sequence counter. The scheduler is the only writer;
//! the monitor and checkpoint writer read consistent snapshots.

use std::hint;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct CursorCell {
    /// Even when stable, odd while a write is in progress, 0 before the first write
    seq: AtomicU64,
    hi: AtomicU64,
    lo: AtomicU64,
}

/// Create a cursor pair in the "not yet started" state
pub fn scan_cursor() -> (CursorWriter, CursorReader) {
    let cell = Arc::new(CursorCell::default());
    (CursorWriter { cell: cell.clone() }, CursorReader { cell })
}

/// The single writing side
#[derive(Debug)]
pub struct CursorWriter {
    cell: Arc<CursorCell>,
}

impl CursorWriter {
    pub fn publish(&self, position: u128) {
        let seq = self.cell.seq.load(Ordering::Relaxed);
        self.cell.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.cell.hi.store((position >> 64) as u64, Ordering::Relaxed);
        self.cell.lo.store(position as u64, Ordering::Relaxed);

        self.cell.seq.store(seq.wrapping_add(2), Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct CursorReader {
    cell: Arc<CursorCell>,
}

impl CursorReader {
    /// Latest published position, or `None` before the first publish
    pub fn snapshot(&self) -> Option<u128> {
        loop {
            let before = self.cell.seq.load(Ordering::Acquire);
            if before == 0 {
                return None;
            }
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }

            let hi = self.cell.hi.load(Ordering::Relaxed);
            let lo = self.cell.lo.load(Ordering::Relaxed);
            fence(Ordering::Acquire);

            if self.cell.seq.load(Ordering::Relaxed) == before {
                return Some(((hi as u128) << 64) | lo as u128);
            }
        }
    }
}
