//! Position sources

use std::ops::Range;

/// Hands out key-space positions in strictly increasing order
pub trait PositionSource: Send {
    /// Next block of at most `max` positions, `None` once exhausted
    fn next_chunk(&mut self, max: u64) -> Option<Range<u128>>;

    /// First position not yet handed out
    fn frontier(&self) -> u128;

    fn next_position(&mut self) -> Option<u128> {
        self.next_chunk(1).map(|chunk| chunk.start)
    }
}

/// Finite `[start, end)` range
#[derive(Debug, Clone)]
pub struct SequentialRange {
    next: u128,
    end: u128,
}

impl SequentialRange {
    pub fn new(start: u128, end: u128) -> Self {
        Self {
            next: start.min(end),
            end,
        }
    }

    pub fn remaining(&self) -> u128 {
        self.end - self.next
    }
}

impl PositionSource for SequentialRange {
    fn next_chunk(&mut self, max: u64) -> Option<Range<u128>> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(max.max(1) as u128).min(self.end);
        self.next = end;
        Some(start..end)
    }

    fn frontier(&self) -> u128 {
        self.next
    }
}

/// Unbounded stream for random scans. Positions are a dispatch counter,
/// workers draw fresh candidates for each one.
#[derive(Debug, Clone, Default)]
pub struct RandomStream {
    next: u128,
}

impl RandomStream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PositionSource for RandomStream {
    fn next_chunk(&mut self, max: u64) -> Option<Range<u128>> {
        let start = self.next;
        let end = start.checked_add(max.max(1) as u128)?;
        self.next = end;
        Some(start..end)
    }

    fn frontier(&self) -> u128 {
        self.next
    }
}
