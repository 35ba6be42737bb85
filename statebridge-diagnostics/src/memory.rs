//! Memory trend probe.
//!
//! A heuristic leak detector: resident memory is sampled at a fixed interval
//! into a rolling window, and growth from the oldest to the newest sample is
//! compared against a threshold.

use serde::Serialize;
use statebridge_types::Timestamp;
use std::collections::VecDeque;

/// Source of resident memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Current resident set size in bytes, if it can be read.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads resident pages from `/proc/self/statm`. Returns `None` on platforms
/// without procfs.
#[derive(Debug, Clone, Copy)]
pub struct StatmProbe {
    page_size: u64,
}

impl StatmProbe {
    /// A probe assuming 4 KiB pages.
    #[must_use]
    pub fn new() -> Self {
        Self { page_size: 4096 }
    }

    /// A probe for a different page size.
    #[must_use]
    pub fn with_page_size(page_size: u64) -> Self {
        Self { page_size }
    }

    fn parse(contents: &str, page_size: u64) -> Option<u64> {
        let resident: u64 = contents.split_whitespace().nth(1)?.parse().ok()?;
        resident.checked_mul(page_size)
    }
}

impl Default for StatmProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for StatmProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
        Self::parse(&contents, self.page_size)
    }
}

/// One memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySample {
    pub timestamp: Timestamp,
    pub resident_bytes: u64,
}

/// Rolling window of memory samples.
#[derive(Debug, Clone)]
pub struct MemoryTrend {
    samples: VecDeque<MemorySample>,
    window: usize,
}

impl MemoryTrend {
    /// An empty trend over `window` samples, at least two.
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Records a sample, dropping the oldest once the window is full.
    pub fn push(&mut self, resident_bytes: u64) {
        while self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(MemorySample {
            timestamp: Timestamp::now(),
            resident_bytes,
        });
    }

    /// True once the window holds `window` samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.window
    }

    /// Growth from the oldest to the newest sample. Zero if memory shrank or
    /// fewer than two samples exist.
    pub fn growth(&self) -> u64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.resident_bytes.saturating_sub(first.resident_bytes),
            _ => 0,
        }
    }

    /// Returns the growth if the window is full and it exceeds `threshold`.
    pub fn exceeds(&self, threshold: u64) -> Option<u64> {
        let growth = self.growth();
        (self.is_full() && growth > threshold).then_some(growth)
    }

    /// The newest sample.
    #[must_use]
    pub fn latest(&self) -> Option<MemorySample> {
        self.samples.back().copied()
    }

    /// Drops all but the newest sample so the next warning needs a fresh
    /// window of growth.
    pub fn restart(&mut self) {
        while self.samples.len() > 1 {
            self.samples.pop_front();
        }
    }

    /// Oldest-first copy of the samples.
    #[must_use]
    pub fn samples(&self) -> Vec<MemorySample> {
        self.samples.iter().copied().collect()
    }

    /// Configured window length.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statm_resident_pages() {
        assert_eq!(StatmProbe::parse("1000 250 30 1 0 80 0\n", 4096), Some(250 * 4096));
        assert_eq!(StatmProbe::parse("1000", 4096), None);
        assert_eq!(StatmProbe::parse("a b c", 4096), None);
    }
}
