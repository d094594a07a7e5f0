use std::time::{Duration, Instant};

use crate::model::Progress;

const MEBIBYTE: f64 = 1024.0 * 1024.0;

/// Turns a byte count into a progress value. A missing or zero total is
/// reported as indeterminate.
pub fn progress_for(bytes: u64, total: Option<u64>) -> Progress {
    match total {
        Some(total) if total > 0 => {
            let pct = (u128::from(bytes) * 100 / u128::from(total)).min(100);
            Progress::Percent(pct as u8)
        }
        _ => Progress::Indeterminate { bytes },
    }
}

/// Cumulative throughput in MB/s with two decimals, or `None` before any
/// measurable time has passed.
pub fn throughput_for(bytes: u64, elapsed: Duration) -> Option<String> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    Some(format!("{:.2} MB/s", bytes as f64 / MEBIBYTE / secs))
}

/// Per-job bookkeeping: bytes so far against the announced total, timed
/// from job start.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    total: Option<u64>,
    bytes: u64,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            total: total.filter(|t| *t > 0),
            bytes: 0,
        }
    }

    pub fn record(&mut self, chunk_len: usize) {
        self.bytes += chunk_len as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn progress(&self) -> Progress {
        progress_for(self.bytes, self.total)
    }

    pub fn throughput(&self) -> Option<String> {
        throughput_for(self.bytes, self.started.elapsed())
    }
}
