//! Transaction counters
//!
//! Counters are lock-free `AtomicU64`s with `Relaxed` ordering. Readers may
//! observe slightly stale values but never torn ones.

use crate::error::AbortReason;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-region transaction counters
#[derive(Debug, Default)]
pub struct TransactionMetrics {
    begun_read_write: AtomicU64,
    begun_read_only: AtomicU64,
    committed: AtomicU64,
    aborted: [AtomicU64; AbortReason::ALL.len()],
}

impl TransactionMetrics {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction start.
    pub fn record_begin(&self, read_only: bool) {
        if read_only {
            self.begun_read_only.fetch_add(1, Ordering::Relaxed);
        } else {
            self.begun_read_write.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a successful commit.
    pub fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abort.
    pub fn record_abort(&self, reason: AbortReason) {
        self.aborted[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut aborted = [0; AbortReason::ALL.len()];
        for (slot, counter) in aborted.iter_mut().zip(self.aborted.iter()) {
            *slot = counter.load(Ordering::Relaxed);
        }
        MetricsSnapshot {
            begun_read_write: self.begun_read_write.load(Ordering::Relaxed),
            begun_read_only: self.begun_read_only.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            aborted,
        }
    }
}

/// Copy of [`TransactionMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Read/write transactions begun
    pub begun_read_write: u64,
    /// Read-only transactions begun
    pub begun_read_only: u64,
    /// Transactions committed
    pub committed: u64,
    /// Aborts, indexed by [`AbortReason::index`]
    pub aborted: [u64; AbortReason::ALL.len()],
}

impl MetricsSnapshot {
    /// Aborts for one reason.
    pub fn aborted_for(&self, reason: AbortReason) -> u64 {
        self.aborted[reason.index()]
    }

    /// Aborts for every reason.
    pub fn total_aborted(&self) -> u64 {
        self.aborted.iter().sum()
    }

    /// Committed over finished, or 1.0 if nothing finished yet.
    pub fn commit_rate(&self) -> f64 {
        let finished = self.committed + self.total_aborted();
        if finished == 0 {
            1.0
        } else {
            self.committed as f64 / finished as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txs(rw={} ro={} committed={}",
            self.begun_read_write, self.begun_read_only, self.committed
        )?;
        for reason in AbortReason::ALL {
            write!(f, " {}={}", reason, self.aborted_for(reason))?;
        }
        write!(f, ")")
    }
}
