//! Deferred segment reclamation
//!
//! Freeing a segment only tombstones it. When the freeing transaction ends
//! the id is queued in a [`RetirementQueue`], stamped with a fresh value
//! of the global clock. Every transaction that could still reach the
//! segment reads at a version below that stamp.
//!
//! A [`ReaderRegistry`] tracks the read version of every active
//! transaction. A sweep only reclaims retirements whose stamp is no newer
//! than the oldest active read version; the rest stay queued for a later
//! sweep. Reclaimed ids go back to the region for reuse.
//!
//! Storage itself is released when the last `Arc<Segment>` goes away, so a
//! transaction that pinned a segment keeps it alive even past a sweep.

use std::collections::BTreeMap;
use stm_core::SegmentId;

/// Read versions of the active transactions of a region
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    /// Active transactions per read version
    active: BTreeMap<u64, usize>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction reading at `rv`.
    pub fn register(&mut self, rv: u64) {
        *self.active.entry(rv).or_insert(0) += 1;
    }

    /// Forget one transaction reading at `rv`.
    pub fn unregister(&mut self, rv: u64) {
        if let Some(count) = self.active.get_mut(&rv) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(&rv);
            }
        }
    }

    /// Oldest read version still in use.
    pub fn oldest(&self) -> Option<u64> {
        self.active.keys().next().copied()
    }

    /// Number of active transactions.
    pub fn len(&self) -> usize {
        self.active.values().sum()
    }

    /// Whether no transaction is active.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Retired segments awaiting a sweep
#[derive(Debug)]
pub struct RetirementQueue {
    /// Retired ids with the clock value they were retired at
    pending: Vec<(SegmentId, u64)>,
    threshold: usize,
    since_sweep: usize,
    retired_total: u64,
    swept_total: u64,
}

impl RetirementQueue {
    /// Create a queue that asks for a sweep every `threshold` retirements.
    pub fn new(threshold: usize) -> Self {
        Self {
            pending: Vec::new(),
            threshold: threshold.max(1),
            since_sweep: 0,
            retired_total: 0,
            swept_total: 0,
        }
    }

    /// Queue a segment retired at clock value `stamp`. Returns `true` when
    /// a sweep is due.
    pub fn retire(&mut self, id: SegmentId, stamp: u64) -> bool {
        self.pending.push((id, stamp));
        self.retired_total += 1;
        self.since_sweep += 1;
        self.since_sweep >= self.threshold
    }

    /// Take every queued id no transaction can still reach.
    ///
    /// `oldest_reader` is the oldest active read version, if any. A
    /// retirement is reclaimable once no active transaction reads at a
    /// version older than its stamp.
    pub fn drain_reclaimable(&mut self, oldest_reader: Option<u64>) -> Vec<SegmentId> {
        self.since_sweep = 0;
        let mut reclaimed = Vec::new();
        self.pending.retain(|&(id, stamp)| {
            let reachable = oldest_reader.is_some_and(|rv| rv < stamp);
            if !reachable {
                reclaimed.push(id);
            }
            reachable
        });
        self.swept_total += reclaimed.len() as u64;
        reclaimed
    }

    /// Retired but not yet swept.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Retirements since creation.
    pub fn retired_total(&self) -> u64 {
        self.retired_total
    }

    /// Segments swept since creation.
    pub fn swept_total(&self) -> u64 {
        self.swept_total
    }
}
