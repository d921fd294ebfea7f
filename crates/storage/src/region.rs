//! The transactional memory region
//!
//! A [`Region`] owns:
//! - the default segment, present for the region's whole life
//! - a table of dynamically allocated segments keyed by [`SegmentId`]
//! - the global version clock
//! - the registry of active transactions' read versions
//! - the table mutex, serialising allocation, retirement and sweeps
//!
//! # Thread Safety
//!
//! Lookups by id go through the sharded table and never take the table
//! mutex. Retirement flips a tombstone; once the freeing transaction ends
//! the id is stamped and queued. A sweep removes an entry only when no
//! active transaction reads at a version older than its stamp, and only
//! then is the id handed out again. Storage stays alive for as long as any
//! transaction still holds the segment.
//!
//! Lock order: table mutex, then reader registry.

use crate::reclaim::{ReaderRegistry, RetirementQueue};
use crate::segment::Segment;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stm_core::{
    MetricsSnapshot, Result, SegmentId, StmConfig, StmError, TransactionMetrics, VirtualAddress,
};
use tracing::debug;

/// Bookkeeping guarded by the table mutex
#[derive(Debug)]
struct SegmentBook {
    /// Number of dynamic ids handed out so far
    next_id: u64,
    /// Swept ids ready for reuse
    free_ids: Vec<SegmentId>,
    retired: RetirementQueue,
}

/// A transactional memory instance
pub struct Region {
    config: StmConfig,
    default: Arc<Segment>,
    table: DashMap<SegmentId, Arc<Segment>>,
    /// Global version clock. Only ever incremented.
    clock: AtomicU64,
    book: Mutex<SegmentBook>,
    readers: Mutex<ReaderRegistry>,
    metrics: TransactionMetrics,
}

impl Region {
    /// Create a region whose default segment is `config.size` bytes of
    /// `config.align`-byte fields, all zero, with the clock at 0.
    pub fn new(config: StmConfig) -> Result<Self> {
        config.validate()?;
        let default = Arc::new(Segment::new(config.size, config.align)?);
        debug!(
            size = config.size,
            align = config.align,
            sweep_threshold = config.sweep_threshold,
            "region created"
        );
        Ok(Self {
            book: Mutex::new(SegmentBook {
                next_id: 0,
                free_ids: Vec::new(),
                retired: RetirementQueue::new(config.sweep_threshold),
            }),
            config,
            default,
            table: DashMap::new(),
            clock: AtomicU64::new(0),
            readers: Mutex::new(ReaderRegistry::new()),
            metrics: TransactionMetrics::new(),
        })
    }

    /// Configuration the region was created with.
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Field width shared by every segment.
    pub fn align(&self) -> usize {
        self.config.align
    }

    /// Size of the default segment in bytes.
    pub fn size(&self) -> usize {
        self.default.size()
    }

    /// Address of byte 0 of the default segment.
    pub fn start(&self) -> VirtualAddress {
        VirtualAddress::segment_start(SegmentId::DEFAULT)
    }

    // ========================================================================
    // Version clock
    // ========================================================================

    /// Current value of the global clock.
    #[inline]
    pub fn global_clock(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Increment the global clock and return the new value.
    ///
    /// Every increment is a single read-modify-write on one atomic, so the
    /// returned values form a total order across all threads.
    #[inline]
    pub fn advance_clock(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ========================================================================
    // Active transactions
    // ========================================================================

    /// Sample the clock as the read version of a new transaction and
    /// register it until [`unregister_reader`](Self::unregister_reader).
    pub fn register_reader(&self) -> u64 {
        let mut readers = self.readers.lock();
        let rv = self.global_clock();
        readers.register(rv);
        rv
    }

    /// Forget a transaction registered at `rv`.
    pub fn unregister_reader(&self, rv: u64) {
        self.readers.lock().unregister(rv);
    }

    /// Number of registered transactions.
    pub fn active_transactions(&self) -> usize {
        self.readers.lock().len()
    }

    // ========================================================================
    // Segment table
    // ========================================================================

    /// Segment an address points into.
    ///
    /// The default segment is returned for [`SegmentId::DEFAULT`]; other ids
    /// are looked up in the table without taking the table mutex.
    pub fn resolve_segment(&self, address: VirtualAddress) -> Result<Arc<Segment>> {
        let id = address.segment();
        if id.is_default() {
            return Ok(Arc::clone(&self.default));
        }
        self.table
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StmError::UnknownSegment(id))
    }

    /// Segment an address points into, as seen by a transaction reading
    /// at `rv`.
    ///
    /// A retired segment is only visible to transactions that began before
    /// its retirement took effect.
    pub fn resolve_segment_at(&self, address: VirtualAddress, rv: u64) -> Result<Arc<Segment>> {
        let segment = self.resolve_segment(address)?;
        if !segment.is_reachable_at(rv) {
            return Err(StmError::UnknownSegment(address.segment()));
        }
        Ok(segment)
    }

    /// Allocate a zeroed segment of `size` bytes and publish it under a
    /// fresh or recycled id.
    pub fn allocate_segment(&self, size: usize) -> Result<SegmentId> {
        let segment = Arc::new(Segment::new(size, self.config.align)?);

        let mut book = self.book.lock();
        let id = match book.free_ids.pop() {
            Some(id) => id,
            None => {
                let id = SegmentId::dynamic(book.next_id)?;
                book.next_id += 1;
                id
            }
        };
        self.table.insert(id, segment);
        drop(book);

        debug!(segment = %id, size, "segment allocated");
        Ok(id)
    }

    /// Tombstone a dynamic segment.
    ///
    /// The segment stays usable until its retirement is scheduled with
    /// [`schedule_retirements`](Self::schedule_retirements).
    pub fn tombstone_segment(&self, id: SegmentId) -> Result<()> {
        if id.is_default() {
            return Err(StmError::InvalidOperation(
                "the default segment cannot be freed".to_string(),
            ));
        }
        let segment = self
            .table
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StmError::UnknownSegment(id))?;
        if !segment.mark_to_delete() {
            return Err(StmError::InvalidOperation(format!(
                "segment {} already freed",
                id
            )));
        }
        Ok(())
    }

    /// Stamp tombstoned segments with a fresh clock value and queue them,
    /// sweeping if a batch is complete.
    ///
    /// Transactions that began before the stamp may still reach the
    /// segments and hold back their reclamation. Later ones cannot
    /// resolve them.
    pub fn schedule_retirements(&self, ids: &[SegmentId]) {
        if ids.is_empty() {
            return;
        }
        let mut book = self.book.lock();
        // Stamped under the registry lock so a transaction registering
        // later always observes the stamp.
        let readers = self.readers.lock();
        let stamp = self.advance_clock();
        for &id in ids {
            if let Some(entry) = self.table.get(&id) {
                entry.value().set_retired_at(stamp);
            }
        }
        drop(readers);

        let mut sweep_due = false;
        for &id in ids {
            sweep_due |= book.retired.retire(id, stamp);
        }
        debug!(
            count = ids.len(),
            stamp,
            pending = book.retired.pending(),
            "segments retired"
        );

        if sweep_due {
            self.sweep_locked(&mut book);
        }
    }

    /// Tombstone and retire a dynamic segment at once.
    pub fn retire_segment(&self, id: SegmentId) -> Result<()> {
        self.tombstone_segment(id)?;
        self.schedule_retirements(&[id]);
        Ok(())
    }

    /// Sweep every retired segment no active transaction can still reach,
    /// regardless of batch size.
    pub fn sweep(&self) -> usize {
        let mut book = self.book.lock();
        self.sweep_locked(&mut book)
    }

    fn sweep_locked(&self, book: &mut SegmentBook) -> usize {
        let oldest_reader = self.readers.lock().oldest();
        let ids = book.retired.drain_reclaimable(oldest_reader);
        for id in &ids {
            self.table.remove(id);
        }
        book.free_ids.extend(ids.iter().copied());
        debug!(
            swept = ids.len(),
            held_back = book.retired.pending(),
            live = self.table.len(),
            retired_total = book.retired.retired_total(),
            swept_total = book.retired.swept_total(),
            "retired segments swept"
        );
        ids.len()
    }

    /// Dynamic segments still in the table, retired-but-unswept included.
    pub fn segment_count(&self) -> usize {
        self.table.len()
    }

    /// Retired segments awaiting a sweep.
    pub fn pending_retirements(&self) -> usize {
        self.book.lock().retired.pending()
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Transaction counters of this region.
    pub fn metrics(&self) -> &TransactionMetrics {
        &self.metrics
    }

    /// Point-in-time copy of the transaction counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        debug!(
            clock = self.global_clock(),
            segments = self.table.len(),
            metrics = %self.metrics.snapshot(),
            "region destroyed"
        );
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("size", &self.size())
            .field("align", &self.align())
            .field("clock", &self.global_clock())
            .field("segments", &self.segment_count())
            .finish()
    }
}
