//! Transaction context
//!
//! A [`TransactionContext`] lives for exactly one begin/end pair. It holds
//! the read version sampled at begin, the read and write sets (read/write
//! transactions only) and a pin on every segment it has resolved.
//!
//! The read version is registered with the region for the context's whole
//! life, which keeps segments this transaction may still reach from being
//! swept. Segments freed by the transaction are only scheduled for
//! retirement once it has ended.
//!
//! Any failure inside an active transaction tears the context down: the
//! sets are released, the pins dropped and the status moves to
//! [`TransactionStatus::Aborted`]. Later calls report
//! [`StmError::TransactionNotActive`]. The engine never retries.

use crate::tl2;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use stm_core::{AbortReason, ReadSet, Result, SegmentId, StmError, VirtualAddress, WriteSet};
use stm_storage::{Region, Segment};
use tracing::trace;

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Committed at the given version
    Committed {
        /// Write version, or the read version for read-only transactions
        version: u64,
    },
    /// Torn down
    Aborted {
        /// What ended the transaction
        reason: AbortReason,
    },
}

/// Per-transaction state
pub struct TransactionContext<'r> {
    pub(crate) region: &'r Region,
    read_only: bool,
    /// Global clock value when the transaction began
    pub(crate) rv: u64,
    pub(crate) read_set: ReadSet,
    pub(crate) write_set: WriteSet,
    /// Segments resolved so far, kept alive until the context is dropped
    pinned: FxHashMap<SegmentId, Arc<Segment>>,
    /// Segments tombstoned by this transaction
    freed: Vec<SegmentId>,
    /// Whether `rv` is still registered with the region
    registered: bool,
    status: TransactionStatus,
}

impl<'r> TransactionContext<'r> {
    /// Start a transaction by sampling the global clock.
    ///
    /// The sampled read version stays registered with the region until the
    /// context commits, aborts or is dropped.
    pub fn begin(region: &'r Region, read_only: bool) -> Self {
        region.metrics().record_begin(read_only);
        let (read_set, write_set) = if read_only {
            (ReadSet::default(), WriteSet::default())
        } else {
            let config = region.config();
            (
                ReadSet::with_capacity(config.read_set_capacity),
                WriteSet::with_capacity(config.write_set_capacity),
            )
        };
        Self {
            region,
            read_only,
            rv: region.register_reader(),
            read_set,
            write_set,
            pinned: FxHashMap::default(),
            freed: Vec::new(),
            registered: true,
            status: TransactionStatus::Active,
        }
    }

    /// Region this transaction runs against.
    pub fn region(&self) -> &'r Region {
        self.region
    }

    /// Whether this is a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read version sampled at begin.
    pub fn read_version(&self) -> u64 {
        self.rv
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether the transaction still accepts operations.
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Number of recorded reads.
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Resolve and pin the segment `address` points into.
    ///
    /// Segments retired before this transaction began are not visible.
    pub fn segment(&mut self, address: VirtualAddress) -> Result<Arc<Segment>> {
        let id = address.segment();
        if let Some(segment) = self.pinned.get(&id) {
            return Ok(Arc::clone(segment));
        }
        let segment = self.region.resolve_segment_at(address, self.rv)?;
        self.pinned.insert(id, Arc::clone(&segment));
        Ok(segment)
    }

    /// Segment of an address this transaction has already resolved.
    pub(crate) fn pinned(&self, address: VirtualAddress) -> Result<&Segment> {
        self.pinned
            .get(&address.segment())
            .map(|segment| &**segment)
            .ok_or(StmError::UnknownSegment(address.segment()))
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StmError::TransactionNotActive)
        }
    }

    /// Read `out.len()` bytes starting at `source`.
    ///
    /// The range must be a whole number of fields inside one segment. On
    /// error the transaction is aborted and the contents of `out` are
    /// unspecified.
    pub fn read(&mut self, source: VirtualAddress, out: &mut [u8]) -> Result<()> {
        self.ensure_active()?;
        let result = self.read_fields(source, out);
        self.settle(result)
    }

    fn read_fields(&mut self, source: VirtualAddress, out: &mut [u8]) -> Result<()> {
        let segment = self.segment(source)?;
        segment.check_access(source, out.len())?;
        let align = segment.align();
        for (i, chunk) in out.chunks_exact_mut(align).enumerate() {
            let address = source.add((i * align) as u64)?;
            if self.read_only {
                tl2::load_ro(self, &segment, address, chunk)?;
            } else {
                tl2::load(self, &segment, address, chunk)?;
            }
        }
        Ok(())
    }

    /// Buffer `source` for writing at `target` on commit.
    ///
    /// Nothing becomes visible to other transactions before commit.
    pub fn write(&mut self, source: &[u8], target: VirtualAddress) -> Result<()> {
        self.ensure_active()?;
        let result = self.write_fields(source, target);
        self.settle(result)
    }

    fn write_fields(&mut self, source: &[u8], target: VirtualAddress) -> Result<()> {
        if self.read_only {
            return Err(StmError::InvalidOperation(
                "write in a read-only transaction".to_string(),
            ));
        }
        let segment = self.segment(target)?;
        segment.check_access(target, source.len())?;
        let align = segment.align();
        for (i, chunk) in source.chunks_exact(align).enumerate() {
            tl2::store(self, &segment, chunk, target.add((i * align) as u64)?)?;
        }
        Ok(())
    }

    /// Allocate a zeroed segment of `size` bytes, returning its first byte.
    ///
    /// Allocation takes effect immediately and is not undone if the
    /// transaction later aborts. Failure leaves the transaction active.
    pub fn alloc(&mut self, size: usize) -> Result<VirtualAddress> {
        self.ensure_active()?;
        let id = self.region.allocate_segment(size)?;
        Ok(VirtualAddress::segment_start(id))
    }

    /// Free the segment starting at `address`.
    ///
    /// The segment is tombstoned at once and its retirement scheduled when
    /// the transaction ends, whether it commits or aborts. Like
    /// [`alloc`](Self::alloc), this is outside the transaction's atomicity.
    /// Failure leaves the transaction active.
    pub fn free(&mut self, address: VirtualAddress) -> Result<()> {
        self.ensure_active()?;
        if address.offset() != 0 {
            return Err(StmError::InvalidOperation(format!(
                "{} is not the start of a segment",
                address
            )));
        }
        let id = address.segment();
        self.region.tombstone_segment(id)?;
        self.freed.push(id);
        Ok(())
    }

    /// End the transaction.
    ///
    /// Read-only transactions always commit at their read version.
    /// Read/write transactions run the TL2 commit and return the write
    /// version. Either way the sets and pins are released and the context
    /// no longer accepts operations.
    pub fn commit(&mut self) -> Result<u64> {
        self.ensure_active()?;
        let result = if self.read_only {
            Ok(self.rv)
        } else {
            tl2::commit(self)
        };
        let version = self.settle(result)?;
        self.release();
        self.status = TransactionStatus::Committed { version };
        self.region.metrics().record_commit();
        Ok(version)
    }

    /// Drop the sets and pins, unregister, then schedule freed segments.
    fn release(&mut self) {
        self.read_set.clear();
        self.write_set.clear();
        self.pinned.clear();
        if self.registered {
            self.registered = false;
            self.region.unregister_reader(self.rv);
            let freed = std::mem::take(&mut self.freed);
            self.region.schedule_retirements(&freed);
        }
    }

    /// Tear the context down if `result` is an error.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            let reason = err.abort_reason().unwrap_or(AbortReason::Misuse);
            trace!(
                rv = self.rv,
                read_only = self.read_only,
                reason = %reason,
                error = %err,
                "transaction aborted"
            );
            self.region.metrics().record_abort(reason);
            self.release();
            self.status = TransactionStatus::Aborted { reason };
        }
        result
    }
}

impl Drop for TransactionContext<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TransactionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("read_only", &self.read_only)
            .field("rv", &self.rv)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("status", &self.status)
            .finish()
    }
}
