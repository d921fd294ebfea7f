//! Transactional Locking II
//!
//! Reads are optimistic and validated against per-field write versions;
//! writes are buffered in the transaction and published at commit.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Deduplicate write-set targets
//! 2. Lock every target (free→locked); any failure releases and aborts
//! 3. wv = ++global_clock
//! 4. Validate the read set against rv; failure releases and aborts
//! 5. Write buffered values, stamp each field with wv
//! 6. Release every lock
//! ```
//!
//! Locks are taken before the clock moves and the read set is validated
//! after it moves. A concurrent reader therefore either sees the old value
//! together with a held lock (and aborts) or the complete new value with
//! its new version. No partial commit is ever observable.

use crate::transaction::TransactionContext;
use stm_core::{AbortReason, Result, StmError, VirtualAddress};
use stm_storage::Segment;

/// Read one field in a read/write transaction.
///
/// Fields this transaction already wrote are served from the write set.
/// Otherwise the field is copied from shared memory and checked: it must be
/// unlocked, unchanged during the copy and no newer than the read version.
/// The address joins the read set on success.
pub fn load(
    tx: &mut TransactionContext<'_>,
    segment: &Segment,
    source: VirtualAddress,
    out: &mut [u8],
) -> Result<()> {
    if let Some(buffered) = tx.write_set.find_last(source) {
        out.copy_from_slice(buffered);
    } else {
        let index = segment.field_index(source)?;
        let before = segment.version(index);
        segment.read_field(index, out);
        if segment.is_locked(index) {
            return Err(StmError::Aborted(AbortReason::LockedRead));
        }
        let after = segment.version(index);
        if after != before || after > tx.rv {
            return Err(StmError::Aborted(AbortReason::StaleRead));
        }
    }
    tx.read_set.push(source);
    Ok(())
}

/// Read one field in a read-only transaction.
///
/// Only the point-in-time check is needed; nothing is recorded.
pub fn load_ro(
    tx: &TransactionContext<'_>,
    segment: &Segment,
    source: VirtualAddress,
    out: &mut [u8],
) -> Result<()> {
    let index = segment.field_index(source)?;
    segment.read_field(index, out);
    if segment.is_locked(index) {
        return Err(StmError::Aborted(AbortReason::LockedRead));
    }
    if segment.version(index) > tx.rv {
        return Err(StmError::Aborted(AbortReason::StaleRead));
    }
    Ok(())
}

/// Buffer one field's worth of bytes for `target`.
///
/// Shared memory is untouched and no lock is taken.
pub fn store(
    tx: &mut TransactionContext<'_>,
    segment: &Segment,
    source: &[u8],
    target: VirtualAddress,
) -> Result<()> {
    segment.field_index(target)?;
    if source.len() != segment.align() {
        return Err(StmError::InvalidLength {
            len: source.len(),
            align: segment.align(),
        });
    }
    tx.write_set.push(target, source);
    Ok(())
}

/// Field locks held by a committing transaction, released on drop.
struct HeldLocks<'s> {
    fields: Vec<(&'s Segment, usize)>,
}

impl<'s> HeldLocks<'s> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    fn acquire(&mut self, segment: &'s Segment, index: usize) -> bool {
        if segment.try_lock(index) {
            self.fields.push((segment, index));
            true
        } else {
            false
        }
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        for (segment, index) in self.fields.drain(..) {
            segment.unlock(index);
        }
    }
}

/// Commit a read/write transaction, returning its write version.
pub fn commit(tx: &TransactionContext<'_>) -> Result<u64> {
    let targets = tx.write_set.dedup_targets();
    let mut held = HeldLocks::with_capacity(targets.len());
    for &target in &targets {
        let segment = tx.pinned(target)?;
        let index = segment.field_index(target)?;
        if !held.acquire(segment, index) {
            return Err(StmError::Aborted(AbortReason::LockContention));
        }
    }

    let wv = tx.region.advance_clock();

    for source in tx.read_set.iter() {
        let segment = tx.pinned(source)?;
        let index = segment.field_index(source)?;
        let owned = targets.binary_search(&source).is_ok();
        if (!owned && segment.is_locked(index)) || segment.version(index) > tx.rv {
            return Err(StmError::Aborted(AbortReason::ReadSetInvalidated));
        }
    }

    for (target, value) in tx.write_set.iter() {
        let segment = tx.pinned(target)?;
        let index = segment.field_index(target)?;
        segment.write_field(index, value);
        segment.set_version(index, wv);
    }

    drop(held);
    Ok(wv)
}
