//! Segments: fixed-size arrays of versioned, lockable fields
//!
//! A [`Segment`] backs one contiguous allocation of transactional memory.
//! It is split into `size / align` fields; every field carries its own lock
//! flag and write-version counter.
//!
//! All state is stored in atomics, so concurrent readers racing a committer
//! never read torn memory at the language level. Consistency of a field's
//! bytes is established by the version/lock double-check in the TL2 engine:
//!
//! - committers store data bytes with `Release` while holding the field
//!   lock, then publish the new version, then unlock with `Release`
//! - readers load the version with `Acquire`, copy the bytes with `Acquire`,
//!   then reload lock and version with `Acquire`
//!
//! A reader that observes any byte of an in-progress commit therefore also
//! observes the lock held or the bumped version.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use stm_core::{check_segment_size, Result, StmError, VirtualAddress};

/// A fixed-size block of fields
pub struct Segment {
    size: usize,
    align: usize,
    data: Box<[AtomicU8]>,
    locks: Box<[AtomicBool]>,
    versions: Box<[AtomicU64]>,
    to_delete: AtomicBool,
    /// Clock value the retirement took effect at, `u64::MAX` until then
    retired_at: AtomicU64,
}

/// Allocate `len` zeroed atomics, reporting allocation failure instead of
/// aborting the process.
fn zeroed<T>(len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(len)
        .map_err(|_| StmError::OutOfMemory {
            requested: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    slots.resize_with(len, init);
    Ok(slots.into_boxed_slice())
}

impl Segment {
    /// Create a zero-initialised segment of `size` bytes with `align`-byte
    /// fields. Every lock is free and every version is 0.
    pub fn new(size: usize, align: usize) -> Result<Self> {
        check_segment_size(size, align)?;
        let fields = size / align;
        Ok(Self {
            size,
            align,
            data: zeroed(size, || AtomicU8::new(0))?,
            locks: zeroed(fields, || AtomicBool::new(false))?,
            versions: zeroed(fields, || AtomicU64::new(0))?,
            to_delete: AtomicBool::new(false),
            retired_at: AtomicU64::new(u64::MAX),
        })
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Field width in bytes.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Number of fields.
    pub fn fields(&self) -> usize {
        self.versions.len()
    }

    /// Check that `len` bytes starting at `address` are a whole number of
    /// fields inside this segment.
    pub fn check_access(&self, address: VirtualAddress, len: usize) -> Result<()> {
        if len == 0 || len % self.align != 0 {
            return Err(StmError::InvalidLength {
                len,
                align: self.align,
            });
        }
        let offset = address.offset();
        if offset % self.align as u64 != 0 {
            return Err(StmError::Misaligned {
                address,
                align: self.align,
            });
        }
        if offset.saturating_add(len as u64) > self.size as u64 {
            return Err(StmError::OutOfBounds {
                segment: address.segment(),
                offset,
                len,
                size: self.size as u64,
            });
        }
        Ok(())
    }

    /// Index of the field `address` points at.
    #[inline]
    pub fn field_index(&self, address: VirtualAddress) -> Result<usize> {
        self.check_access(address, self.align)?;
        Ok((address.offset() / self.align as u64) as usize)
    }

    /// Backing bytes of the field `address` points at.
    pub fn physical_location(&self, address: VirtualAddress) -> Result<&[AtomicU8]> {
        let index = self.field_index(address)?;
        Ok(self.field_bytes(index))
    }

    #[inline]
    fn field_bytes(&self, index: usize) -> &[AtomicU8] {
        let start = index * self.align;
        &self.data[start..start + self.align]
    }

    /// Copy a field's current bytes into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out.len()` is not the field width.
    #[inline]
    pub fn read_field(&self, index: usize, out: &mut [u8]) {
        assert_eq!(out.len(), self.align, "read buffer must be one field wide");
        for (dst, src) in out.iter_mut().zip(self.field_bytes(index)) {
            *dst = src.load(Ordering::Acquire);
        }
    }

    /// Overwrite a field's bytes. Caller must hold the field lock.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len()` is not the field width.
    #[inline]
    pub fn write_field(&self, index: usize, bytes: &[u8]) {
        assert_eq!(bytes.len(), self.align, "write buffer must be one field wide");
        for (dst, src) in self.field_bytes(index).iter().zip(bytes) {
            dst.store(*src, Ordering::Release);
        }
    }

    /// Write version of a field.
    #[inline]
    pub fn version(&self, index: usize) -> u64 {
        self.versions[index].load(Ordering::Acquire)
    }

    /// Publish a new write version. Caller must hold the field lock.
    #[inline]
    pub fn set_version(&self, index: usize, version: u64) {
        self.versions[index].store(version, Ordering::Release);
    }

    /// Whether a committer currently holds the field lock.
    #[inline]
    pub fn is_locked(&self, index: usize) -> bool {
        self.locks[index].load(Ordering::Acquire)
    }

    /// Attempt the free→locked transition. Never blocks.
    #[inline]
    pub fn try_lock(&self, index: usize) -> bool {
        self.locks[index]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Locked→free transition.
    #[inline]
    pub fn unlock(&self, index: usize) {
        self.locks[index].store(false, Ordering::Release);
    }

    /// Tombstone the segment. Returns `false` if it was already marked.
    pub fn mark_to_delete(&self) -> bool {
        !self.to_delete.swap(true, Ordering::AcqRel)
    }

    /// Whether the segment has been retired.
    pub fn is_marked_to_delete(&self) -> bool {
        self.to_delete.load(Ordering::Acquire)
    }

    /// Record the clock value the retirement took effect at.
    pub fn set_retired_at(&self, stamp: u64) {
        self.retired_at.store(stamp, Ordering::Release);
    }

    /// Clock value the retirement took effect at, once the freeing
    /// transaction has ended.
    pub fn retired_at(&self) -> Option<u64> {
        match self.retired_at.load(Ordering::Acquire) {
            u64::MAX => None,
            stamp => Some(stamp),
        }
    }

    /// Whether a transaction reading at `rv` may still use this segment.
    ///
    /// Transactions that began at or after the retirement can no longer
    /// have reached it through a consistent snapshot.
    pub fn is_reachable_at(&self, rv: u64) -> bool {
        self.retired_at().map_or(true, |stamp| rv < stamp)
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("size", &self.size)
            .field("align", &self.align)
            .field("fields", &self.fields())
            .field("to_delete", &self.is_marked_to_delete())
            .finish()
    }
}
