//! Read and write sets of a transaction
//!
//! - [`ReadSet`]: addresses observed, used for commit-time revalidation.
//!   Order is irrelevant and duplicates are allowed.
//! - [`WriteSet`]: `(target, value)` pairs buffered until commit. Each value
//!   is an owned copy of the caller's bytes, released exactly once when the
//!   set is dropped or cleared.
//!
//! Both keep a small inline buffer so short transactions do not allocate.

use crate::address::VirtualAddress;
use smallvec::SmallVec;

const INLINE: usize = 8;

/// Addresses read by a transaction
#[derive(Debug, Default, Clone)]
pub struct ReadSet {
    entries: SmallVec<[VirtualAddress; INLINE]>,
}

impl ReadSet {
    /// Create an empty read set with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity),
        }
    }

    /// Record a read.
    #[inline]
    pub fn push(&mut self, address: VirtualAddress) {
        self.entries.push(address);
    }

    /// Linear membership search.
    pub fn contains(&self, address: VirtualAddress) -> bool {
        self.entries.contains(&address)
    }

    /// Number of recorded reads, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over recorded reads.
    pub fn iter(&self) -> impl Iterator<Item = VirtualAddress> + '_ {
        self.entries.iter().copied()
    }

    /// Forget every read.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Buffered writes of a transaction
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    entries: SmallVec<[(VirtualAddress, Box<[u8]>); INLINE]>,
}

impl WriteSet {
    /// Create an empty write set with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity),
        }
    }

    /// Buffer an owned copy of `value` destined for `target`.
    pub fn push(&mut self, target: VirtualAddress, value: &[u8]) {
        self.entries.push((target, Box::from(value)));
    }

    /// Most recent value buffered for `target`.
    pub fn find_last(&self, target: VirtualAddress) -> Option<&[u8]> {
        self.entries
            .iter()
            .rev()
            .find(|(addr, _)| *addr == target)
            .map(|(_, value)| &value[..])
    }

    /// Whether `target` has been written.
    pub fn contains(&self, target: VirtualAddress) -> bool {
        self.entries.iter().any(|(addr, _)| *addr == target)
    }

    /// Distinct targets in ascending address order.
    ///
    /// A field written several times appears once, so commit locks it
    /// exactly once. The ascending order doubles as the fixed lock order.
    pub fn dedup_targets(&self) -> Vec<VirtualAddress> {
        let mut targets: Vec<VirtualAddress> = self.entries.iter().map(|(addr, _)| *addr).collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Entries in write order.
    pub fn iter(&self) -> impl Iterator<Item = (VirtualAddress, &[u8])> + '_ {
        self.entries.iter().map(|(addr, value)| (*addr, &value[..]))
    }

    /// Number of buffered writes, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every buffered value.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
