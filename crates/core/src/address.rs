//! Virtual addressing for transactional memory
//!
//! A [`VirtualAddress`] is an opaque 64-bit handle that names a byte inside
//! one segment of a region:
//!
//! ```text
//!  63            48 47                                            0
//! +----------------+-----------------------------------------------+
//! |   segment id   |                  byte offset                  |
//! +----------------+-----------------------------------------------+
//! ```
//!
//! Segment ids are stable for a segment's lifetime, so a dynamic segment
//! can be retired and reclaimed without invalidating any other segment's
//! addresses. The id [`SegmentId::DEFAULT`] is reserved for the region's
//! always-present default segment.
//!
//! Addresses are never dereferenced directly; the storage layer resolves
//! them through [`VirtualAddress::segment`] and [`VirtualAddress::offset`].

use crate::error::{Result, StmError};
use std::fmt;

/// Number of high bits holding the segment id.
pub const SEGMENT_ID_BITS: u32 = 16;

/// Number of low bits holding the byte offset.
pub const OFFSET_BITS: u32 = 64 - SEGMENT_ID_BITS;

/// Largest byte offset representable in a [`VirtualAddress`].
pub const MAX_OFFSET: u64 = (1 << OFFSET_BITS) - 1;

/// Identifier of a segment within a region
///
/// Dynamic segments are numbered from 0 upward. An id is handed out again
/// only after its segment has been swept and no transaction that could
/// still reach it is active. The all-ones id is reserved for the default
/// segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(u16);

impl SegmentId {
    /// The region's default segment.
    pub const DEFAULT: SegmentId = SegmentId(u16::MAX);

    /// Number of ids available to dynamic segments.
    pub const DYNAMIC_CAPACITY: u64 = u16::MAX as u64;

    /// Id of the `n`-th dynamically allocated segment.
    ///
    /// Returns [`StmError::SegmentIdsExhausted`] once the id space available
    /// to dynamic segments is used up.
    pub fn dynamic(n: u64) -> Result<Self> {
        if n >= Self::DYNAMIC_CAPACITY {
            return Err(StmError::SegmentIdsExhausted {
                capacity: Self::DYNAMIC_CAPACITY,
            });
        }
        Ok(SegmentId(n as u16))
    }

    /// Raw numeric id.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Whether this id names the default segment.
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Logical address of a byte in transactional memory
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    /// Pack a segment id and a byte offset into one handle.
    ///
    /// Fails with [`StmError::OutOfBounds`] if `offset` does not fit the
    /// 48-bit offset field.
    pub fn encode(segment: SegmentId, offset: u64) -> Result<Self> {
        if offset > MAX_OFFSET {
            return Err(StmError::OutOfBounds {
                segment,
                offset,
                len: 0,
                size: MAX_OFFSET,
            });
        }
        Ok(VirtualAddress(((segment.0 as u64) << OFFSET_BITS) | offset))
    }

    /// Address of byte 0 of a segment.
    pub fn segment_start(segment: SegmentId) -> Self {
        VirtualAddress((segment.0 as u64) << OFFSET_BITS)
    }

    /// Split the handle back into its segment id and byte offset.
    pub fn decode(self) -> (SegmentId, u64) {
        (self.segment(), self.offset())
    }

    /// Segment the address points into.
    #[inline]
    pub fn segment(self) -> SegmentId {
        SegmentId((self.0 >> OFFSET_BITS) as u16)
    }

    /// Byte offset within the segment.
    #[inline]
    pub fn offset(self) -> u64 {
        self.0 & MAX_OFFSET
    }

    /// Address `bytes` further into the same segment.
    pub fn add(self, bytes: u64) -> Result<Self> {
        let offset = self.offset().checked_add(bytes).unwrap_or(u64::MAX);
        Self::encode(self.segment(), offset)
    }

    /// Raw 64-bit handle.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Rebuild an address from a raw handle obtained via [`as_u64`](Self::as_u64).
    pub fn from_u64(raw: u64) -> Self {
        VirtualAddress(raw)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualAddress({}+{})", self.segment(), self.offset())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x}", self.segment(), self.offset())
    }
}
