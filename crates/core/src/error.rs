//! Error types for the transactional memory engine
//!
//! Three families of failure exist:
//! - Resource exhaustion: a region, segment or id could not be allocated
//! - Optimistic validation failure: the transaction aborted
//! - Address misuse: the caller broke the addressing contract
//!
//! Every failure raised inside an active transaction tears that transaction
//! down; no partially applied write is ever visible.

use crate::address::{SegmentId, VirtualAddress};
use std::fmt;
use thiserror::Error;

/// Why a transaction aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// A field was committed after the transaction's read version, or
    /// changed while it was being copied.
    StaleRead,
    /// A field was locked by a committing transaction when read.
    LockedRead,
    /// Commit could not acquire a write lock.
    LockContention,
    /// Commit-time revalidation found a read field changed or locked.
    ReadSetInvalidated,
    /// The transaction was torn down after a caller error.
    Misuse,
}

impl AbortReason {
    /// All reasons, in counter order.
    pub const ALL: [AbortReason; 5] = [
        AbortReason::StaleRead,
        AbortReason::LockedRead,
        AbortReason::LockContention,
        AbortReason::ReadSetInvalidated,
        AbortReason::Misuse,
    ];

    /// Stable index used by metrics counters.
    pub fn index(&self) -> usize {
        match self {
            AbortReason::StaleRead => 0,
            AbortReason::LockedRead => 1,
            AbortReason::LockContention => 2,
            AbortReason::ReadSetInvalidated => 3,
            AbortReason::Misuse => 4,
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::StaleRead => "stale_read",
            AbortReason::LockedRead => "locked_read",
            AbortReason::LockContention => "lock_contention",
            AbortReason::ReadSetInvalidated => "read_set_invalidated",
            AbortReason::Misuse => "misuse",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StmError {
    /// Backing storage could not be allocated
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
    },

    /// Every dynamic segment id has been handed out
    #[error("segment ids exhausted: {capacity} dynamic segments allocated")]
    SegmentIdsExhausted {
        /// Number of dynamic ids a region can hand out
        capacity: u64,
    },

    /// Transaction aborted by optimistic validation
    #[error("transaction aborted: {0}")]
    Aborted(AbortReason),

    /// Address does not resolve to a live segment
    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),

    /// Access does not start on a field boundary
    #[error("misaligned access at {address}: field width is {align} bytes")]
    Misaligned {
        /// Offending address
        address: VirtualAddress,
        /// Field width of the region
        align: usize,
    },

    /// Access runs past the end of its segment
    #[error("access of {len} bytes at offset {offset} in segment {segment} exceeds size {size}")]
    OutOfBounds {
        /// Segment addressed
        segment: SegmentId,
        /// Starting byte offset
        offset: u64,
        /// Access length in bytes
        len: usize,
        /// Size of the segment in bytes
        size: u64,
    },

    /// Length is zero or not a multiple of the field width
    #[error("invalid length {len}: must be a non-zero multiple of {align}")]
    InvalidLength {
        /// Requested length
        len: usize,
        /// Field width of the region
        align: usize,
    },

    /// Rejected configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Operation not permitted in this context
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Transaction already committed or aborted
    #[error("transaction not active")]
    TransactionNotActive,
}

impl StmError {
    /// Whether this error is an optimistic abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, StmError::Aborted(_))
    }

    /// Abort reason, if this is an abort.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            StmError::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, StmError>;
