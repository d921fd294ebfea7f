//! Unified error type for the transactional memory API.
//!
//! Internal crates report [`StmError`](stm_core::StmError); this module folds
//! those into a smaller, stable set of categories for callers.

use stm_core::{AbortReason, StmError};
use thiserror::Error;

/// All transactional memory errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The transaction lost a race and was rolled back
    #[error("transaction aborted: {0}")]
    Aborted(AbortReason),

    /// Memory or segment ids are exhausted
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Address is misaligned, out of bounds or names no live segment
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Rejected region configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not permitted in the current state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The transaction has already ended or been torn down
    #[error("transaction is no longer active")]
    TransactionNotActive,
}

/// Result type for transactional memory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Only aborts are: a fresh transaction may succeed against newer data.
    pub fn is_retryable(&self) -> bool {
        self.is_abort()
    }

    /// Check if the transaction was aborted by a conflict.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted(_))
    }

    /// Check if this is a resource exhaustion error.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory(_))
    }

    /// Abort cause, if this is an abort.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Error::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<StmError> for Error {
    fn from(e: StmError) -> Self {
        match e {
            StmError::Aborted(reason) => Error::Aborted(reason),
            e @ (StmError::OutOfMemory { .. } | StmError::SegmentIdsExhausted { .. }) => {
                Error::OutOfMemory(e.to_string())
            }
            e @ (StmError::UnknownSegment(_)
            | StmError::Misaligned { .. }
            | StmError::OutOfBounds { .. }
            | StmError::InvalidLength { .. }) => Error::InvalidAddress(e.to_string()),
            StmError::InvalidConfig(msg) => Error::InvalidConfig(msg),
            StmError::InvalidOperation(msg) => Error::InvalidOperation(msg),
            StmError::TransactionNotActive => Error::TransactionNotActive,
        }
    }
}
