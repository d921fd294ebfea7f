//! Core types for the transactional memory engine
//!
//! This crate defines the vocabulary shared by the storage and concurrency
//! layers:
//! - [`VirtualAddress`] / [`SegmentId`]: segment-tagged logical addresses
//! - [`StmError`] / [`AbortReason`]: error taxonomy
//! - [`StmConfig`]: region configuration
//! - [`ReadSet`] / [`WriteSet`]: per-transaction access sets
//! - [`TransactionMetrics`]: commit and abort counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod address;
pub mod config;
pub mod error;
pub mod metrics;

pub use access::{ReadSet, WriteSet};
pub use address::{SegmentId, VirtualAddress, MAX_OFFSET};
pub use config::{check_segment_size, StmConfig};
pub use error::{AbortReason, Result, StmError};
pub use metrics::{MetricsSnapshot, TransactionMetrics};
