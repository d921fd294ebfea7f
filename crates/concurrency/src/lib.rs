//! Concurrency layer for the transactional memory engine
//!
//! This crate implements Transactional Locking II (TL2) on top of the
//! storage layer:
//! - TransactionContext: read version, read/write sets, segment pins
//! - Optimistic field loads validated against per-field versions
//! - Commit: lock write targets, advance the clock, validate, publish

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tl2;
pub mod transaction;

pub use transaction::{TransactionContext, TransactionStatus};
