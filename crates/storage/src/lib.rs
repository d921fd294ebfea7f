//! Storage layer for transactional memory
//!
//! This crate implements the region and segment data model:
//! - Segment: fixed-width fields with per-field lock flags and write versions
//! - Region: default segment, segment table, global version clock
//! - RetirementQueue: batched, deferred reclamation of freed segments
//! - ReaderRegistry: read versions of active transactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod reclaim;
pub mod region;
pub mod segment;

pub use reclaim::{ReaderRegistry, RetirementQueue};
pub use region::Region;
pub use segment::Segment;
