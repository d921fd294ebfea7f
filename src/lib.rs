//! # tl2-stm
//!
//! Word-based software transactional memory using Transactional Locking II.
//!
//! A region is a set of byte segments divided into fixed-width fields.
//! Transactions read and write whole fields; each field carries its own
//! lock and write version, and a global version clock orders commits.
//!
//! ## Quick Start
//!
//! ```
//! use tl2_stm::prelude::*;
//!
//! let stm = Stm::create(800, 8)?;
//!
//! let mut tx = stm.begin(false);
//! tx.write(&42u64.to_le_bytes(), stm.start())?;
//! tx.commit()?;
//!
//! let mut tx = stm.begin(true);
//! let mut word = [0u8; 8];
//! tx.read(stm.start(), &mut word)?;
//! tx.commit()?;
//! assert_eq!(u64::from_le_bytes(word), 42);
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Guarantees
//!
//! - Committed read/write transactions are serializable in the order of
//!   their write versions.
//! - A transaction never observes a partially committed write set.
//! - Read-only transactions always commit and never block writers.
//!
//! The engine does not retry: on [`Error::Aborted`] start a new
//! transaction.

#![warn(missing_docs)]

mod error;
mod stm;
mod transaction;

pub mod prelude;

pub use error::{Error, Result};
pub use stm::{Stm, StmBuilder};
pub use transaction::Transaction;

pub use stm_concurrency::TransactionStatus;
pub use stm_core::{AbortReason, MetricsSnapshot, SegmentId, StmConfig, VirtualAddress};
