//! Convenient imports for tl2-stm.
//!
//! ```
//! use tl2_stm::prelude::*;
//!
//! let stm = Stm::create(64, 8).unwrap();
//! assert!(stm.begin(true).end());
//! ```

// Main entry point
pub use crate::stm::{Stm, StmBuilder};
pub use crate::transaction::Transaction;

// Error handling
pub use crate::error::{Error, Result};

// Core types
pub use stm_core::{AbortReason, VirtualAddress};
