//! Region entry point.
//!
//! This module provides [`Stm`], the handle every transaction runs against,
//! and [`StmBuilder`] for configuring one.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use stm_core::{MetricsSnapshot, StmConfig, StmError, VirtualAddress};
use stm_storage::Region;

/// A transactional memory region.
///
/// Create one with [`Stm::create`] or [`Stm::builder`], share it between
/// threads by reference (or behind an `Arc`) and run transactions with
/// [`Stm::begin`].
///
/// Transactions borrow the region, so it cannot be destroyed while any of
/// them is still active.
///
/// # Example
///
/// ```
/// use tl2_stm::Stm;
///
/// let stm = Stm::create(800, 8)?;
/// let pattern: Vec<u8> = (0..16).collect();
///
/// let mut tx = stm.begin(false);
/// tx.write(&pattern, stm.start())?;
/// tx.commit()?;
///
/// let mut tx = stm.begin(true);
/// let mut out = [0u8; 16];
/// tx.read(stm.start(), &mut out)?;
/// assert!(tx.end());
/// assert_eq!(&out[..], &pattern[..]);
/// # Ok::<(), tl2_stm::Error>(())
/// ```
#[derive(Debug)]
pub struct Stm {
    region: Region,
}

impl Stm {
    /// Create a region with a zeroed default segment of `size` bytes made of
    /// `align`-byte fields.
    ///
    /// `align` must be a power of two and `size` a non-zero multiple of it.
    pub fn create(size: usize, align: usize) -> Result<Self> {
        Self::with_config(StmConfig::new(size, align))
    }

    /// Create a region from a full configuration.
    pub fn with_config(config: StmConfig) -> Result<Self> {
        let region = Region::new(config).map_err(|e| match e {
            e @ StmError::InvalidLength { .. } => Error::InvalidConfig(e.to_string()),
            e => Error::from(e),
        })?;
        Ok(Self { region })
    }

    /// Create a region from TOML configuration text.
    ///
    /// ```
    /// let stm = tl2_stm::Stm::from_toml_str("size = 64\nalign = 8").unwrap();
    /// assert_eq!(stm.size(), 64);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::with_config(StmConfig::from_toml_str(text)?)
    }

    /// Create a builder for region configuration.
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    /// Release the region and every segment it still holds.
    pub fn destroy(self) {
        drop(self);
    }

    /// Virtual address of byte 0 of the default segment.
    pub fn start(&self) -> VirtualAddress {
        self.region.start()
    }

    /// Size of the default segment in bytes.
    pub fn size(&self) -> usize {
        self.region.size()
    }

    /// Field width in bytes.
    pub fn align(&self) -> usize {
        self.region.align()
    }

    /// Configuration the region was created with.
    pub fn config(&self) -> &StmConfig {
        self.region.config()
    }

    /// Current value of the global version clock.
    pub fn clock(&self) -> u64 {
        self.region.global_clock()
    }

    /// Start a transaction.
    ///
    /// Read-only transactions may not write, but need no commit-time
    /// validation and always commit.
    pub fn begin(&self, read_only: bool) -> Transaction<'_> {
        Transaction::begin(&self.region, read_only)
    }

    /// Remove retired segments from the segment table now.
    ///
    /// Only segments no active transaction can still reach are swept; the
    /// rest wait for a later sweep. Swept ids may be handed out again by
    /// [`Transaction::alloc`]. Returns the number of segments swept.
    pub fn sweep(&self) -> usize {
        self.region.sweep()
    }

    /// Dynamic segments in the segment table.
    pub fn segment_count(&self) -> usize {
        self.region.segment_count()
    }

    /// Transaction counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.region.metrics_snapshot()
    }
}

/// Builder for region configuration.
///
/// # Example
///
/// ```
/// let stm = tl2_stm::Stm::builder()
///     .size(4096)
///     .align(8)
///     .sweep_threshold(16)
///     .open()
///     .unwrap();
/// assert_eq!(stm.config().sweep_threshold, 16);
/// ```
#[derive(Debug, Clone)]
pub struct StmBuilder {
    config: StmConfig,
}

impl StmBuilder {
    /// Create a new builder with default settings.
    ///
    /// The default segment size is zero and must be set with
    /// [`size`](Self::size) before opening.
    pub fn new() -> Self {
        Self {
            config: StmConfig::new(0, StmConfig::DEFAULT_ALIGN),
        }
    }

    /// Set the default segment size in bytes.
    pub fn size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    /// Set the field width in bytes.
    pub fn align(mut self, align: usize) -> Self {
        self.config.align = align;
        self
    }

    /// Sweep retired segments every `threshold` retirements.
    pub fn sweep_threshold(mut self, threshold: usize) -> Self {
        self.config.sweep_threshold = threshold;
        self
    }

    /// Initial read-set capacity of read/write transactions.
    pub fn read_set_capacity(mut self, capacity: usize) -> Self {
        self.config.read_set_capacity = capacity;
        self
    }

    /// Initial write-set capacity of read/write transactions.
    pub fn write_set_capacity(mut self, capacity: usize) -> Self {
        self.config.write_set_capacity = capacity;
        self
    }

    /// Create the region.
    pub fn open(self) -> Result<Stm> {
        Stm::with_config(self.config)
    }
}

impl Default for StmBuilder {
    fn default() -> Self {
        Self::new()
    }
}
