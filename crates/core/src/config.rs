//! Region configuration
//!
//! Configuration is validated once, when a region is created, and is
//! immutable afterwards.
//!
//! ```
//! use stm_core::StmConfig;
//!
//! let config = StmConfig::from_toml_str(
//!     r#"
//!     size = 800
//!     align = 8
//!     sweep_threshold = 64
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.fields(), 100);
//! ```

use crate::address::MAX_OFFSET;
use crate::error::{Result, StmError};
use serde::Deserialize;

/// Configuration for a transactional memory region
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StmConfig {
    /// Size of the default segment in bytes.
    pub size: usize,

    /// Field width in bytes, shared by every segment of the region.
    ///
    /// This is the granularity of locking and versioning. Must be a power
    /// of two.
    pub align: usize,

    /// Retirements between two reclamation sweeps.
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,

    /// Initial read-set capacity of a read/write transaction.
    #[serde(default = "default_set_capacity")]
    pub read_set_capacity: usize,

    /// Initial write-set capacity of a read/write transaction.
    #[serde(default = "default_set_capacity")]
    pub write_set_capacity: usize,
}

fn default_sweep_threshold() -> usize {
    StmConfig::DEFAULT_SWEEP_THRESHOLD
}

fn default_set_capacity() -> usize {
    StmConfig::DEFAULT_SET_CAPACITY
}

impl StmConfig {
    /// A sweep runs on every 1024th retirement by default.
    pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

    /// Default initial capacity of read and write sets.
    pub const DEFAULT_SET_CAPACITY: usize = 8;

    /// Largest accepted initial capacity of a read or write set.
    pub const MAX_SET_CAPACITY: usize = 1 << 16;

    /// Default field width: one machine word.
    pub const DEFAULT_ALIGN: usize = std::mem::size_of::<u64>();

    /// Create a config for a default segment of `size` bytes made of
    /// `align`-byte fields. Other parameters take their defaults.
    pub fn new(size: usize, align: usize) -> Self {
        Self {
            size,
            align,
            sweep_threshold: Self::DEFAULT_SWEEP_THRESHOLD,
            read_set_capacity: Self::DEFAULT_SET_CAPACITY,
            write_set_capacity: Self::DEFAULT_SET_CAPACITY,
        }
    }

    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StmConfig =
            toml::from_str(text).map_err(|e| StmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of fields in the default segment.
    pub fn fields(&self) -> usize {
        if self.align == 0 {
            0
        } else {
            self.size / self.align
        }
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<()> {
        if self.align == 0 || !self.align.is_power_of_two() {
            return Err(StmError::InvalidConfig(format!(
                "align must be a non-zero power of two, got {}",
                self.align
            )));
        }
        check_segment_size(self.size, self.align)?;
        if self.sweep_threshold == 0 {
            return Err(StmError::InvalidConfig(
                "sweep_threshold must be at least 1".to_string(),
            ));
        }
        for (name, capacity) in [
            ("read_set_capacity", self.read_set_capacity),
            ("write_set_capacity", self.write_set_capacity),
        ] {
            if capacity > Self::MAX_SET_CAPACITY {
                return Err(StmError::InvalidConfig(format!(
                    "{} must be at most {}, got {}",
                    name,
                    Self::MAX_SET_CAPACITY,
                    capacity
                )));
            }
        }
        Ok(())
    }
}

/// Validate the byte size of a segment with `align`-byte fields.
///
/// Sizes must be non-zero multiples of the field width and addressable by
/// a 48-bit offset.
pub fn check_segment_size(size: usize, align: usize) -> Result<()> {
    if size == 0 || align == 0 || size % align != 0 {
        return Err(StmError::InvalidLength { len: size, align });
    }
    if size as u64 > MAX_OFFSET {
        return Err(StmError::InvalidConfig(format!(
            "segment size {} exceeds addressable range",
            size
        )));
    }
    Ok(())
}
