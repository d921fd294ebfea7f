//! Transaction handle.

use crate::error::Result;
use stm_concurrency::{TransactionContext, TransactionStatus};
use stm_core::VirtualAddress;
use stm_storage::Region;

/// A transaction on an [`Stm`](crate::Stm) region.
///
/// Reads see a consistent snapshot taken at [`begin`](crate::Stm::begin)
/// plus the transaction's own writes. Writes stay private until
/// [`commit`](Self::commit) publishes all of them at once.
///
/// A failed [`read`](Self::read) or [`write`](Self::write) aborts the
/// transaction. Every later call then fails with
/// [`Error::TransactionNotActive`](crate::Error::TransactionNotActive);
/// start a new transaction to retry. Dropping an uncommitted transaction
/// discards its writes.
#[derive(Debug)]
pub struct Transaction<'a> {
    ctx: TransactionContext<'a>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(region: &'a Region, read_only: bool) -> Self {
        Self {
            ctx: TransactionContext::begin(region, read_only),
        }
    }

    /// Whether this transaction was started read-only.
    pub fn is_read_only(&self) -> bool {
        self.ctx.is_read_only()
    }

    /// Clock value this transaction reads at.
    pub fn read_version(&self) -> u64 {
        self.ctx.read_version()
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.ctx.status()
    }

    /// Whether the transaction can still be used.
    pub fn is_active(&self) -> bool {
        self.ctx.is_active()
    }

    /// Copy `out.len()` bytes starting at `source` into `out`.
    ///
    /// `source` must lie on a field boundary and `out.len()` must be a
    /// non-zero multiple of the field width, all within one segment.
    pub fn read(&mut self, source: VirtualAddress, out: &mut [u8]) -> Result<()> {
        Ok(self.ctx.read(source, out)?)
    }

    /// Buffer `source` to be written at `target` on commit.
    ///
    /// Same alignment rules as [`read`](Self::read). Fails in read-only
    /// transactions.
    pub fn write(&mut self, source: &[u8], target: VirtualAddress) -> Result<()> {
        Ok(self.ctx.write(source, target)?)
    }

    /// Allocate a new zero-filled segment of `size` bytes.
    ///
    /// The allocation is visible immediately and survives an abort.
    pub fn alloc(&mut self, size: usize) -> Result<VirtualAddress> {
        Ok(self.ctx.alloc(size)?)
    }

    /// Free a segment previously returned by [`alloc`](Self::alloc).
    ///
    /// The segment is retired when this transaction ends. Transactions that
    /// began before then keep working on it; later ones can no longer
    /// resolve it.
    pub fn free(&mut self, address: VirtualAddress) -> Result<()> {
        Ok(self.ctx.free(address)?)
    }

    /// Commit, returning the version the transaction is ordered at.
    pub fn commit(mut self) -> Result<u64> {
        Ok(self.ctx.commit()?)
    }

    /// Commit and report only whether it succeeded.
    pub fn end(self) -> bool {
        self.commit().is_ok()
    }
}
