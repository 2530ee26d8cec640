//! Counter and segment bit arrays of one filter

use crate::store::StoreTxn;
use crate::types::keys;
use crate::{BloomError, FilterConfig, Result};
use tracing::debug;

/// View of a filter's keyspace during one atomic run
///
/// The counter lives at `<namespace>:count` and segment `n` at
/// `<namespace>:<n>`. Segment arrays are never created up front; the store
/// materializes one on its first bit write.
pub struct GenerationStore<'a, T: StoreTxn + ?Sized> {
    txn: &'a mut T,
    namespace: &'a str,
    config: FilterConfig,
    counter_key: String,
}

impl<'a, T: StoreTxn + ?Sized> GenerationStore<'a, T> {
    /// Bind a transaction to a filter namespace
    pub fn new(txn: &'a mut T, namespace: &'a str, config: FilterConfig) -> Self {
        Self {
            txn,
            namespace,
            config,
            counter_key: keys::counter_key(namespace),
        }
    }

    /// Total number of inserts; an absent counter reads as zero
    pub fn count(&mut self) -> Result<u64> {
        Ok(self.txn.get_counter(&self.counter_key)?.unwrap_or(0))
    }

    /// Segment that received the most recent insert (0 when empty)
    pub fn current_segment(&mut self) -> Result<u64> {
        let count = self.count()?;
        Ok(self.config.segment_for(count))
    }

    /// Segment the next insert will be written to
    pub fn next_segment(&mut self) -> Result<u64> {
        let count = self.count()?;
        let next = count
            .checked_add(1)
            .ok_or_else(|| BloomError::Store(format!("counter {} overflows", self.counter_key)))?;
        Ok(self.config.segment_for(next))
    }

    /// Advance the counter and return the segment the new insert belongs to
    pub fn advance(&mut self) -> Result<u64> {
        let count = self.txn.incr_counter(&self.counter_key)?;
        let segment = self.config.segment_for(count);
        if (count - 1) % self.config.entries() == 0 {
            debug!("Filter {} opened segment {}", self.namespace, segment);
        }
        Ok(segment)
    }

    /// Read one bit of a segment
    pub fn get_bit(&mut self, segment: u64, offset: u64) -> Result<bool> {
        self.txn.get_bit(&keys::segment_key(self.namespace, segment), offset)
    }

    /// Write one bit of a segment, returning its previous value
    pub fn set_bit(&mut self, segment: u64, offset: u64, value: bool) -> Result<bool> {
        self.txn
            .set_bit(&keys::segment_key(self.namespace, segment), offset, value)
    }
}
