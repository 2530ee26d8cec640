//! Backing store abstraction
//!
//! A filter never touches bits directly. Every operation is shipped to the
//! store as a [`Request`] and executed there by a registered [`AtomicUnit`],
//! which sees the keyspace through a [`StoreTxn`] for the duration of one
//! run. The store guarantees that runs do not interleave, which is what makes
//! check-then-insert safe without client-side locks.

mod bitmap;
mod memory;
mod snapshot;

pub use bitmap::Bitmap;
pub use memory::{MemoryStore, MemoryStoreConfig, StoreStats, StoredValue};
pub use snapshot::{Snapshot, SnapshotInfo};

use crate::{Request, Result};
use sha1::{Digest, Sha1};
use std::fmt;
use std::sync::Arc;

/// Content hash identifying a registered atomic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitDigest([u8; 20]);

impl UnitDigest {
    /// Digest of a unit's canonical source
    pub fn of(source: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&Sha1::digest(source));
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for UnitDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Primitive commands available to an atomic unit while it runs
pub trait StoreTxn {
    /// Read an integer counter; `None` when the key does not exist
    fn get_counter(&mut self, key: &str) -> Result<Option<u64>>;

    /// Increment a counter, creating it at zero first, and return the new value
    fn incr_counter(&mut self, key: &str) -> Result<u64>;

    /// Read one bit; offsets past the end of the array read as zero
    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool>;

    /// Write one bit, growing the array when needed, and return the previous value
    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool>;
}

/// A unit of work executed by the store without interleaving
pub trait AtomicUnit: Send + Sync {
    /// Content hash the unit is registered under
    fn digest(&self) -> UnitDigest;

    /// Execute one request; integer replies follow store conventions
    fn run(&self, txn: &mut dyn StoreTxn, request: &Request) -> Result<u64>;
}

/// Capabilities required from the store behind a filter
pub trait BackingStore: Send + Sync {
    /// Whether a unit with this digest is currently registered
    fn unit_exists(&self, digest: &UnitDigest) -> Result<bool>;

    /// Register a unit and return the digest it is addressable by
    fn register_unit(&self, unit: Arc<dyn AtomicUnit>) -> Result<UnitDigest>;

    /// Run a registered unit atomically
    ///
    /// Fails with [`crate::BloomError::UnitNotFound`] when the digest is not
    /// registered, for instance after the store evicted its unit cache.
    fn execute(&self, digest: &UnitDigest, request: &Request) -> Result<u64>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes)
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete a key, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool>;
}
