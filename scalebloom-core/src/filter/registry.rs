//! Process-wide registry of atomic units

use super::program::ScalingProgram;
use crate::store::{AtomicUnit, BackingStore, UnitDigest};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Handle to an atomic unit, addressed by its content hash
#[derive(Clone)]
pub struct UnitHandle {
    digest: UnitDigest,
    unit: Arc<dyn AtomicUnit>,
}

impl UnitHandle {
    /// Digest the unit executes under
    pub fn digest(&self) -> &UnitDigest {
        &self.digest
    }

    /// Register the unit with `store` unless it is already known there
    pub fn ensure_loaded(&self, store: &dyn BackingStore) -> Result<()> {
        if store.unit_exists(&self.digest)? {
            return Ok(());
        }
        self.reload(store)
    }

    /// Register the unit with `store` unconditionally
    pub fn reload(&self, store: &dyn BackingStore) -> Result<()> {
        let registered = store.register_unit(self.unit.clone())?;
        debug!("Loaded atomic unit {} into store", registered);
        Ok(())
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("digest", &self.digest.to_hex())
            .finish()
    }
}

/// Registry of unit handles keyed by content hash
#[derive(Default)]
pub struct UnitRegistry {
    handles: RwLock<HashMap<UnitDigest, UnitHandle>>,
}

impl UnitRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every filter in the process
    pub fn global() -> &'static UnitRegistry {
        static GLOBAL: OnceLock<UnitRegistry> = OnceLock::new();
        GLOBAL.get_or_init(UnitRegistry::new)
    }

    /// Handle for `unit`, reusing the cached handle for the same digest
    pub fn handle(&self, unit: Arc<dyn AtomicUnit>) -> UnitHandle {
        let digest = unit.digest();
        if let Some(handle) = self.handles.read().get(&digest) {
            return handle.clone();
        }

        self.handles
            .write()
            .entry(digest)
            .or_insert_with(|| UnitHandle { digest, unit })
            .clone()
    }

    /// Handle for the scaling Bloom filter program
    pub fn scaling_filter(&self) -> UnitHandle {
        let digest = ScalingProgram::unit_digest();
        if let Some(handle) = self.handles.read().get(&digest) {
            return handle.clone();
        }
        self.handle(Arc::new(ScalingProgram::new()))
    }

    /// Number of cached handles
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Whether no handle is cached
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
