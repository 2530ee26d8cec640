//! Scaling Bloom filter
//!
//! A filter is a namespace in a [`BackingStore`] holding an insertion counter
//! and one bit array per segment. Segment `n` holds up to `entries`
//! insertions and targets a false-positive probability of
//! `precision * 0.5^n`, so the cumulative error stays below `precision` no
//! matter how many segments are opened.
//!
//! Every public operation becomes one run of the [`ScalingProgram`] inside
//! the store. The store runs units one at a time, which is what keeps
//! `insertnx` free of check-then-act races.

mod generation;
mod program;
mod registry;

pub use generation::GenerationStore;
pub use program::ScalingProgram;
pub use registry::{UnitHandle, UnitRegistry};

use crate::sizing::{SegmentParams, SegmentSizer};
use crate::store::BackingStore;
use crate::types::keys;
use crate::{BloomError, FilterConfig, Operation, Request, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Scaling Bloom filter bound to a backing store
pub struct ScalingBloomFilter {
    store: Arc<dyn BackingStore>,
    namespace: String,
    config: FilterConfig,
    sizer: SegmentSizer,
    handle: UnitHandle,
}

/// Point-in-time description of a filter
#[derive(Debug, Clone, Serialize)]
pub struct FilterInfo {
    pub namespace: String,
    pub config: FilterConfig,
    pub count: u64,
    pub current_segment: u64,
    pub error_bound: f64,
    pub segments: Vec<SegmentParams>,
}

impl ScalingBloomFilter {
    /// Connect to the filter stored under `namespace`
    ///
    /// Validates the configuration, checks that the first segment can be
    /// sized, and makes sure the store knows the filter program.
    pub fn connect(
        store: Arc<dyn BackingStore>,
        namespace: impl Into<String>,
        config: FilterConfig,
    ) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(BloomError::Config("namespace must not be empty".into()));
        }
        config.validate()?;

        let sizer = SegmentSizer::new(config);
        sizer.params(1)?;

        let handle = UnitRegistry::global().scaling_filter();
        handle.ensure_loaded(store.as_ref())?;

        Ok(Self {
            store,
            namespace,
            config,
            sizer,
            handle,
        })
    }

    /// Filter namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Filter configuration
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Add an element
    ///
    /// The counter advances on every call, including for elements that are
    /// already present.
    pub fn insert(&self, data: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.execute(Operation::Insert, data.as_ref())? == 1)
    }

    /// Add an element unless it already reads as present
    ///
    /// Returns `true` when the element was inserted.
    pub fn insertnx(&self, data: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.execute(Operation::InsertNx, data.as_ref())? == 1)
    }

    /// Clear an element's bits in the current segment
    ///
    /// Lossy: other elements sharing a bit may read as absent afterwards,
    /// and copies written to earlier segments are not touched.
    pub fn remove(&self, data: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.execute(Operation::Remove, data.as_ref())? == 1)
    }

    /// Check whether an element may be present
    pub fn check(&self, data: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.execute(Operation::Check, data.as_ref())? == 1)
    }

    /// Delete the counter and every segment, returning the number of keys removed
    ///
    /// Keys are enumerated and deleted one by one; the sweep as a whole is
    /// not atomic with respect to concurrent inserts.
    pub fn clear(&self) -> Result<usize> {
        let keys = self.store.keys(&keys::namespace_pattern(&self.namespace))?;
        let mut deleted = 0;
        for key in &keys {
            if self.store.delete(key)? {
                deleted += 1;
            }
        }
        info!("Cleared filter {} ({} keys)", self.namespace, deleted);
        Ok(deleted)
    }

    /// Total number of inserts performed
    pub fn count(&self) -> Result<u64> {
        self.execute(Operation::Count, &[])
    }

    /// Segment receiving inserts (0 when empty)
    pub fn current_segment(&self) -> Result<u64> {
        Ok(self.config.segment_for(self.count()?))
    }

    /// Parameters of every live segment
    pub fn segments(&self) -> Result<Vec<SegmentParams>> {
        let current = self.current_segment()?;
        (1..=current).map(|n| self.sizer.params(n)).collect()
    }

    /// Upper bound on the false-positive probability over live segments
    pub fn error_bound(&self) -> Result<f64> {
        Ok(self.sizer.error_bound(self.current_segment()?))
    }

    /// Describe the filter
    pub fn info(&self) -> Result<FilterInfo> {
        let count = self.count()?;
        let current_segment = self.config.segment_for(count);
        let segments = (1..=current_segment)
            .map(|n| self.sizer.params(n))
            .collect::<Result<Vec<_>>>()?;

        Ok(FilterInfo {
            namespace: self.namespace.clone(),
            config: self.config,
            count,
            current_segment,
            error_bound: self.sizer.error_bound(current_segment),
            segments,
        })
    }

    /// Run one operation, registering the program again if the store lost it
    fn execute(&self, op: Operation, data: &[u8]) -> Result<u64> {
        let request = Request::new(&self.namespace, self.config, op, data);

        match self.store.execute(self.handle.digest(), &request) {
            Err(e) if e.is_unit_missing() => {
                warn!(
                    "Atomic unit {} missing for filter {}, registering again",
                    self.handle.digest(),
                    self.namespace
                );
                self.handle.reload(self.store.as_ref())?;
                self.store.execute(self.handle.digest(), &request)
            }
            result => result,
        }
    }
}

impl fmt::Debug for ScalingBloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalingBloomFilter")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("handle", &self.handle)
            .finish()
    }
}
