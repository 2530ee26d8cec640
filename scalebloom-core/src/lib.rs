//! scalebloom core - Scaling Bloom Filter over an Atomic Bit Store
//!
//! An approximate-membership filter that grows by opening fixed-capacity
//! segments as elements arrive, halving each new segment's target error rate
//! so the cumulative false-positive probability stays bounded.
//!
//! # Architecture
//!
//! - **Hash**: SHA-1 digest split into four words, combined per round into
//!   bit positions
//! - **Sizing**: optimal width and round count for each segment's target
//! - **Filter**: the orchestrator and the program the store runs atomically
//! - **Store**: the backing store seam, with an in-memory implementation
//!   and snapshots
//!
//! ```
//! use scalebloom_core::{FilterConfig, ScalingBloomFilter};
//! use scalebloom_core::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::default());
//! let config = FilterConfig::new(1_000, 0.01)?;
//! let filter = ScalingBloomFilter::connect(store, "visitors", config)?;
//!
//! filter.insert("alice")?;
//! assert!(filter.check("alice")?);
//! assert!(!filter.insertnx("alice")?);
//! # Ok::<(), scalebloom_core::BloomError>(())
//! ```

pub mod filter;
pub mod hash;
pub mod sizing;
pub mod store;

mod error;
mod types;

pub use error::{BloomError, Result};
pub use filter::{FilterInfo, ScalingBloomFilter};
pub use types::*;

/// scalebloom version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Default capacity of each segment
    pub const DEFAULT_ENTRIES: u64 = 10_000;

    /// Default base false-positive probability
    pub const DEFAULT_PRECISION: f64 = 0.001;

    /// Widest segment a store can address (2^32 bits)
    pub const MAX_SEGMENT_BITS: u64 = 1 << 32;

    /// Memoized segment parameters kept before the memo is reset
    pub const SIZING_CACHE_CAPACITY: usize = 4_096;
}
