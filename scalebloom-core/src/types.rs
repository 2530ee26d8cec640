//! Core data types for scalebloom

use crate::{BloomError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use std::fmt;

/// Truncated ln(2) used by deployed script-based filters
const COMPAT_LN_2: f64 = 0.693147180;

/// Truncated ln(2)^2 used by deployed script-based filters
const COMPAT_LN_2_SQUARED: f64 = 0.480453013;

/// Numeric profile used for hashing and sizing
///
/// `Standard` follows the textbook formulas. `LuaCompat` reproduces the
/// arithmetic of filters written by the original Redis Lua script, so both
/// can share a keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Consecutive digest windows, exact ln(2)
    #[default]
    Standard,
    /// Overlapping digest windows, truncated constants
    LuaCompat,
}

impl Profile {
    /// ln(2) as used by this profile
    pub fn ln2(&self) -> f64 {
        match self {
            Profile::Standard => LN_2,
            Profile::LuaCompat => COMPAT_LN_2,
        }
    }

    /// ln(2)^2 as used by this profile
    pub fn ln2_squared(&self) -> f64 {
        match self {
            Profile::Standard => LN_2 * LN_2,
            Profile::LuaCompat => COMPAT_LN_2_SQUARED,
        }
    }

    /// Stable tag mixed into the atomic unit's content hash
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Standard => "standard",
            Profile::LuaCompat => "lua_compat",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable filter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    entries: u64,
    precision: f64,
    #[serde(default)]
    profile: Profile,
}

impl FilterConfig {
    /// Create a validated configuration
    ///
    /// `entries` is the capacity of every segment and must be positive.
    /// `precision` is the base false-positive probability and must lie in
    /// the open interval (0, 1).
    pub fn new(entries: u64, precision: f64) -> Result<Self> {
        let config = Self {
            entries,
            precision,
            profile: Profile::Standard,
        };
        config.validate()?;
        Ok(config)
    }

    /// Use a different numeric profile
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Validate the configuration
    ///
    /// Deserialized configurations bypass [`FilterConfig::new`], so callers
    /// accepting external input run this before use.
    pub fn validate(&self) -> Result<()> {
        if self.entries == 0 {
            return Err(BloomError::Config("entries must be greater than zero".into()));
        }
        if !self.precision.is_finite() || self.precision <= 0.0 || self.precision >= 1.0 {
            return Err(BloomError::Config(format!(
                "precision must be in (0, 1), got {}",
                self.precision
            )));
        }
        Ok(())
    }

    /// Capacity of each segment
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Base false-positive probability
    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Numeric profile
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Segment that receives the insert which moved the counter to `counter`
    ///
    /// Returns 0 for an empty filter.
    pub fn segment_for(&self, counter: u64) -> u64 {
        counter.div_ceil(self.entries)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            entries: crate::config::DEFAULT_ENTRIES,
            precision: crate::config::DEFAULT_PRECISION,
            profile: Profile::Standard,
        }
    }
}

/// Operation carried out by the atomic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Scan segments for the element
    Check,
    /// Advance the counter and set the element's bits
    Insert,
    /// Check, then insert only when absent
    InsertNx,
    /// Clear the element's bits in the current segment
    Remove,
    /// Read the counter
    Count,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Insert => "insert",
            Operation::InsertNx => "insertnx",
            Operation::Remove => "remove",
            Operation::Count => "count",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the atomic unit
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Filter namespace (key prefix)
    pub namespace: String,
    /// Filter configuration
    pub config: FilterConfig,
    /// Operation to perform
    pub op: Operation,
    /// Element bytes (empty for `Count`)
    pub data: Vec<u8>,
}

impl Request {
    /// Create a new request
    pub fn new(namespace: &str, config: FilterConfig, op: Operation, data: &[u8]) -> Self {
        Self {
            namespace: namespace.to_string(),
            config,
            op,
            data: data.to_vec(),
        }
    }
}

/// Key layout under a filter namespace
pub mod keys {
    /// Key of the insertion counter
    pub fn counter_key(namespace: &str) -> String {
        format!("{}:count", namespace)
    }

    /// Key of segment `n`'s bit array
    pub fn segment_key(namespace: &str, n: u64) -> String {
        format!("{}:{}", namespace, n)
    }

    /// Glob matching every key under a namespace
    pub fn namespace_pattern(namespace: &str) -> String {
        let mut pattern = String::with_capacity(namespace.len() + 2);
        for c in namespace.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push_str(":*");
        pattern
    }
}
