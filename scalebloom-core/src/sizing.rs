//! Per-segment sizing
//!
//! Segment `n` targets a false-positive probability of `precision * 0.5^n`
//! and is sized with the usual optimal Bloom filter formulas:
//!
//! ```text
//! bits(n) = floor(-(entries * ln(precision * 0.5^n)) / ln(2)^2)
//! k(n)    = floor(ln(2) * bits(n) / entries)
//! ```
//!
//! Parameters are pure functions of `(entries, precision, profile, n)`, so
//! they are never stored with the filter. A process-wide memo avoids the
//! floating point work on hot paths.

use crate::{BloomError, FilterConfig, Profile, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Derived parameters of one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentParams {
    /// Segment index (1-based)
    pub segment: u64,
    /// Bit array width
    pub bits: u64,
    /// Number of hash rounds
    pub k: u64,
    /// Target false-positive probability
    pub target: f64,
}

/// Target false-positive probability of segment `n`
pub fn target_error(precision: f64, n: u64) -> f64 {
    precision * 0.5f64.powf(n as f64)
}

/// Compute parameters of segment `n` without consulting the memo
pub fn segment_params(config: &FilterConfig, n: u64) -> Result<SegmentParams> {
    if n == 0 {
        return Err(BloomError::sizing(n, "segments are numbered from 1"));
    }

    let profile = config.profile();
    let entries = config.entries() as f64;
    let target = target_error(config.precision(), n);
    if !(target.is_finite() && target > 0.0) {
        return Err(BloomError::sizing(n, "target error rate underflows to zero"));
    }

    let width = (-(entries * target.ln()) / profile.ln2_squared()).floor();
    if !width.is_finite() {
        return Err(BloomError::sizing(n, format!("non-finite width {}", width)));
    }
    if width < 1.0 {
        return Err(BloomError::sizing(n, "segment would have zero width"));
    }
    if width > crate::config::MAX_SEGMENT_BITS as f64 {
        return Err(BloomError::sizing(
            n,
            format!(
                "width {} exceeds the maximum of {} bits",
                width,
                crate::config::MAX_SEGMENT_BITS
            ),
        ));
    }
    let bits = width as u64;

    let k = (profile.ln2() * bits as f64 / entries).floor();
    if !(k.is_finite() && k >= 1.0) {
        return Err(BloomError::sizing(n, "segment would use zero hash rounds"));
    }

    Ok(SegmentParams {
        segment: n,
        bits,
        k: k as u64,
        target,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SizingKey {
    entries: u64,
    precision: u64,
    profile: Profile,
    segment: u64,
}

impl SizingKey {
    fn new(config: &FilterConfig, segment: u64) -> Self {
        Self {
            entries: config.entries(),
            precision: config.precision().to_bits(),
            profile: config.profile(),
            segment,
        }
    }
}

fn memo() -> &'static RwLock<HashMap<SizingKey, SegmentParams>> {
    static MEMO: OnceLock<RwLock<HashMap<SizingKey, SegmentParams>>> = OnceLock::new();
    MEMO.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Segment sizer for one filter configuration
#[derive(Debug, Clone, Copy)]
pub struct SegmentSizer {
    config: FilterConfig,
}

impl SegmentSizer {
    /// Create a sizer
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Configuration being sized
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Parameters of segment `n`
    pub fn params(&self, n: u64) -> Result<SegmentParams> {
        let key = SizingKey::new(&self.config, n);
        if let Some(params) = memo().read().get(&key) {
            return Ok(*params);
        }

        let params = segment_params(&self.config, n)?;

        let mut memo = memo().write();
        if memo.len() >= crate::config::SIZING_CACHE_CAPACITY {
            memo.clear();
        }
        memo.insert(key, params);

        Ok(params)
    }

    /// Upper bound on the cumulative false-positive probability of
    /// segments `1..=segments`
    pub fn error_bound(&self, segments: u64) -> f64 {
        let precision = self.config.precision();
        (1..=segments).map(|n| target_error(precision, n)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::LN_2;

    #[test]
    fn test_worked_example() {
        let config = FilterConfig::new(100, 0.001).unwrap();
        let params = segment_params(&config, 1).unwrap();

        let expected_bits = (-(100.0 * (0.001f64 * 0.5).ln()) / (LN_2 * LN_2)).floor() as u64;
        let expected_k = (LN_2 * expected_bits as f64 / 100.0).floor() as u64;
        assert_eq!(params.bits, expected_bits);
        assert_eq!(params.k, expected_k);
        assert_eq!(params.target, 0.0005);
    }

    #[test]
    fn test_segments_tighten() {
        let sizer = SegmentSizer::new(FilterConfig::new(1_000, 0.01).unwrap());
        let mut previous = sizer.params(1).unwrap();
        for n in 2..20 {
            let params = sizer.params(n).unwrap();
            assert!(params.bits > previous.bits);
            assert!(params.k >= previous.k);
            assert!(params.target < previous.target);
            previous = params;
        }
    }

    #[test]
    fn test_memo_matches_direct() {
        let config = FilterConfig::new(250, 0.05).unwrap();
        let sizer = SegmentSizer::new(config);
        for n in 1..8 {
            assert_eq!(sizer.params(n).unwrap(), segment_params(&config, n).unwrap());
            assert_eq!(sizer.params(n).unwrap(), segment_params(&config, n).unwrap());
        }
    }

    #[test]
    fn test_compat_constants() {
        let config = FilterConfig::new(100, 0.001)
            .unwrap()
            .with_profile(Profile::LuaCompat);
        let params = segment_params(&config, 1).unwrap();
        let expected_bits = (-(100.0 * (0.001f64 * 0.5).ln()) / 0.480453013).floor() as u64;
        assert_eq!(params.bits, expected_bits);
        assert_eq!(params.k, (0.693147180 * expected_bits as f64 / 100.0).floor() as u64);
    }

    #[test]
    fn test_rejects_degenerate_segments() {
        let config = FilterConfig::new(1, 0.99).unwrap();
        assert!(matches!(
            segment_params(&config, 1),
            Err(BloomError::Sizing { segment: 1, .. })
        ));

        let config = FilterConfig::new(100, 0.01).unwrap();
        assert!(segment_params(&config, 0).is_err());
        assert!(segment_params(&config, 5_000).is_err());

        let config = FilterConfig::new(1_000_000_000, 0.01).unwrap();
        assert!(segment_params(&config, 1).is_err());
    }

    #[test]
    fn test_error_bound() {
        let sizer = SegmentSizer::new(FilterConfig::new(10, 0.1).unwrap());
        assert_eq!(sizer.error_bound(0), 0.0);
        assert!((sizer.error_bound(1) - 0.05).abs() < 1e-12);
        assert!(sizer.error_bound(20) < 0.1);
    }
}
