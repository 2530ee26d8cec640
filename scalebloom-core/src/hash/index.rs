//! Bit-position generation

use super::HashMaterial;

/// Bit position for round `i` (1-based) within a segment of `bits` bits
///
/// `raw(i) = h[i mod 2] + i * h[2 + ((i + i mod 2) mod 4) / 2]`, reduced
/// modulo `bits`. Odd rounds pair `h[1]` with `h[3]` for `i ≡ 1 (mod 4)` and
/// `h[2]` for `i ≡ 3`. Even rounds pair `h[0]` with `h[3]` for `i ≡ 2` and
/// `h[2]` for `i ≡ 0`. The layout is fixed by data already written to
/// deployed stores.
#[inline]
pub fn position(i: u64, h: &HashMaterial, bits: u64) -> u64 {
    debug_assert!(i >= 1, "rounds are 1-based");
    debug_assert!(bits > 0, "segment width must be positive");

    let base = h.word((i % 2) as usize);
    let step = h.word(2 + (((i + i % 2) % 4) / 2) as usize);
    (base + i * step) % bits
}

/// Positions for rounds `1..=k`
pub fn positions(h: &HashMaterial, k: u64, bits: u64) -> impl Iterator<Item = u64> + '_ {
    (1..=k).map(move |i| position(i, h, bits))
}
