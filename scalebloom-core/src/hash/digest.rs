//! Digest-based hash material

use crate::Profile;
use sha1::{Digest, Sha1};

/// Number of hash words derived per element
pub const HASH_WORDS: usize = 4;

/// Hexadecimal windows of the 40-digit digest read by the compatibility
/// profile, as `[start, end)` nibble offsets
const COMPAT_WINDOWS: [(usize, usize); HASH_WORDS] = [(0, 8), (7, 16), (15, 24), (23, 32)];

/// Four hash words derived from an element
///
/// Words are held as `u64`. Under [`Profile::Standard`] each word fits in 32
/// bits; the compatibility profile reads 9-digit windows and can produce
/// words up to 36 bits wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashMaterial(pub [u64; HASH_WORDS]);

impl HashMaterial {
    /// Word at `idx`
    #[inline]
    pub fn word(&self, idx: usize) -> u64 {
        self.0[idx]
    }
}

/// Derive hash material for `data`
///
/// The element is hashed with SHA-1. The standard profile splits the 160-bit
/// digest's first 128 bits into four consecutive big-endian `u32` words,
/// which is the same as parsing consecutive 8-digit hex groups.
pub fn derive(data: &[u8], profile: Profile) -> HashMaterial {
    let digest = Sha1::digest(data);
    let mut words = [0u64; HASH_WORDS];

    match profile {
        Profile::Standard => {
            for (i, chunk) in digest.chunks_exact(4).take(HASH_WORDS).enumerate() {
                words[i] = u64::from(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        Profile::LuaCompat => {
            for (i, &(start, end)) in COMPAT_WINDOWS.iter().enumerate() {
                words[i] = (start..end).fold(0u64, |acc, nib| (acc << 4) | nibble(&digest, nib));
            }
        }
    }

    HashMaterial(words)
}

#[inline]
fn nibble(digest: &[u8], idx: usize) -> u64 {
    let byte = digest[idx / 2];
    let value = if idx % 2 == 0 { byte >> 4 } else { byte & 0x0f };
    u64::from(value)
}
