//! Growable bit array

use serde::{Deserialize, Serialize};

/// Bit array that grows on write
///
/// Bit `0` is the most significant bit of the first byte, matching the
/// ordering of Redis string bitmaps so dumps are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// Create an empty bitmap
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Addressable width in bits
    pub fn len_bits(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    /// Size of the backing buffer
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of set bits
    pub fn count_ones(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    /// Read a bit; offsets past the end read as zero
    pub fn get(&self, offset: u64) -> bool {
        let (byte, mask) = Self::locate(offset);
        match self.bytes.get(byte) {
            Some(b) => b & mask != 0,
            None => false,
        }
    }

    /// Write a bit and return its previous value
    pub fn set(&mut self, offset: u64, value: bool) -> bool {
        let (byte, mask) = Self::locate(offset);
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }

        let slot = &mut self.bytes[byte];
        let previous = *slot & mask != 0;
        if value {
            *slot |= mask;
        } else {
            *slot &= !mask;
        }
        previous
    }

    #[inline]
    fn locate(offset: u64) -> (usize, u8) {
        ((offset / 8) as usize, 0x80 >> (offset % 8))
    }
}
