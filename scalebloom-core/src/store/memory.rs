//! In-process backing store

use super::{AtomicUnit, BackingStore, Bitmap, StoreTxn, UnitDigest};
use crate::{BloomError, Request, Result};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Value held under a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    /// Integer counter
    Counter(u64),
    /// Bit array
    Bits(Bitmap),
}

impl StoredValue {
    fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Counter(_) => "counter",
            StoredValue::Bits(_) => "bitmap",
        }
    }
}

/// In-memory store configuration
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Largest bit offset accepted by `set_bit`
    pub max_bit_offset: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_bit_offset: crate::config::MAX_SEGMENT_BITS - 1,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub keys: usize,
    pub counters: usize,
    pub bitmaps: usize,
    pub bitmap_bytes: usize,
    pub units: usize,
}

/// Backing store that keeps its keyspace in memory
///
/// Every unit runs while holding the keyspace lock, so runs are serialized
/// exactly like scripts on a single-threaded server.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    keyspace: Mutex<HashMap<String, StoredValue>>,
    units: RwLock<HashMap<UnitDigest, Arc<dyn AtomicUnit>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self::with_keyspace(config, HashMap::new())
    }

    pub(crate) fn with_keyspace(
        config: MemoryStoreConfig,
        keyspace: HashMap<String, StoredValue>,
    ) -> Self {
        Self {
            config,
            keyspace: Mutex::new(keyspace),
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every registered unit, as a store does when its script cache is flushed
    pub fn flush_units(&self) -> usize {
        let mut units = self.units.write();
        let count = units.len();
        units.clear();
        debug!("Flushed {} atomic units", count);
        count
    }

    /// Copy of the value under `key`
    pub fn get(&self, key: &str) -> Option<StoredValue> {
        self.keyspace.lock().get(key).cloned()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keyspace.lock().len()
    }

    /// Whether the keyspace is empty
    pub fn is_empty(&self) -> bool {
        self.keyspace.lock().is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let keyspace = self.keyspace.lock();
        let mut stats = StoreStats {
            keys: keyspace.len(),
            units: self.units.read().len(),
            ..Default::default()
        };
        for value in keyspace.values() {
            match value {
                StoredValue::Counter(_) => stats.counters += 1,
                StoredValue::Bits(bitmap) => {
                    stats.bitmaps += 1;
                    stats.bitmap_bytes += bitmap.byte_len();
                }
            }
        }
        stats
    }

    pub(crate) fn dump(&self) -> Vec<(String, StoredValue)> {
        let keyspace = self.keyspace.lock();
        let mut entries: Vec<_> = keyspace
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl BackingStore for MemoryStore {
    fn unit_exists(&self, digest: &UnitDigest) -> Result<bool> {
        Ok(self.units.read().contains_key(digest))
    }

    fn register_unit(&self, unit: Arc<dyn AtomicUnit>) -> Result<UnitDigest> {
        let digest = unit.digest();
        self.units.write().insert(digest, unit);
        debug!("Registered atomic unit {}", digest);
        Ok(digest)
    }

    fn execute(&self, digest: &UnitDigest, request: &Request) -> Result<u64> {
        let unit = self
            .units
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| BloomError::UnitNotFound(digest.to_hex()))?;

        let mut keyspace = self.keyspace.lock();
        let mut txn = MemoryTxn {
            keyspace: &mut *keyspace,
            max_bit_offset: self.config.max_bit_offset,
        };
        unit.run(&mut txn, request)
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let keyspace = self.keyspace.lock();
        let mut keys: Vec<String> = keyspace
            .keys()
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.keyspace.lock().remove(key).is_some())
    }
}

struct MemoryTxn<'a> {
    keyspace: &'a mut HashMap<String, StoredValue>,
    max_bit_offset: u64,
}

impl MemoryTxn<'_> {
    fn wrong_type(key: &str, found: &StoredValue, wanted: &str) -> BloomError {
        BloomError::Store(format!(
            "WRONGTYPE key {} holds a {}, not a {}",
            key,
            found.type_name(),
            wanted
        ))
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn get_counter(&mut self, key: &str) -> Result<Option<u64>> {
        match self.keyspace.get(key) {
            None => Ok(None),
            Some(StoredValue::Counter(value)) => Ok(Some(*value)),
            Some(other) => Err(Self::wrong_type(key, other, "counter")),
        }
    }

    fn incr_counter(&mut self, key: &str) -> Result<u64> {
        let value = self
            .keyspace
            .entry(key.to_string())
            .or_insert(StoredValue::Counter(0));
        match value {
            StoredValue::Counter(count) => {
                *count = count
                    .checked_add(1)
                    .ok_or_else(|| BloomError::Store(format!("counter {} overflows", key)))?;
                Ok(*count)
            }
            other => Err(Self::wrong_type(key, other, "counter")),
        }
    }

    fn get_bit(&mut self, key: &str, offset: u64) -> Result<bool> {
        match self.keyspace.get(key) {
            None => Ok(false),
            Some(StoredValue::Bits(bitmap)) => Ok(bitmap.get(offset)),
            Some(other) => Err(Self::wrong_type(key, other, "bitmap")),
        }
    }

    fn set_bit(&mut self, key: &str, offset: u64, value: bool) -> Result<bool> {
        if offset > self.max_bit_offset {
            return Err(BloomError::Store(format!(
                "bit offset {} is out of range (max {})",
                offset, self.max_bit_offset
            )));
        }

        let slot = self
            .keyspace
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Bits(Bitmap::new()));
        match slot {
            StoredValue::Bits(bitmap) => Ok(bitmap.set(offset, value)),
            other => Err(Self::wrong_type(key, other, "bitmap")),
        }
    }
}

/// Translate a store glob into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("(?s)^");
    let mut chars = pattern.chars();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        if in_class {
            match c {
                ']' => {
                    expr.push(']');
                    in_class = false;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        expr.push_str(&regex::escape(&next.to_string()));
                    }
                }
                '[' | '&' | '~' => {
                    expr.push('\\');
                    expr.push(c);
                }
                _ => expr.push(c),
            }
            continue;
        }

        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            '[' => {
                expr.push('[');
                in_class = true;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    expr.push_str(&regex::escape(&next.to_string()));
                }
            }
            _ => expr.push_str(&regex::escape(&c.to_string())),
        }
    }

    if in_class {
        return Err(BloomError::InvalidFormat(format!(
            "unterminated character class in pattern {}",
            pattern
        )));
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| BloomError::InvalidFormat(e.to_string()))
}
