//! Point-in-time snapshots of a [`MemoryStore`]
//!
//! Only the keyspace is persisted. Registered units are a cache and must be
//! registered again after a restore, which filters do on their own when the
//! store reports a missing unit.

use super::{MemoryStore, MemoryStoreConfig, StoredValue};
use crate::{BloomError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const MAGIC: &[u8; 8] = b"SBLMSNAP";
const VERSION: u8 = 1;

/// Decoded snapshot contents
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Keyspace entries sorted by key
    pub entries: Vec<(String, StoredValue)>,
}

/// Summary of a written snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub keys: usize,
    pub bytes: usize,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Serialize with header and CRC checksum
    ///
    /// Format:
    /// - 8 bytes: magic
    /// - 8 bytes: body length
    /// - 1 byte: version
    /// - 8 bytes: creation time (unix millis)
    /// - 8 bytes: payload length
    /// - N bytes: payload (bincode keyspace entries)
    /// - 4 bytes: CRC32 of the body
    pub fn encode(&self) -> Result<Bytes> {
        let payload = bincode::serialize(&self.entries)
            .map_err(|e| BloomError::InvalidFormat(e.to_string()))?;

        let mut body = BytesMut::with_capacity(17 + payload.len());
        body.put_u8(VERSION);
        body.put_i64_le(self.created_at.timestamp_millis());
        body.put_u64_le(payload.len() as u64);
        body.put_slice(&payload);

        let mut buf = BytesMut::with_capacity(MAGIC.len() + 8 + body.len() + 4);
        buf.put_slice(MAGIC);
        buf.put_u64_le(body.len() as u64);
        buf.put_slice(&body);
        buf.put_u32_le(crc32fast::hash(&body));

        Ok(buf.freeze())
    }

    /// Deserialize, validating magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < MAGIC.len() + 8 {
            return Err(BloomError::InvalidFormat("Snapshot too short".into()));
        }
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(BloomError::InvalidFormat("Bad snapshot magic".into()));
        }
        buf.advance(MAGIC.len());

        let body_len = buf.get_u64_le() as usize;
        if body_len
            .checked_add(4)
            .map_or(true, |needed| buf.remaining() < needed)
        {
            return Err(BloomError::InvalidFormat("Incomplete snapshot".into()));
        }
        let (body, rest) = buf.split_at(body_len);
        buf = rest;

        let expected = buf.get_u32_le();
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(BloomError::ChecksumMismatch { expected, actual });
        }

        let mut body = body;
        if body.remaining() < 17 {
            return Err(BloomError::Corruption("Snapshot header truncated".into()));
        }
        let version = body.get_u8();
        if version != VERSION {
            return Err(BloomError::InvalidFormat(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }
        let millis = body.get_i64_le();
        let created_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| BloomError::Corruption(format!("Invalid timestamp: {}", millis)))?;

        let payload_len = body.get_u64_le() as usize;
        if body.remaining() != payload_len {
            return Err(BloomError::Corruption("Snapshot payload length mismatch".into()));
        }
        let entries = bincode::deserialize(body)
            .map_err(|e| BloomError::Corruption(e.to_string()))?;

        Ok(Self {
            created_at,
            entries,
        })
    }

    /// Write to `path` through a temporary file and an atomic rename
    pub fn write_to(&self, path: &Path) -> Result<SnapshotInfo> {
        let encoded = self.encode()?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        Ok(SnapshotInfo {
            path: path.to_path_buf(),
            keys: self.entries.len(),
            bytes: encoded.len(),
            created_at: self.created_at,
        })
    }

    /// Read and decode the snapshot at `path`
    pub fn read_from(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Self::decode(&data)
    }
}

impl MemoryStore {
    /// Capture the current keyspace
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            created_at: Utc::now(),
            entries: self.dump(),
        }
    }

    /// Persist the current keyspace to `path`
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<SnapshotInfo> {
        let info = self.snapshot().write_to(path.as_ref())?;
        info!(
            "Saved snapshot with {} keys ({} bytes) to {:?}",
            info.keys, info.bytes, info.path
        );
        Ok(info)
    }

    /// Open a store from the snapshot at `path`
    pub fn load_snapshot(path: impl AsRef<Path>, config: MemoryStoreConfig) -> Result<Self> {
        let snapshot = Snapshot::read_from(path.as_ref())?;
        info!(
            "Loaded snapshot with {} keys taken at {}",
            snapshot.entries.len(),
            snapshot.created_at
        );
        Ok(Self::with_keyspace(config, snapshot.entries.into_iter().collect()))
    }
}
