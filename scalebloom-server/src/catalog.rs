//! Named filters hosted by the server

use parking_lot::RwLock;
use scalebloom_core::store::{MemoryStore, MemoryStoreConfig, SnapshotInfo, StoreStats};
use scalebloom_core::{BloomError, FilterConfig, ScalingBloomFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Catalog error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Core(#[from] BloomError),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("Filter {0} already exists with a different configuration")]
    FilterExists(String),

    #[error("No snapshot path configured")]
    NoSnapshotPath,

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Filter configurations saved next to a store snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    filters: BTreeMap<String, FilterConfig>,
}

/// Catalog statistics
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub filter_count: usize,
    pub store: StoreStats,
}

/// Filters sharing one in-memory store
pub struct FilterCatalog {
    store: Arc<MemoryStore>,
    default_config: FilterConfig,
    snapshot_path: Option<PathBuf>,
    filters: RwLock<HashMap<String, Arc<ScalingBloomFilter>>>,
}

impl FilterCatalog {
    /// Create an empty catalog
    pub fn new(default_config: FilterConfig, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            default_config,
            snapshot_path,
            filters: RwLock::new(HashMap::new()),
        }
    }

    /// Open a catalog, restoring the snapshot at `snapshot_path` if one exists
    pub fn open(default_config: FilterConfig, snapshot_path: Option<PathBuf>) -> Result<Self> {
        let path = match snapshot_path {
            Some(path) if path.exists() => path,
            other => return Ok(Self::new(default_config, other)),
        };

        let store = MemoryStore::load_snapshot(&path, MemoryStoreConfig::default())?;
        let manifest = Self::read_manifest(&manifest_path(&path))?;

        let catalog = Self {
            store: Arc::new(store),
            default_config,
            snapshot_path: Some(path),
            filters: RwLock::new(HashMap::new()),
        };
        for (name, config) in manifest.filters {
            match catalog.create_filter(&name, config) {
                Ok(_) => info!("Restored filter: {}", name),
                Err(e) => warn!("Failed to restore filter {}: {}", name, e),
            }
        }

        Ok(catalog)
    }

    /// Default configuration for filters created on first use
    pub fn default_config(&self) -> &FilterConfig {
        &self.default_config
    }

    /// Create a filter; succeeds if it already exists with the same configuration
    ///
    /// Names may not contain `:`, so no hosted name is a key prefix of another.
    pub fn create_filter(&self, name: &str, config: FilterConfig) -> Result<Arc<ScalingBloomFilter>> {
        validate_name(name)?;
        let mut filters = self.filters.write();

        if let Some(existing) = filters.get(name) {
            if existing.config() == &config {
                return Ok(existing.clone());
            }
            return Err(CatalogError::FilterExists(name.to_string()));
        }

        let filter = ScalingBloomFilter::connect(self.store.clone(), name, config)?;
        let filter = Arc::new(filter);
        filters.insert(name.to_string(), filter.clone());

        info!("Created filter: {} ({:?})", name, config);

        Ok(filter)
    }

    /// Get or create a filter with the default configuration
    pub fn get_or_create_filter(&self, name: &str) -> Result<Arc<ScalingBloomFilter>> {
        if let Some(filter) = self.get_filter(name) {
            return Ok(filter);
        }
        self.create_filter(name, self.default_config)
    }

    /// Get a filter by name
    pub fn get_filter(&self, name: &str) -> Option<Arc<ScalingBloomFilter>> {
        self.filters.read().get(name).cloned()
    }

    /// Clear a filter and forget it, returning the number of keys deleted
    pub fn drop_filter(&self, name: &str) -> Result<usize> {
        let filter = self
            .filters
            .write()
            .remove(name)
            .ok_or_else(|| CatalogError::FilterNotFound(name.to_string()))?;

        let deleted = filter.clear()?;
        info!("Dropped filter: {}", name);

        Ok(deleted)
    }

    /// List all filters
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Write the store snapshot and the filter manifest
    pub fn save_snapshot(&self) -> Result<SnapshotInfo> {
        let path = self
            .snapshot_path
            .as_ref()
            .ok_or(CatalogError::NoSnapshotPath)?;

        let manifest = Manifest {
            filters: self
                .filters
                .read()
                .iter()
                .map(|(name, filter)| (name.clone(), *filter.config()))
                .collect(),
        };
        let encoded = serde_json::to_vec_pretty(&manifest)?;
        std::fs::write(manifest_path(path), encoded).map_err(BloomError::from)?;

        Ok(self.store.save_snapshot(path)?)
    }

    /// Get catalog statistics
    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            filter_count: self.filters.read().len(),
            store: self.store.stats(),
        }
    }

    fn read_manifest(path: &Path) -> Result<Manifest> {
        if !path.exists() {
            warn!("No filter manifest at {:?}, filters must be recreated", path);
            return Ok(Manifest::default());
        }
        let data = std::fs::read(path).map_err(BloomError::from)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(':') {
        return Err(BloomError::Config(format!("invalid filter name {:?}", name)).into());
    }
    Ok(())
}

fn manifest_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("filters.json")
}
