//! scalebloom Server - HTTP API for scaling Bloom filters

mod api;
mod catalog;

use anyhow::Context;
use catalog::FilterCatalog;
use scalebloom_core::{config, FilterConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Snapshot file, loaded on start and written on shutdown
    pub snapshot_path: Option<PathBuf>,
    /// Configuration for filters created on first use
    pub default_filter: FilterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 6380)),
            snapshot_path: None,
            default_filter: FilterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SCALEBLOOM_*` environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("SCALEBLOOM_HTTP_ADDR") {
            config.http_addr = addr
                .parse()
                .with_context(|| format!("invalid SCALEBLOOM_HTTP_ADDR: {}", addr))?;
        }
        if let Some(path) = lookup("SCALEBLOOM_SNAPSHOT") {
            config.snapshot_path = Some(PathBuf::from(path));
        }

        let entries = match lookup("SCALEBLOOM_ENTRIES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid SCALEBLOOM_ENTRIES: {}", v))?,
            None => config::DEFAULT_ENTRIES,
        };
        let precision = match lookup("SCALEBLOOM_PRECISION") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid SCALEBLOOM_PRECISION: {}", v))?,
            None => config::DEFAULT_PRECISION,
        };
        config.default_filter = FilterConfig::new(entries, precision)?;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let config = ServerConfig::from_env()?;

    info!("Starting scalebloom server...");
    info!("Snapshot file: {:?}", config.snapshot_path);
    info!("HTTP server: http://{}", config.http_addr);

    let catalog = FilterCatalog::open(config.default_filter, config.snapshot_path.clone())?;
    let catalog = Arc::new(catalog);

    // Create router
    let app = api::create_router(catalog.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("scalebloom server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if config.snapshot_path.is_some() {
        match catalog.save_snapshot() {
            Ok(snapshot) => info!("Wrote shutdown snapshot to {:?}", snapshot.path),
            Err(e) => warn!("Failed to write shutdown snapshot: {}", e),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.http_addr.port(), 6380);
        assert!(config.snapshot_path.is_none());
        assert_eq!(config.default_filter, FilterConfig::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SCALEBLOOM_HTTP_ADDR", "127.0.0.1:9000"),
            ("SCALEBLOOM_SNAPSHOT", "/tmp/sb.snap"),
            ("SCALEBLOOM_ENTRIES", "500"),
            ("SCALEBLOOM_PRECISION", "0.02"),
        ]))
        .unwrap();
        assert_eq!(config.http_addr.port(), 9000);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/sb.snap")));
        assert_eq!(config.default_filter.entries(), 500);
        assert_eq!(config.default_filter.precision(), 0.02);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("SCALEBLOOM_ENTRIES", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("SCALEBLOOM_PRECISION", "2")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("SCALEBLOOM_HTTP_ADDR", "nope")])).is_err());
    }
}
