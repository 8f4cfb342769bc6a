//! Runtime configuration for offline-cache-layer.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Every section has defaults, so a missing file or a partial file is fine.
//! The manifest of must-cache paths is the only configuration the caching
//! policy itself depends on; everything else tunes the host around it.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::partition::PartitionNames;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "offline-cache-layer",
    about = "Offline-first caching layer in front of a web origin"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host (HTTP front) configuration.
    pub server: ServerConfig,

    /// The application origin the layer serves.
    pub origin: OriginConfig,

    /// Cache partitions, generation and manifest.
    pub cache: CacheConfig,

    /// At-rest compression for the disk store.
    pub compression: CompressionConfig,

    /// Deferred submission replay.
    pub sync: SyncConfig,

    /// Push notification presentation.
    pub notifications: NotificationConfig,
}

/// HTTP front settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8080").
    pub listen: String,

    /// Maximum request body accepted by the front, in bytes.
    pub body_limit_bytes: usize,

    /// Run install and activate once at startup.
    pub auto_lifecycle: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            body_limit_bytes: 10 * 1024 * 1024,
            auto_lifecycle: true,
        }
    }
}

/// Origin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the application. Requests to any other origin pass through.
    pub url: Url,

    /// Network request timeout in seconds.
    pub request_timeout_secs: u64,

    /// User agent sent upstream.
    pub user_agent: String,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://127.0.0.1:3000/").expect("default origin is a valid URL"),
            request_timeout_secs: 30,
            user_agent: format!("offline-cache-layer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where partitions are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory; lost on restart.
    Memory,
    /// One directory per partition under `storage_path`.
    Disk,
}

/// Cache partition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Current generation identifier, embedded in partition names.
    pub version: String,

    /// Prefix of the static (build-time manifest) partition.
    pub static_prefix: String,

    /// Prefix of the dynamic (discovered at runtime) partition.
    pub dynamic_prefix: String,

    /// Path of the designated offline document.
    pub offline_document: String,

    /// Ordered must-cache paths, stored into the static partition on install.
    pub manifest: Vec<String>,

    /// Store backend.
    pub storage: StorageKind,

    /// Root directory for the disk store.
    pub storage_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            static_prefix: "static-cache".to_string(),
            dynamic_prefix: "dynamic-cache".to_string(),
            offline_document: "/offline.html".to_string(),
            manifest: [
                "/",
                "/admin/",
                "/about/",
                "/contact/",
                "/posts/",
                "/projects/",
                "/testimonials/",
                "/css/main.css",
                "/js/main.js",
                "/images/logo.png",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            storage: StorageKind::Memory,
            storage_path: PathBuf::from("/tmp/offline-cache-layer"),
        }
    }
}

/// Compression of stored response bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Apply zstd compression to bodies written by the disk store.
    pub zstd_bodies: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            zstd_bodies: true,
            zstd_level: 3,
        }
    }
}

/// Deferred submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Background-sync tag that triggers a replay.
    pub tag: String,

    /// JSON file holding pending submissions. `None` keeps them in memory.
    pub pending_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: "form-submission".to_string(),
            pending_path: None,
        }
    }
}

/// A user-actionable notification button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Push notification presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Action that opens a window when clicked.
    pub open_action: String,
    /// URL opened by `open_action`.
    pub open_url: String,
    pub actions: Vec<ActionConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/images/icon-192x192.png".to_string(),
            badge: "/images/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            open_action: "explore".to_string(),
            open_url: "/".to_string(),
            actions: vec![
                ActionConfig {
                    action: "explore".to_string(),
                    title: "View".to_string(),
                    icon: "/images/checkmark.png".to_string(),
                },
                ActionConfig {
                    action: "close".to_string(),
                    title: "Close".to_string(),
                    icon: "/images/xmark.png".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Partition names for the configured generation.
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::new(
            &self.cache.static_prefix,
            &self.cache.dynamic_prefix,
            &self.cache.version,
        )
    }
}
