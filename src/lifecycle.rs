//! Lifecycle Manager: population on install, eviction of superseded
//! generations on activate.
//!
//! ```text
//! Uninitialized ──install──▶ Populating ──ok──▶ Ready
//!                                 └────err────▶ Uninitialized
//! (any) ──activate──▶ Activating ──ok──▶ Active
//! ```
//!
//! The recorded phase is informational. Neither operation depends on it, so
//! a host that restarts between events loses nothing.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::partition::PartitionNames;
use crate::cache::snapshot::{RequestIdentity, Snapshot};
use crate::cache::store::{CacheStore, StoreError};
use crate::net::fetcher::{FetchError, Fetcher};
use crate::net::message::{RequestDescriptor, Response};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid manifest path {path:?}: {source}")]
    InvalidPath {
        path: String,
        source: url::ParseError,
    },

    #[error("Failed to fetch {url}: {source}")]
    Fetch { url: Url, source: FetchError },

    #[error("Fetching {url} returned status {status}")]
    Status { url: Url, status: u16 },

    #[error("Failed to store manifest entry: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ActivateError {
    #[error("Failed to open current partition {name}: {source}")]
    Open { name: String, source: StoreError },

    #[error("Failed to enumerate partitions: {0}")]
    List(StoreError),

    #[error("Failed to delete partition {name}: {source}")]
    Delete { name: String, source: StoreError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Uninitialized,
    Populating,
    Ready,
    Activating,
    Active,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Uninitialized => "uninitialized",
            LifecyclePhase::Populating => "populating",
            LifecyclePhase::Ready => "ready",
            LifecyclePhase::Activating => "activating",
            LifecyclePhase::Active => "active",
        }
    }
}

/// Result of a successful population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Number of manifest entries stored.
    pub cached: usize,
    /// Supersede any waiting instance immediately.
    pub skip_waiting: bool,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Superseded partitions that were deleted.
    pub deleted: Vec<String>,
    /// Start intercepting all in-scope traffic, including open pages.
    pub claim_clients: bool,
}

pub struct LifecycleManager {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    names: PartitionNames,
    origin: Url,
    manifest: Vec<String>,
    phase: RwLock<LifecyclePhase>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        names: PartitionNames,
        origin: Url,
        manifest: Vec<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            names,
            origin,
            manifest,
            phase: RwLock::new(LifecyclePhase::Uninitialized),
        }
    }

    pub async fn phase(&self) -> LifecyclePhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: LifecyclePhase) {
        *self.phase.write().await = phase;
    }

    /// Populate the static partition from the manifest, all-or-nothing.
    pub async fn install(&self) -> Result<InstallReport, InstallError> {
        info!(
            partition = self.names.static_name(),
            entries = self.manifest.len(),
            "Installing"
        );
        self.set_phase(LifecyclePhase::Populating).await;

        match self.populate().await {
            Ok(cached) => {
                self.set_phase(LifecyclePhase::Ready).await;
                info!(cached, "Installation complete");
                Ok(InstallReport {
                    cached,
                    skip_waiting: true,
                })
            }
            Err(e) => {
                self.set_phase(LifecyclePhase::Uninitialized).await;
                error!(error = %e, "Installation failed");
                Err(e)
            }
        }
    }

    async fn populate(&self) -> Result<usize, InstallError> {
        let urls = self
            .manifest
            .iter()
            .map(|path| {
                self.origin.join(path).map_err(|source| InstallError::InvalidPath {
                    path: path.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Nothing touches the store until every manifest fetch has succeeded.
        let fetched = try_join_all(urls.into_iter().map(|url| self.fetch_manifest_entry(url))).await?;

        let partition = self.names.static_name();
        let handle = self.store.open(partition).await?;
        let writes = join_all(fetched.into_iter().map(|(identity, response)| {
            let handle = &handle;
            async move {
                self.store
                    .put(handle, &identity, Snapshot::from(response))
                    .await
            }
        }))
        .await;

        let stored = writes.len();
        if let Some(err) = writes.into_iter().find_map(Result::err) {
            // Leave no partially populated partition behind.
            if let Err(e) = self.store.delete(partition).await {
                warn!(partition, error = %e, "Failed to remove partial partition");
            }
            return Err(err.into());
        }

        Ok(stored)
    }

    async fn fetch_manifest_entry(&self, url: Url) -> Result<(RequestIdentity, Response), InstallError> {
        let request = RequestDescriptor::get(url.clone());
        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(source) => return Err(InstallError::Fetch { url, source }),
        };
        if !response.is_success() {
            return Err(InstallError::Status {
                url,
                status: response.status,
            });
        }
        debug!(url = %url, "Fetched manifest entry");
        Ok((RequestIdentity::of(&request), response))
    }

    /// Whether the store already holds the current generation's static
    /// partition, from an earlier install or activation.
    pub async fn is_installed(&self) -> Result<bool, StoreError> {
        let names = self.store.list_partition_names().await?;
        Ok(names.contains(self.names.static_name()))
    }

    /// Delete every partition that is not part of the current generation.
    pub async fn activate(&self) -> Result<ActivateReport, ActivateError> {
        info!(version = self.names.version(), "Activating");
        let previous = self.phase().await;
        self.set_phase(LifecyclePhase::Activating).await;

        match self.evict_superseded().await {
            Ok(deleted) => {
                self.set_phase(LifecyclePhase::Active).await;
                info!(deleted = deleted.len(), "Activation complete");
                Ok(ActivateReport {
                    deleted,
                    claim_clients: true,
                })
            }
            Err(e) => {
                self.set_phase(previous).await;
                error!(error = %e, "Activation failed");
                Err(e)
            }
        }
    }

    async fn evict_superseded(&self) -> Result<Vec<String>, ActivateError> {
        // Both current partitions exist once activation completes, even
        // before the first runtime write.
        let current = [self.names.static_name(), self.names.dynamic_name()];
        let opened = join_all(current.iter().map(|name| self.store.open(name))).await;
        for (name, result) in current.iter().zip(opened) {
            if let Err(source) = result {
                return Err(ActivateError::Open {
                    name: name.to_string(),
                    source,
                });
            }
        }

        let names = self
            .store
            .list_partition_names()
            .await
            .map_err(ActivateError::List)?;

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| !self.names.is_current(name))
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            info!(partition = %name, "Deleting superseded partition");
            self.store.delete(name).await
        }))
        .await;

        for (name, result) in stale.iter().zip(results) {
            if let Err(source) = result {
                return Err(ActivateError::Delete {
                    name: name.clone(),
                    source,
                });
            }
        }

        Ok(stale)
    }
}
