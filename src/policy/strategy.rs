//! Strategy Executors.
//!
//! Every strategy has the same shape: try source A, then source B, then
//! synthesize a terminal response. Execution never fails; transport and store
//! errors degrade to the next source.
//!
//! A 2xx network response is duplicated and written to the strategy's
//! partition before it is returned. Non-2xx responses are returned but not
//! stored. Cache hits are served as-is, without revalidation.

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::cache::partition::{PartitionKind, PartitionNames};
use crate::cache::snapshot::{RequestIdentity, Snapshot};
use crate::cache::store::CacheStore;
use crate::net::fetcher::{FetchError, Fetcher};
use crate::net::message::{RequestDescriptor, Response};
use crate::policy::fallback;
use crate::policy::router::Strategy;

/// Where a strategy's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The designated offline document, read from cache.
    OfflineDocument,
    /// Built by the layer (offline page, placeholder image, 404).
    Synthesized,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineDocument => "offline_document",
            ResponseSource::Synthesized => "synthesized",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub response: Response,
    pub source: ResponseSource,
}

impl StrategyOutcome {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Runs strategies against the injected store and transport.
pub struct StrategyExecutor {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    names: PartitionNames,
    offline_document: RequestIdentity,
}

impl StrategyExecutor {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        names: PartitionNames,
        offline_document: &Url,
    ) -> Self {
        Self {
            store,
            fetcher,
            names,
            offline_document: RequestIdentity::get(offline_document),
        }
    }

    pub async fn execute(&self, strategy: Strategy, request: &RequestDescriptor) -> StrategyOutcome {
        let outcome = match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirstImage => self.cache_first_image(request).await,
            Strategy::CacheFirstAsset => self.cache_first_asset(request).await,
            Strategy::NetworkFirstWithFallback => self.network_first_with_fallback(request).await,
        };

        debug!(
            strategy = %strategy,
            url = %request.url,
            source = outcome.source.as_str(),
            status = outcome.response.status,
            "Served"
        );
        outcome
    }

    async fn network_first(&self, request: &RequestDescriptor) -> StrategyOutcome {
        let error = match self.fetch_and_store(PartitionKind::Dynamic, request).await {
            Ok(response) => return StrategyOutcome::new(response, ResponseSource::Network),
            Err(e) => e,
        };
        debug!(url = %request.url, error = %error, "Network failed, trying cache");

        let identity = RequestIdentity::of(request);
        if let Some(cached) = self.lookup(PartitionKind::Dynamic, &identity).await {
            return StrategyOutcome::new(cached, ResponseSource::Cache);
        }
        if let Some(offline) = self.lookup(PartitionKind::Static, &self.offline_document).await {
            return StrategyOutcome::new(offline, ResponseSource::OfflineDocument);
        }
        StrategyOutcome::new(fallback::offline_document(), ResponseSource::Synthesized)
    }

    async fn cache_first_image(&self, request: &RequestDescriptor) -> StrategyOutcome {
        let identity = RequestIdentity::of(request);
        if let Some(cached) = self.lookup(PartitionKind::Dynamic, &identity).await {
            return StrategyOutcome::new(cached, ResponseSource::Cache);
        }

        match self.fetch_and_store(PartitionKind::Dynamic, request).await {
            Ok(response) => StrategyOutcome::new(response, ResponseSource::Network),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Image unavailable");
                StrategyOutcome::new(fallback::placeholder_image(), ResponseSource::Synthesized)
            }
        }
    }

    async fn cache_first_asset(&self, request: &RequestDescriptor) -> StrategyOutcome {
        let identity = RequestIdentity::of(request);
        if let Some(cached) = self.lookup(PartitionKind::Static, &identity).await {
            return StrategyOutcome::new(cached, ResponseSource::Cache);
        }

        match self.fetch_and_store(PartitionKind::Static, request).await {
            Ok(response) => StrategyOutcome::new(response, ResponseSource::Network),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Asset unavailable");
                StrategyOutcome::new(fallback::not_found(), ResponseSource::Synthesized)
            }
        }
    }

    async fn network_first_with_fallback(&self, request: &RequestDescriptor) -> StrategyOutcome {
        let error = match self.fetch_and_store(PartitionKind::Dynamic, request).await {
            Ok(response) => return StrategyOutcome::new(response, ResponseSource::Network),
            Err(e) => e,
        };
        debug!(url = %request.url, error = %error, "Network failed, trying cache");

        let identity = RequestIdentity::of(request);
        match self.lookup(PartitionKind::Dynamic, &identity).await {
            Some(cached) => StrategyOutcome::new(cached, ResponseSource::Cache),
            None => StrategyOutcome::new(fallback::not_found(), ResponseSource::Synthesized),
        }
    }

    /// Fetch from the network; on 2xx store a duplicate in `kind`.
    ///
    /// A store failure is logged and does not affect the returned response.
    async fn fetch_and_store(
        &self,
        kind: PartitionKind,
        request: &RequestDescriptor,
    ) -> Result<Response, FetchError> {
        let response = self.fetcher.fetch(request).await?;
        if !response.is_success() {
            return Ok(response);
        }

        let partition = self.names.name(kind);
        let identity = RequestIdentity::of(request);
        let snapshot = Snapshot::from(response.duplicate());

        let stored = match self.store.open(partition).await {
            Ok(handle) => self.store.put(&handle, &identity, snapshot).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!(partition, identity = %identity, error = %e, "Failed to store response");
        }

        Ok(response)
    }

    /// Look `identity` up in `first`, then in the other current partition.
    ///
    /// Missing partitions are skipped, never created. Store errors count as
    /// misses.
    async fn lookup(&self, first: PartitionKind, identity: &RequestIdentity) -> Option<Response> {
        for kind in [first, first.other()] {
            let partition = self.names.name(kind);
            let found = match self.store.open_existing(partition).await {
                Ok(Some(handle)) => self.store.get(&handle, identity).await,
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            match found {
                Ok(Some(snapshot)) => return Some(snapshot.to_response()),
                Ok(None) => {}
                Err(e) => {
                    warn!(partition, identity = %identity, error = %e, "Cache read failed, treating as miss");
                }
            }
        }
        None
    }
}
