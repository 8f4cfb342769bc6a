//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use offline_cache_layer::cache::{
    CacheStore, MemoryCacheStore, PartitionHandle, RequestIdentity, Snapshot, StoreError,
};
use offline_cache_layer::config::Config;
use offline_cache_layer::net::{FetchError, Fetcher, Method, RequestDescriptor, Response};
use offline_cache_layer::notify::{NotificationOptions, Notifier, NotifyError};
use offline_cache_layer::sync::MemoryPendingStore;
use offline_cache_layer::{ServiceLayer, Services};

pub const ORIGIN: &str = "https://app.test/";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn ok(body: &str, content_type: &str) -> Response {
    Response::new(200)
        .with_header("content-type", content_type)
        .with_body(body.to_string())
}

/// Fetcher answering from a table keyed by URL. Unknown URLs fail as
/// unreachable. Every call is recorded.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Result<Response, String>>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Ok(response));
    }

    pub fn fail(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Err("connection refused".to_string()));
    }

    /// Every route fails from now on.
    pub fn go_offline(&self) {
        for route in self.routes.lock().unwrap().values_mut() {
            *route = Err("offline".to_string());
        }
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| *u == target)
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.to_string()));
        match self.routes.lock().unwrap().get(request.url.as_str()) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(reason)) => Err(FetchError::Transport(reason.clone())),
            None => Err(FetchError::Transport("unreachable".to_string())),
        }
    }
}

/// Memory store whose reads and/or writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryCacheStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("injected failure".to_string())
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn open(&self, partition: &str) -> Result<PartitionHandle, StoreError> {
        self.inner.open(partition).await
    }

    async fn open_existing(&self, partition: &str) -> Result<Option<PartitionHandle>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.open_existing(partition).await
    }

    async fn get(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
    ) -> Result<Option<Snapshot>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.get(handle, identity).await
    }

    async fn put(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
        snapshot: Snapshot,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.put(handle, identity, snapshot).await
    }

    async fn keys(&self, handle: &PartitionHandle) -> Result<Vec<RequestIdentity>, StoreError> {
        self.inner.keys(handle).await
    }

    async fn list_partition_names(&self) -> Result<BTreeSet<String>, StoreError> {
        self.inner.list_partition_names().await
    }

    async fn delete(&self, partition: &str) -> Result<bool, StoreError> {
        self.inner.delete(partition).await
    }
}

/// Notifier that remembers what it was asked to show.
#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<(String, NotificationOptions)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<(), NotifyError> {
        self.shown.lock().unwrap().push((title.to_string(), options));
        Ok(())
    }
}

pub fn test_config(manifest: &[&str]) -> Config {
    let mut config = Config::default();
    config.origin.url = Url::parse(ORIGIN).unwrap();
    config.cache.manifest = manifest.iter().map(|p| p.to_string()).collect();
    config
}

/// A layer wired to in-memory doubles.
pub struct Harness {
    pub layer: ServiceLayer,
    pub store: Arc<FlakyStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub pending: Arc<MemoryPendingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: Config,
}

impl Harness {
    pub fn new(manifest: &[&str]) -> Self {
        Self::with_config(test_config(manifest))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(FlakyStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pending = Arc::new(MemoryPendingStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let layer = ServiceLayer::new(
            &config,
            Services {
                store: store.clone(),
                fetcher: fetcher.clone(),
                pending: pending.clone(),
                notifier: notifier.clone(),
            },
        )
        .unwrap();

        Self {
            layer,
            store,
            fetcher,
            pending,
            notifier,
            config,
        }
    }

    /// Snapshot stored under `path` in the named partition, if any.
    pub async fn cached(&self, partition: &str, path: &str) -> Option<Snapshot> {
        let handle = self.store.open_existing(partition).await.unwrap()?;
        self.store
            .get(&handle, &RequestIdentity::get(&url(path)))
            .await
            .unwrap()
    }

    pub async fn seed(&self, partition: &str, path: &str, response: Response) {
        let handle = self.store.open(partition).await.unwrap();
        self.store
            .put(&handle, &RequestIdentity::get(&url(path)), Snapshot::capture(&response))
            .await
            .unwrap();
    }
}
