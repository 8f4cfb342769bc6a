//! In-process cache store.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::snapshot::{RequestIdentity, Snapshot};
use crate::cache::store::{validate_partition_name, CacheStore, PartitionHandle, StoreError};

type Partition = HashMap<RequestIdentity, Snapshot>;

/// Partitions held in memory behind a single lock.
#[derive(Default)]
pub struct MemoryCacheStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all partitions.
    pub async fn total_entries(&self) -> usize {
        self.partitions.read().await.values().map(|p| p.len()).sum()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, partition: &str) -> Result<PartitionHandle, StoreError> {
        validate_partition_name(partition)?;
        let mut partitions = self.partitions.write().await;
        partitions.entry(partition.to_string()).or_insert_with(|| {
            debug!(partition, "Created partition");
            HashMap::new()
        });
        Ok(PartitionHandle::new(partition))
    }

    async fn open_existing(&self, partition: &str) -> Result<Option<PartitionHandle>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .contains_key(partition)
            .then(|| PartitionHandle::new(partition)))
    }

    async fn get(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
    ) -> Result<Option<Snapshot>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(handle.name())
            .and_then(|p| p.get(identity))
            .cloned())
    }

    async fn put(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
        snapshot: Snapshot,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .get_mut(handle.name())
            .ok_or_else(|| StoreError::PartitionGone(handle.name().to_string()))?;
        partition.insert(identity.clone(), snapshot);
        Ok(())
    }

    async fn keys(&self, handle: &PartitionHandle) -> Result<Vec<RequestIdentity>, StoreError> {
        let partitions = self.partitions.read().await;
        let mut keys: Vec<RequestIdentity> = partitions
            .get(handle.name())
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn list_partition_names(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }

    async fn delete(&self, partition: &str) -> Result<bool, StoreError> {
        Ok(self.partitions.write().await.remove(partition).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::Response;
    use url::Url;

    fn identity(path: &str) -> RequestIdentity {
        RequestIdentity::get(&Url::parse("https://app.test/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryCacheStore::new();
        let handle = store.open("dynamic-cache-v1").await.unwrap();
        let snap = Snapshot::capture(&Response::new(200).with_body("hello"));

        store.put(&handle, &identity("/a"), snap.clone()).await.unwrap();

        let got = store.get(&handle, &identity("/a")).await.unwrap();
        assert_eq!(got, Some(snap));
        assert!(store.get(&handle, &identity("/b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_is_last_write_wins() {
        let store = MemoryCacheStore::new();
        let handle = store.open("p").await.unwrap();
        let id = identity("/a");

        store
            .put(&handle, &id, Snapshot::capture(&Response::new(200).with_body("one")))
            .await
            .unwrap();
        store
            .put(&handle, &id, Snapshot::capture(&Response::new(200).with_body("two")))
            .await
            .unwrap();

        assert_eq!(store.keys(&handle).await.unwrap(), vec![id.clone()]);
        let got = store.get(&handle, &id).await.unwrap().unwrap();
        assert_eq!(got.body().as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_open_existing_does_not_create() {
        let store = MemoryCacheStore::new();
        assert!(store.open_existing("p").await.unwrap().is_none());
        assert!(store.list_partition_names().await.unwrap().is_empty());

        store.open("p").await.unwrap();
        assert!(store.open_existing("p").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_delete() {
        let store = MemoryCacheStore::new();
        let handle = store.open("p").await.unwrap();
        store
            .put(&handle, &identity("/a"), Snapshot::capture(&Response::new(200)))
            .await
            .unwrap();
        store.open("p").await.unwrap();
        assert_eq!(store.total_entries().await, 1);

        assert!(store.delete("p").await.unwrap());
        assert!(!store.delete("p").await.unwrap());
        assert!(store.list_partition_names().await.unwrap().is_empty());

        let err = store
            .put(&handle, &identity("/a"), Snapshot::capture(&Response::new(200)))
            .await;
        assert!(matches!(err, Err(StoreError::PartitionGone(_))));
    }
}
