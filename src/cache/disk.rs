//! Durable cache store on the local filesystem.
//!
//! Layout: one directory per partition under the store root, entries sharded
//! by the first two hex digits of the identity digest:
//!
//! ```text
//! <root>/static-cache-v1/3f/3fa9...c1.entry
//! ```
//!
//! An entry file is `[u32 BE header length][JSON header][body bytes]`. Entries
//! are written to a temporary file and renamed into place, so a reader sees
//! either the previous snapshot or the new one, never a mix.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;
use uuid::Uuid;

use crate::cache::compressor::{BodyEncoding, Compressor};
use crate::cache::snapshot::{RequestIdentity, Snapshot};
use crate::cache::store::{validate_partition_name, CacheStore, PartitionHandle, StoreError};
use crate::config::CompressionConfig;
use crate::net::message::Headers;

const ENTRY_EXT: &str = "entry";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    identity: RequestIdentity,
    status: u16,
    headers: Headers,
    encoding: BodyEncoding,
}

pub struct DiskCacheStore {
    root: PathBuf,
    compressor: Compressor,
}

impl DiskCacheStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: PathBuf, compression: CompressionConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            compressor: Compressor::new(compression),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join(partition)
    }

    fn entry_path(&self, partition: &str, identity: &RequestIdentity) -> PathBuf {
        let digest = identity.digest();
        let shard = &digest[..2];
        self.partition_dir(partition)
            .join(shard)
            .join(format!("{digest}.{ENTRY_EXT}"))
    }

    fn encode_entry(
        &self,
        identity: &RequestIdentity,
        snapshot: &Snapshot,
    ) -> Result<Vec<u8>, StoreError> {
        let (encoding, body) = self.compressor.encode(snapshot.body())?;
        let header = serde_json::to_vec(&EntryHeader {
            identity: identity.clone(),
            status: snapshot.status(),
            headers: snapshot.headers().clone(),
            encoding,
        })?;

        let header_len = u32::try_from(header.len())
            .map_err(|_| StoreError::Truncated("entry header too large".to_string()))?;
        let mut out = Vec::with_capacity(4 + header.len() + body.len());
        out.extend_from_slice(&header_len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn split_entry<'a>(path: &Path, data: &'a [u8]) -> Result<(EntryHeader, &'a [u8]), StoreError> {
        let truncated = || StoreError::Truncated(path.display().to_string());
        let len_bytes: [u8; 4] = data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(truncated)?;
        let header_len = u32::from_be_bytes(len_bytes) as usize;
        let header_bytes = data.get(4..4 + header_len).ok_or_else(truncated)?;
        let header: EntryHeader = serde_json::from_slice(header_bytes)?;
        Ok((header, &data[4 + header_len..]))
    }

    /// Read only the length prefix and header of an entry file.
    async fn read_header(path: &Path) -> Result<Option<EntryHeader>, StoreError> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let truncated = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                StoreError::Truncated(path.display().to_string())
            } else {
                StoreError::Io(e)
            }
        };

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes).await.map_err(truncated)?;
        let mut header = vec![0u8; u32::from_be_bytes(len_bytes) as usize];
        file.read_exact(&mut header).await.map_err(truncated)?;
        Ok(Some(serde_json::from_slice(&header)?))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<(EntryHeader, Vec<u8>)>, StoreError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (header, body) = Self::split_entry(path, &data)?;
        Ok(Some((header, body.to_vec())))
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, partition: &str) -> Result<PartitionHandle, StoreError> {
        validate_partition_name(partition)?;
        fs::create_dir_all(self.partition_dir(partition)).await?;
        Ok(PartitionHandle::new(partition))
    }

    async fn open_existing(&self, partition: &str) -> Result<Option<PartitionHandle>, StoreError> {
        validate_partition_name(partition)?;
        let exists = fs::try_exists(self.partition_dir(partition)).await?;
        Ok(exists.then(|| PartitionHandle::new(partition)))
    }

    async fn get(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
    ) -> Result<Option<Snapshot>, StoreError> {
        let path = self.entry_path(handle.name(), identity);
        let Some((header, body)) = self.read_entry(&path).await? else {
            return Ok(None);
        };

        // Digest collision or a foreign file: treat as absent.
        if &header.identity != identity {
            return Ok(None);
        }

        let body = self.compressor.decode(header.encoding, &body)?;
        Ok(Some(Snapshot::from_parts(
            header.status,
            header.headers,
            Bytes::from(body),
        )))
    }

    async fn put(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
        snapshot: Snapshot,
    ) -> Result<(), StoreError> {
        let dir = self.partition_dir(handle.name());
        if !fs::try_exists(&dir).await? {
            return Err(StoreError::PartitionGone(handle.name().to_string()));
        }

        let path = self.entry_path(handle.name(), identity);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = self.encode_entry(identity, &snapshot)?;
        let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, &data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(
            partition = handle.name(),
            identity = %identity,
            size = data.len(),
            "Stored snapshot"
        );
        Ok(())
    }

    async fn keys(&self, handle: &PartitionHandle) -> Result<Vec<RequestIdentity>, StoreError> {
        let dir = self.partition_dir(handle.name());
        let mut keys = Vec::new();

        let mut shards = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.metadata().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                    continue;
                }
                if let Some(header) = Self::read_header(&path).await? {
                    keys.push(header.identity);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn list_partition_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut names = BTreeSet::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.metadata().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_partition_name(name).is_ok() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn delete(&self, partition: &str) -> Result<bool, StoreError> {
        validate_partition_name(partition)?;
        let dir = self.partition_dir(partition);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(partition, "Deleted partition directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::Response;
    use tempfile::TempDir;
    use url::Url;

    fn identity(path: &str) -> RequestIdentity {
        RequestIdentity::get(&Url::parse("https://app.test/").unwrap().join(path).unwrap())
    }

    async fn store(tmp: &TempDir) -> DiskCacheStore {
        DiskCacheStore::new(tmp.path().join("cache"), CompressionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let handle = store.open("static-cache-v1").await.unwrap();

        let resp = Response::new(200)
            .with_header("content-type", "text/css")
            .with_body(vec![b'a'; 4096]);
        store
            .put(&handle, &identity("/css/main.css"), Snapshot::capture(&resp))
            .await
            .unwrap();

        let got = store
            .get(&handle, &identity("/css/main.css"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.to_response(), resp);
        assert_eq!(store.keys(&handle).await.unwrap(), vec![identity("/css/main.css")]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = store(&tmp).await;
            let handle = store.open("dynamic-cache-v1").await.unwrap();
            store
                .put(&handle, &identity("/"), Snapshot::capture(&Response::new(200).with_body("home")))
                .await
                .unwrap();
        }

        let store = store(&tmp).await;
        let handle = store.open("dynamic-cache-v1").await.unwrap();
        let got = store.get(&handle, &identity("/")).await.unwrap().unwrap();
        assert_eq!(got.body().as_ref(), b"home");
    }

    #[tokio::test]
    async fn test_list_and_delete_partitions() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        store.open("static-cache-v1").await.unwrap();
        store.open("static-cache-v0").await.unwrap();

        let names = store.list_partition_names().await.unwrap();
        assert_eq!(names.len(), 2);

        assert!(store.delete("static-cache-v0").await.unwrap());
        assert!(!store.delete("static-cache-v0").await.unwrap());
        let names = store.list_partition_names().await.unwrap();
        assert!(names.contains("static-cache-v1"));
        assert!(!names.contains("static-cache-v0"));
    }

    #[tokio::test]
    async fn test_put_after_delete_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let handle = store.open("p").await.unwrap();
        store.delete("p").await.unwrap();

        let result = store
            .put(&handle, &identity("/"), Snapshot::capture(&Response::new(200)))
            .await;
        assert!(matches!(result, Err(StoreError::PartitionGone(_))));
        assert!(store.get(&handle, &identity("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_entry_is_error() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let handle = store.open("p").await.unwrap();
        let id = identity("/broken");

        let path = store.entry_path("p", &id);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, [0u8, 0, 1]).await.unwrap();

        assert!(matches!(
            store.get(&handle, &id).await,
            Err(StoreError::Truncated(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_reads_headers_only() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let handle = store.open("p").await.unwrap();
        let id = identity("/big.bin");

        // Valid header, body that is not valid zstd.
        let header = serde_json::to_vec(&EntryHeader {
            identity: id.clone(),
            status: 200,
            headers: Vec::new(),
            encoding: BodyEncoding::Zstd,
        })
        .unwrap();
        let mut data = (header.len() as u32).to_be_bytes().to_vec();
        data.extend_from_slice(&header);
        data.extend_from_slice(&[0xffu8; 1024]);

        let path = store.entry_path("p", &id);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, data).await.unwrap();

        assert_eq!(store.keys(&handle).await.unwrap(), vec![id.clone()]);
        assert!(matches!(
            store.get(&handle, &id).await,
            Err(StoreError::Compression(_))
        ));
    }

    #[tokio::test]
    async fn test_open_existing_does_not_create() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        assert!(store.open_existing("dynamic-cache-v1").await.unwrap().is_none());
        assert!(store.list_partition_names().await.unwrap().is_empty());

        store.open("dynamic-cache-v1").await.unwrap();
        let handle = store.open_existing("dynamic-cache-v1").await.unwrap();
        assert_eq!(handle.unwrap().name(), "dynamic-cache-v1");
    }
}
