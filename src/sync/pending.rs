//! Pending-item store for deferred submissions.
//!
//! Submissions are created by the form-handling side of the application and
//! consumed by the [`DeferredQueue`](crate::sync::queue::DeferredQueue).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use crate::net::message::{Headers, Method, RequestDescriptor};

#[derive(Error, Debug)]
pub enum PendingStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt pending file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A write request that could not be completed and awaits replay.
///
/// The body is arbitrary bytes (multipart forms included), stored as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredSubmission {
    pub id: Uuid,
    pub url: Url,
    #[serde(with = "body_base64")]
    pub body: Bytes,
    #[serde(default)]
    pub headers: Headers,
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: String = Deserialize::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

impl DeferredSubmission {
    pub fn new(url: Url, body: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            body: body.into(),
            headers,
        }
    }

    /// The replay request: a `POST` of the stored body and headers.
    pub fn to_request(&self) -> RequestDescriptor {
        let mut request = RequestDescriptor::new(Method::Post, self.url.clone())
            .with_body(self.body.clone());
        request.headers = self.headers.clone();
        request
    }
}

#[async_trait]
pub trait PendingStore: Send + Sync {
    async fn list_pending(&self) -> Result<Vec<DeferredSubmission>, PendingStoreError>;

    /// Remove an item. Removing an unknown id is not an error.
    async fn remove_pending(&self, id: Uuid) -> Result<(), PendingStoreError>;

    async fn add_pending(&self, submission: DeferredSubmission) -> Result<(), PendingStoreError>;
}

/// Pending items held in memory, in insertion order.
#[derive(Default)]
pub struct MemoryPendingStore {
    items: Mutex<Vec<DeferredSubmission>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn list_pending(&self) -> Result<Vec<DeferredSubmission>, PendingStoreError> {
        Ok(self.items.lock().await.clone())
    }

    async fn remove_pending(&self, id: Uuid) -> Result<(), PendingStoreError> {
        self.items.lock().await.retain(|item| item.id != id);
        Ok(())
    }

    async fn add_pending(&self, submission: DeferredSubmission) -> Result<(), PendingStoreError> {
        self.items.lock().await.push(submission);
        Ok(())
    }
}

/// Pending items in a JSON array file, rewritten atomically on every change.
pub struct JsonFilePendingStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFilePendingStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<Vec<DeferredSubmission>, PendingStoreError> {
        match fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(Vec::new()),
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, items: &[DeferredSubmission]) -> Result<(), PendingStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PendingStore for JsonFilePendingStore {
    async fn list_pending(&self) -> Result<Vec<DeferredSubmission>, PendingStoreError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn remove_pending(&self, id: Uuid) -> Result<(), PendingStoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.read().await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() != before {
            self.write(&items).await?;
        }
        Ok(())
    }

    async fn add_pending(&self, submission: DeferredSubmission) -> Result<(), PendingStoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.read().await?;
        items.push(submission);
        self.write(&items).await
    }
}
