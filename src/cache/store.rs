//! Cache store capability.
//!
//! A store owns named partitions, each mapping [`RequestIdentity`] to the most
//! recently stored [`Snapshot`]. All operations are async and may run
//! concurrently. `put` is last-write-wins. Failures are returned to the
//! caller; the store never retries on its own.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::compressor::CompressionError;
use crate::cache::snapshot::{RequestIdentity, Snapshot};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Body codec failed: {0}")]
    Compression(#[from] CompressionError),

    #[error("Truncated entry file: {0}")]
    Truncated(String),

    #[error("Invalid partition name: {0:?}")]
    InvalidPartitionName(String),

    #[error("Partition no longer exists: {0}")]
    PartitionGone(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Handle to an opened partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionHandle {
    name: String,
}

impl PartitionHandle {
    /// Only stores mint handles, from `open`.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a partition, creating it if it does not exist.
    async fn open(&self, partition: &str) -> Result<PartitionHandle, StoreError>;

    /// Handle to a partition only if it already exists. Never creates one.
    async fn open_existing(&self, partition: &str) -> Result<Option<PartitionHandle>, StoreError>;

    async fn get(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
    ) -> Result<Option<Snapshot>, StoreError>;

    async fn put(
        &self,
        handle: &PartitionHandle,
        identity: &RequestIdentity,
        snapshot: Snapshot,
    ) -> Result<(), StoreError>;

    /// Identities stored in a partition.
    async fn keys(&self, handle: &PartitionHandle) -> Result<Vec<RequestIdentity>, StoreError>;

    async fn list_partition_names(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Delete a partition. Returns whether it existed.
    async fn delete(&self, partition: &str) -> Result<bool, StoreError>;
}

/// Partition names end up as directory names; keep them to a safe alphabet.
pub fn validate_partition_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPartitionName(name.to_string()))
    }
}
