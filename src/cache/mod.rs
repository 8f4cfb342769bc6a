//! Cache Store Manager.
//!
//! - [`snapshot`]: RequestIdentity and immutable response Snapshots
//! - [`partition`]: versioned partition names (generations)
//! - [`store`]: the `CacheStore` capability and its error type
//! - [`memory`]: in-process store
//! - [`disk`]: durable on-disk store
//! - [`compressor`]: zstd encoding of bodies at rest

pub mod compressor;
pub mod disk;
pub mod memory;
pub mod partition;
pub mod snapshot;
pub mod store;

pub use disk::DiskCacheStore;
pub use memory::MemoryCacheStore;
pub use partition::{PartitionKind, PartitionNames};
pub use snapshot::{RequestIdentity, Snapshot};
pub use store::{CacheStore, PartitionHandle, StoreError};
