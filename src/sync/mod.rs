//! Deferred submissions.
//!
//! - [`pending`]: DeferredSubmission and the `PendingStore` capability
//! - [`queue`]: replay on the background-sync signal

pub mod pending;
pub mod queue;

pub use pending::{
    DeferredSubmission, JsonFilePendingStore, MemoryPendingStore, PendingStore, PendingStoreError,
};
pub use queue::{DeferredQueue, ReplayError, ReplayReport};
