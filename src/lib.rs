//! offline-cache-layer: offline-first request interception and caching.
//!
//! Sits between a web application and the network. Each outbound request is
//! classified by resource category and served by a caching strategy:
//!   documents → network first, images → cache first, styles/scripts → cache
//!   first from the static partition, everything else → network with cache
//!   fallback.
//!
//! Partitions are versioned per generation; activating a new generation
//! deletes the superseded ones. Failed write requests can be replayed later
//! through the deferred submission queue.

pub mod cache;
pub mod config;
pub mod layer;
pub mod lifecycle;
pub mod metrics;
pub mod net;
pub mod notify;
pub mod policy;
pub mod server;
pub mod sync;

pub use layer::{FetchOutcome, ServiceLayer, Services, Trigger, TriggerKind, TriggerOutcome};
