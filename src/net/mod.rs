//! Network side of the layer.
//!
//! - [`message`]: request/response descriptors
//! - [`fetcher`]: the `Fetcher` transport capability and its `reqwest` implementation

pub mod fetcher;
pub mod message;

pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use message::{Destination, Headers, Method, RequestDescriptor, Response};
