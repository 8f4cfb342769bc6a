//! HTTP host for the layer.
//!
//! - [`host`]: router, admin routes and the intercepting fallback

pub mod host;
