//! Policy Router: decides whether a request is intercepted and which
//! strategy serves it.
//!
//! Classification is a pure function of request metadata, in priority order:
//! 1. non-`GET` → pass through
//! 2. cross-origin → pass through
//! 3. document → network-first
//! 4. image → cache-first (image)
//! 5. style or script → cache-first (asset)
//! 6. anything else → network-first with cache fallback

use url::{Origin, Url};

use crate::cache::partition::PartitionKind;
use crate::net::message::{Destination, RequestDescriptor};

/// Resource category derived from the declared destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Document,
    Image,
    /// Stylesheets and scripts.
    Asset,
    Other,
}

impl ResourceCategory {
    pub fn classify(destination: &Destination) -> Self {
        match destination {
            Destination::Document => ResourceCategory::Document,
            Destination::Image => ResourceCategory::Image,
            Destination::Style | Destination::Script => ResourceCategory::Asset,
            Destination::Other(_) => ResourceCategory::Other,
        }
    }
}

/// Retrieval/fallback algorithm applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Network, then dynamic cache, then offline document.
    NetworkFirst,
    /// Dynamic cache, then network, then placeholder image.
    CacheFirstImage,
    /// Static cache, then network, then 404.
    CacheFirstAsset,
    /// Network, then dynamic cache, then 404.
    NetworkFirstWithFallback,
}

impl Strategy {
    pub fn for_category(category: ResourceCategory) -> Self {
        match category {
            ResourceCategory::Document => Strategy::NetworkFirst,
            ResourceCategory::Image => Strategy::CacheFirstImage,
            ResourceCategory::Asset => Strategy::CacheFirstAsset,
            ResourceCategory::Other => Strategy::NetworkFirstWithFallback,
        }
    }

    /// Partition read first and written on network success.
    pub fn partition(&self) -> PartitionKind {
        match self {
            Strategy::CacheFirstAsset => PartitionKind::Static,
            Strategy::NetworkFirst
            | Strategy::CacheFirstImage
            | Strategy::NetworkFirstWithFallback => PartitionKind::Dynamic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirstImage => "cache-first-image",
            Strategy::CacheFirstAsset => "cache-first-asset",
            Strategy::NetworkFirstWithFallback => "network-first-with-fallback",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    UnsafeMethod,
    CrossOrigin,
}

impl PassThroughReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassThroughReason::UnsafeMethod => "unsafe-method",
            PassThroughReason::CrossOrigin => "cross-origin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    PassThrough(PassThroughReason),
    Intercept(Strategy),
}

/// Router bound to the layer's own origin.
#[derive(Debug, Clone)]
pub struct PolicyRouter {
    origin: Origin,
}

impl PolicyRouter {
    pub fn new(origin: &Url) -> Self {
        Self {
            origin: origin.origin(),
        }
    }

    pub fn route(&self, request: &RequestDescriptor) -> RouteDecision {
        if !request.method.is_retrieval_safe() {
            return RouteDecision::PassThrough(PassThroughReason::UnsafeMethod);
        }
        if request.url.origin() != self.origin {
            return RouteDecision::PassThrough(PassThroughReason::CrossOrigin);
        }
        let category = ResourceCategory::classify(&request.destination);
        RouteDecision::Intercept(Strategy::for_category(category))
    }
}
