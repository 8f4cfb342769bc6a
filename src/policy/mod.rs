//! Caching policy.
//!
//! - [`router`]: request classification and strategy selection
//! - [`strategy`]: the four strategy executors
//! - [`fallback`]: synthesized terminal responses

pub mod fallback;
pub mod router;
pub mod strategy;

pub use router::{PassThroughReason, PolicyRouter, ResourceCategory, RouteDecision, Strategy};
pub use strategy::{ResponseSource, StrategyExecutor, StrategyOutcome};
