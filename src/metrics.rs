//! Prometheus counters for the layer.

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

/// Counters owned by one layer instance.
#[derive(Clone)]
pub struct LayerMetrics {
    registry: Registry,
    responses: IntCounterVec,
    passthrough: IntCounterVec,
    replays: IntCounterVec,
}

impl LayerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let responses = IntCounterVec::new(
            Opts::new("layer_responses_total", "Intercepted responses by strategy and source"),
            &["strategy", "source"],
        )?;
        let passthrough = IntCounterVec::new(
            Opts::new("layer_passthrough_total", "Requests not intercepted, by reason"),
            &["reason"],
        )?;
        let replays = IntCounterVec::new(
            Opts::new("deferred_replays_total", "Deferred submission replays by result"),
            &["result"],
        )?;

        registry.register(Box::new(responses.clone()))?;
        registry.register(Box::new(passthrough.clone()))?;
        registry.register(Box::new(replays.clone()))?;

        Ok(Self {
            registry,
            responses,
            passthrough,
            replays,
        })
    }

    pub fn record_response(&self, strategy: &str, source: &str) {
        self.responses.with_label_values(&[strategy, source]).inc();
    }

    pub fn record_passthrough(&self, reason: &str) {
        self.passthrough.with_label_values(&[reason]).inc();
    }

    pub fn record_replay(&self, result: &str) {
        self.replays.with_label_values(&[result]).inc();
    }

    pub fn response_count(&self, strategy: &str, source: &str) -> u64 {
        self.responses.with_label_values(&[strategy, source]).get()
    }

    pub fn replay_count(&self, result: &str) -> u64 {
        self.replays.with_label_values(&[result]).get()
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
