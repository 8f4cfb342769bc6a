//! The service layer: one dispatch entry point for every trigger the host
//! delivers (install, activate, fetch, sync, push, notificationclick).
//!
//! Handlers keep no state between invocations. Everything that must survive
//! lives in the injected store and pending-item store.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::partition::PartitionNames;
use crate::cache::store::{CacheStore, StoreError};
use crate::config::Config;
use crate::lifecycle::{
    ActivateError, ActivateReport, InstallError, InstallReport, LifecycleManager, LifecyclePhase,
};
use crate::metrics::LayerMetrics;
use crate::net::fetcher::{FetchError, Fetcher};
use crate::net::message::{RequestDescriptor, Response};
use crate::notify::{ClickOutcome, Notifier, NotifyError, PushHandler, PushOutcome};
use crate::policy::router::{PassThroughReason, PolicyRouter, RouteDecision};
use crate::policy::strategy::{StrategyExecutor, StrategyOutcome};
use crate::sync::pending::PendingStore;
use crate::sync::queue::{DeferredQueue, ReplayError, ReplayReport};

#[derive(Error, Debug)]
pub enum LayerError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Activate(#[from] ActivateError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Invalid offline document path {0:?}: {1}")]
    InvalidOfflineDocument(String, url::ParseError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Externally provided capabilities, created once per process.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CacheStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub pending: Arc<dyn PendingStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Trigger names, as delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Push,
    NotificationClick,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Install => "install",
            TriggerKind::Activate => "activate",
            TriggerKind::Fetch => "fetch",
            TriggerKind::Sync => "sync",
            TriggerKind::Push => "push",
            TriggerKind::NotificationClick => "notificationclick",
        }
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(TriggerKind::Install),
            "activate" => Ok(TriggerKind::Activate),
            "fetch" => Ok(TriggerKind::Fetch),
            "sync" => Ok(TriggerKind::Sync),
            "push" => Ok(TriggerKind::Push),
            "notificationclick" => Ok(TriggerKind::NotificationClick),
            other => Err(format!("unknown trigger {other:?}")),
        }
    }
}

/// An event delivered to the layer.
#[derive(Debug, Clone)]
pub enum Trigger {
    Install,
    Activate,
    Fetch(RequestDescriptor),
    Sync { tag: String },
    Push { payload: Option<Bytes> },
    NotificationClick { action: Option<String> },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Install => TriggerKind::Install,
            Trigger::Activate => TriggerKind::Activate,
            Trigger::Fetch(_) => TriggerKind::Fetch,
            Trigger::Sync { .. } => TriggerKind::Sync,
            Trigger::Push { .. } => TriggerKind::Push,
            Trigger::NotificationClick { .. } => TriggerKind::NotificationClick,
        }
    }
}

/// Result of an intercepted (or not) request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host forwards the request untouched.
    PassThrough(PassThroughReason),
    Responded(StrategyOutcome),
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    /// `None` when the sync tag is not ours.
    Synced(Option<ReplayReport>),
    Pushed(PushOutcome),
    NotificationClicked(ClickOutcome),
}

pub struct ServiceLayer {
    router: PolicyRouter,
    executor: StrategyExecutor,
    lifecycle: LifecycleManager,
    queue: DeferredQueue,
    push: PushHandler,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn CacheStore>,
    names: PartitionNames,
    metrics: LayerMetrics,
}

impl ServiceLayer {
    pub fn new(config: &Config, services: Services) -> Result<Self, LayerError> {
        let origin = config.origin.url.clone();
        let names = config.partition_names();
        let offline_document = origin
            .join(&config.cache.offline_document)
            .map_err(|e| LayerError::InvalidOfflineDocument(config.cache.offline_document.clone(), e))?;

        Ok(Self {
            router: PolicyRouter::new(&origin),
            executor: StrategyExecutor::new(
                services.store.clone(),
                services.fetcher.clone(),
                names.clone(),
                &offline_document,
            ),
            lifecycle: LifecycleManager::new(
                services.store.clone(),
                services.fetcher.clone(),
                names.clone(),
                origin,
                config.cache.manifest.clone(),
            ),
            queue: DeferredQueue::new(
                services.pending.clone(),
                services.fetcher.clone(),
                config.sync.tag.clone(),
            ),
            push: PushHandler::new(services.notifier.clone(), config.notifications.clone()),
            fetcher: services.fetcher,
            store: services.store,
            names,
            metrics: LayerMetrics::new()?,
        })
    }

    /// Route a trigger to its handler.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<TriggerOutcome, LayerError> {
        debug!(trigger = trigger.kind().as_str(), "Dispatch");
        match trigger {
            Trigger::Install => Ok(TriggerOutcome::Installed(self.install().await?)),
            Trigger::Activate => Ok(TriggerOutcome::Activated(self.activate().await?)),
            Trigger::Fetch(request) => Ok(TriggerOutcome::Fetched(self.handle_fetch(&request).await)),
            Trigger::Sync { tag } => Ok(TriggerOutcome::Synced(self.handle_sync(&tag).await?)),
            Trigger::Push { payload } => {
                Ok(TriggerOutcome::Pushed(self.push.on_push(payload.as_deref()).await?))
            }
            Trigger::NotificationClick { action } => Ok(TriggerOutcome::NotificationClicked(
                self.push.on_notification_click(action.as_deref()),
            )),
        }
    }

    pub async fn install(&self) -> Result<InstallReport, InstallError> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> Result<ActivateReport, ActivateError> {
        self.lifecycle.activate().await
    }

    /// Classify and, when intercepted, run the selected strategy.
    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> FetchOutcome {
        match self.router.route(request) {
            RouteDecision::PassThrough(reason) => {
                debug!(method = %request.method, url = %request.url, reason = reason.as_str(), "Not intercepted");
                self.metrics.record_passthrough(reason.as_str());
                FetchOutcome::PassThrough(reason)
            }
            RouteDecision::Intercept(strategy) => {
                let outcome = self.executor.execute(strategy, request).await;
                self.metrics
                    .record_response(strategy.name(), outcome.source.as_str());
                FetchOutcome::Responded(outcome)
            }
        }
    }

    /// Forward a request untouched, with no cache side effect.
    pub async fn forward(&self, request: &RequestDescriptor) -> Result<Response, FetchError> {
        self.fetcher.fetch(request).await
    }

    pub async fn handle_sync(&self, tag: &str) -> Result<Option<ReplayReport>, ReplayError> {
        let Some(result) = self.queue.on_sync(tag).await else {
            debug!(tag, "Sync tag ignored");
            return Ok(None);
        };
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Deferred replay aborted");
                return Err(e);
            }
        };
        for _ in &report.delivered {
            self.metrics.record_replay("delivered");
        }
        for _ in &report.retained {
            self.metrics.record_replay("retained");
        }
        Ok(Some(report))
    }

    /// Whether the current generation is already in the store.
    pub async fn is_installed(&self) -> Result<bool, StoreError> {
        self.lifecycle.is_installed().await
    }

    pub async fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase().await
    }

    pub fn partition_names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn metrics(&self) -> &LayerMetrics {
        &self.metrics
    }
}
