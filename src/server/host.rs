//! HTTP host loop.
//!
//! Every incoming request is delivered to the layer as a fetch trigger. The
//! other triggers are admin routes:
//! - POST /__layer/trigger/{name}
//! - POST /__layer/pending
//! - GET /__layer/health
//! - GET /__layer/metrics
//!
//! Until activation completes, or the current generation is found in the
//! store at startup, the host forwards everything untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::layer::{FetchOutcome, LayerError, ServiceLayer, Trigger, TriggerKind, TriggerOutcome};
use crate::net::message::{Destination, Headers, Method, RequestDescriptor, Response};
use crate::sync::pending::{DeferredSubmission, PendingStore};

/// Application state shared across handlers.
pub struct AppState {
    pub layer: ServiceLayer,
    pub pending: Arc<dyn PendingStore>,
    pub config: Arc<Config>,
    /// Set once activation has completed.
    pub active: AtomicBool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(layer: ServiceLayer, pending: Arc<dyn PendingStore>, config: Arc<Config>) -> Self {
        Self {
            layer,
            pending,
            config,
            active: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Recompute the active flag from the store.
    ///
    /// A host that restarts keeps intercepting as long as the current
    /// generation is stored, even when it cannot reinstall (offline).
    pub async fn restore(&self) -> bool {
        match self.layer.is_installed().await {
            Ok(true) => {
                self.active.store(true, Ordering::Release);
                info!(
                    partition = self.layer.partition_names().static_name(),
                    "Current generation found in store; intercepting"
                );
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "Could not inspect store; requests pass through");
                false
            }
        }
    }

    /// Dispatch a trigger and record activation.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<TriggerOutcome, LayerError> {
        let outcome = self.layer.dispatch(trigger).await?;
        if let TriggerOutcome::Activated(report) = &outcome {
            if report.claim_clients {
                self.active.store(true, Ordering::Release);
            }
        }
        Ok(outcome)
    }
}

/// Build the axum router with the admin routes and the intercepting fallback.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/__layer/trigger/{name}", post(trigger))
        .route("/__layer/pending", post(enqueue_pending))
        .route("/__layer/health", get(health))
        .route("/__layer/metrics", get(metrics))
        .fallback(intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationClickRequest {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingRequest {
    pub url: String,
    #[serde(default)]
    pub body: String,
    /// Binary body; takes precedence over `body`.
    #[serde(default)]
    pub body_base64: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(tag = "trigger", rename_all = "lowercase")]
pub enum TriggerResponse {
    Install {
        cached: usize,
        skip_waiting: bool,
    },
    Activate {
        deleted: Vec<String>,
        claim_clients: bool,
    },
    Sync {
        handled: bool,
        delivered: Vec<Uuid>,
        retained: Vec<Uuid>,
    },
    Push {
        shown: bool,
    },
    NotificationClick {
        close: bool,
        open_url: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub phase: String,
    pub active: bool,
    pub version: String,
    pub partitions: Vec<String>,
    pub uptime_secs: u64,
}

fn error_response(status: StatusCode, error: impl ToString) -> HttpResponse {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn trigger(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> HttpResponse {
    let kind = match name.parse::<TriggerKind>() {
        Ok(kind) => kind,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };

    let trigger = match kind {
        TriggerKind::Install => Trigger::Install,
        TriggerKind::Activate => Trigger::Activate,
        TriggerKind::Fetch => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "fetch triggers are delivered by requesting the resource itself",
            )
        }
        TriggerKind::Sync => match serde_json::from_slice::<SyncRequest>(&body) {
            Ok(req) => Trigger::Sync { tag: req.tag },
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        TriggerKind::Push => Trigger::Push {
            payload: (!body.is_empty()).then_some(body),
        },
        TriggerKind::NotificationClick => {
            let req = if body.is_empty() {
                NotificationClickRequest::default()
            } else {
                match serde_json::from_slice::<NotificationClickRequest>(&body) {
                    Ok(req) => req,
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
                }
            };
            Trigger::NotificationClick { action: req.action }
        }
    };

    let outcome = match state.dispatch(trigger).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(trigger = kind.as_str(), error = %e, "Trigger failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let response = match outcome {
        TriggerOutcome::Installed(report) => TriggerResponse::Install {
            cached: report.cached,
            skip_waiting: report.skip_waiting,
        },
        TriggerOutcome::Activated(report) => TriggerResponse::Activate {
            deleted: report.deleted,
            claim_clients: report.claim_clients,
        },
        TriggerOutcome::Synced(report) => TriggerResponse::Sync {
            handled: report.is_some(),
            delivered: report.as_ref().map(|r| r.delivered.clone()).unwrap_or_default(),
            retained: report.map(|r| r.retained).unwrap_or_default(),
        },
        TriggerOutcome::Pushed(outcome) => TriggerResponse::Push {
            shown: matches!(outcome, crate::notify::PushOutcome::Shown { .. }),
        },
        TriggerOutcome::NotificationClicked(outcome) => TriggerResponse::NotificationClick {
            close: outcome.close,
            open_url: outcome.open_url,
        },
        TriggerOutcome::Fetched(_) => {
            return error_response(StatusCode::BAD_REQUEST, "unexpected fetch outcome")
        }
    };

    Json(response).into_response()
}

async fn enqueue_pending(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PendingRequest>,
) -> HttpResponse {
    let url = match state.config.origin.url.join(&req.url) {
        Ok(url) => url,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let body = match req.body_base64 {
        Some(encoded) => match STANDARD.decode(encoded.as_bytes()) {
            Ok(body) => Bytes::from(body),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        },
        None => Bytes::from(req.body),
    };

    let submission = DeferredSubmission::new(url, body, req.headers);
    let id = submission.id;
    match state.pending.add_pending(submission).await {
        Ok(()) => {
            info!(id = %id, "Deferred submission queued");
            (StatusCode::ACCEPTED, Json(PendingResponse { id })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> HttpResponse {
    let partitions = match state.layer.store().list_partition_names().await {
        Ok(names) => names.into_iter().collect(),
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        phase: state.layer.phase().await.as_str().to_string(),
        active: state.is_active(),
        version: state.layer.partition_names().version().to_string(),
        partitions,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
    .into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> HttpResponse {
    match state.layer.metrics().render() {
        Ok(text) => (
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn intercept(State(state): State<Arc<AppState>>, request: Request) -> HttpResponse {
    let descriptor = match to_descriptor(&state.config, request).await {
        Ok(descriptor) => descriptor,
        Err(response) => return response,
    };

    if state.is_active() {
        if let FetchOutcome::Responded(outcome) = state.layer.handle_fetch(&descriptor).await {
            return into_http(outcome.response);
        }
    }

    match state.layer.forward(&descriptor).await {
        Ok(response) => into_http(response),
        Err(e) => {
            warn!(url = %descriptor.url, error = %e, "Pass-through request failed");
            error_response(StatusCode::BAD_GATEWAY, e)
        }
    }
}

// ─── Conversions ───────────────────────────────────────────────────────────

/// Absolute-form URIs (proxy requests) keep their own origin; origin-form
/// URIs are resolved against the configured origin.
fn resolve_url(origin: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        Url::parse(&uri.to_string())
    } else {
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        origin.join(path)
    }
}

fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

async fn to_descriptor(config: &Config, request: Request) -> Result<RequestDescriptor, HttpResponse> {
    let (parts, body) = request.into_parts();

    let url = resolve_url(&config.origin.url, &parts.uri)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
    let body = to_bytes(body, config.server.body_limit_bytes)
        .await
        .map_err(|e| error_response(StatusCode::PAYLOAD_TOO_LARGE, e))?;

    let headers = collect_headers(&parts.headers);
    let destination = parts
        .headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .map(Destination::parse)
        .unwrap_or_default();

    let mut descriptor = RequestDescriptor::new(Method::parse(parts.method.as_str()), url)
        .with_destination(destination)
        .with_body(body);
    descriptor.headers = headers;
    Ok(descriptor)
}

fn into_http(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    (status, headers, Body::from(response.body)).into_response()
}
