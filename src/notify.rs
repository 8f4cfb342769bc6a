//! Push messages and notification interaction.
//!
//! A push payload `{"title", "body", "primaryKey"}` becomes a notification with
//! the configured icon, badge, vibration pattern and actions. Clicking the
//! open action asks the host to open a window.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification display failed: {0}")]
    Display(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch.
    pub date_of_arrival: u64,
    pub primary_key: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// `showNotification(title, options)`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_notification(&self, title: &str, options: NotificationOptions) -> Result<(), NotifyError>;
}

/// Notifier that only logs; used when no display surface is attached.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show_notification(&self, title: &str, options: NotificationOptions) -> Result<(), NotifyError> {
        info!(
            title,
            body = options.body.as_deref().unwrap_or(""),
            actions = options.actions.len(),
            "Notification"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload {
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    primary_key: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Shown { title: String },
    /// No payload, or a payload that is not a notification.
    Ignored,
}

/// What the host should do after a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickOutcome {
    pub close: bool,
    pub open_url: Option<String>,
}

pub struct PushHandler {
    notifier: Arc<dyn Notifier>,
    config: NotificationConfig,
}

impl PushHandler {
    pub fn new(notifier: Arc<dyn Notifier>, config: NotificationConfig) -> Self {
        Self { notifier, config }
    }

    pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<PushOutcome, NotifyError> {
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            debug!("Push without payload ignored");
            return Ok(PushOutcome::Ignored);
        };

        let payload: PushPayload = match serde_json::from_slice(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed push payload ignored");
                return Ok(PushOutcome::Ignored);
            }
        };

        let options = self.options(payload.body, payload.primary_key);
        self.notifier
            .show_notification(&payload.title, options)
            .await?;
        Ok(PushOutcome::Shown {
            title: payload.title,
        })
    }

    pub fn on_notification_click(&self, action: Option<&str>) -> ClickOutcome {
        let open_url = (action == Some(self.config.open_action.as_str()))
            .then(|| self.config.open_url.clone());
        ClickOutcome {
            close: true,
            open_url,
        }
    }

    fn options(&self, body: Option<String>, primary_key: Option<serde_json::Value>) -> NotificationOptions {
        let date_of_arrival = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        NotificationOptions {
            body,
            icon: self.config.icon.clone(),
            badge: self.config.badge.clone(),
            vibrate: self.config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival,
                primary_key,
            },
            actions: self
                .config
                .actions
                .iter()
                .map(|a| NotificationAction {
                    action: a.action.clone(),
                    title: a.title.clone(),
                    icon: a.icon.clone(),
                })
                .collect(),
        }
    }
}
