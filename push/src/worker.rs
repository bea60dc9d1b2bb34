use async_trait::async_trait;
use loyalty_client_common::config::NotificationConfig;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::PushError;
use crate::message::WorkerMessage;
use crate::payload::{NotificationData, NotificationPayload};

pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
}

/// The worker's view of its host environment.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Origin the worker was registered from, e.g. `https://cafe.example`.
    fn origin(&self) -> &str;

    async fn skip_waiting(&self);

    async fn claim_clients(&self) -> Result<(), PushError>;

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<(), PushError>;

    async fn close_notification(&self, tag: Option<&str>);

    /// Open windows, including ones this worker does not control yet.
    async fn window_clients(&self) -> Vec<WindowClient>;

    async fn focus(&self, client: &WindowClient) -> Result<(), PushError>;

    async fn post_message(&self, client: &WindowClient, message: &WorkerMessage)
        -> Result<(), PushError>;

    async fn open_window(&self, url: &str) -> Result<(), PushError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Install,
    Activate,
    Push {
        data: Option<Vec<u8>>,
    },
    NotificationClick {
        action: Option<String>,
        tag: Option<String>,
        data: NotificationData,
    },
    Sync {
        tag: String,
    },
    Message(Value),
}

/// Handles worker lifecycle, push and click events.
///
/// Every event is awaited to completion before `handle` returns, so the
/// host can keep the worker alive for exactly that long.
pub struct NotificationWorker<H> {
    host: H,
    config: NotificationConfig,
}

impl<H: WorkerHost> NotificationWorker<H> {
    pub fn new(host: H, config: NotificationConfig) -> Self {
        Self { host, config }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub async fn handle(&self, event: WorkerEvent) -> Result<(), PushError> {
        match event {
            WorkerEvent::Install => {
                info!("worker installing");
                self.host.skip_waiting().await;
                Ok(())
            }
            WorkerEvent::Activate => {
                info!("worker activating");
                self.host.claim_clients().await
            }
            WorkerEvent::Push { data } => {
                let payload = NotificationPayload::from_push(data.as_deref(), &self.config);
                debug!(title = %payload.title, tag = ?payload.tag, "showing notification");
                self.host.show_notification(&payload).await
            }
            WorkerEvent::NotificationClick { action, tag, data } => {
                self.host.close_notification(tag.as_deref()).await;
                match click_target(action.as_deref(), &data, &self.config.default_url) {
                    Some(url) => self.route(url, data).await,
                    None => Ok(()),
                }
            }
            WorkerEvent::Sync { tag } => {
                if tag == BACKGROUND_SYNC_TAG {
                    debug!("background sync acknowledged");
                } else {
                    debug!(tag = %tag, "ignoring sync event");
                }
                Ok(())
            }
            WorkerEvent::Message(value) => {
                if WorkerMessage::parse(&value) == WorkerMessage::SkipWaiting {
                    self.host.skip_waiting().await;
                }
                Ok(())
            }
        }
    }

    async fn route(&self, url: String, data: NotificationData) -> Result<(), PushError> {
        let origin = self.host.origin().to_string();
        let clients = self.host.window_clients().await;

        // First window already showing the app wins.
        if let Some(client) = clients.iter().find(|c| c.url.contains(origin.as_str())) {
            info!(client = %client.id, url = %url, "focusing open window");
            self.host.focus(client).await?;
            let message = WorkerMessage::NotificationClicked { url, data };
            return self.host.post_message(client, &message).await;
        }

        info!(url = %url, "opening new window");
        self.host.open_window(&url).await
    }
}

/// Navigation target for a notification click, or `None` when dismissed.
pub fn click_target(action: Option<&str>, data: &NotificationData, default_url: &str) -> Option<String> {
    if action == Some("dismiss") {
        return None;
    }
    let url = match data.kind.as_deref() {
        Some("message") => "/messages".to_string(),
        Some("campaign") => "/campaigns".to_string(),
        _ => data.url.clone().unwrap_or_else(|| default_url.to_string()),
    };
    Some(url)
}
