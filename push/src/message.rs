use serde::{Deserialize, Serialize};

use crate::payload::NotificationData;

/// Messages exchanged between the foreground page and the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Foreground → worker: activate a waiting worker immediately.
    SkipWaiting,
    /// Worker → foreground: a notification was clicked while a window was open.
    NotificationClicked { url: String, data: NotificationData },
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    pub fn parse(value: &serde_json::Value) -> WorkerMessage {
        serde_json::from_value(value.clone()).unwrap_or(WorkerMessage::Unknown)
    }
}

/// Where the foreground should navigate in response to `msg`, if anywhere.
pub fn navigation_target<'a>(msg: &'a WorkerMessage, current_path: &str) -> Option<&'a str> {
    match msg {
        WorkerMessage::NotificationClicked { url, .. } if url != current_path => Some(url),
        _ => None,
    }
}
