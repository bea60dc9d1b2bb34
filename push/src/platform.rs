use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::PushError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user closed the prompt without choosing.
    Default,
}

/// Permission as reported to the UI, including the unsupported case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Default,
    NotSupported,
}

impl PermissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
            PermissionStatus::Default => "default",
            PermissionStatus::NotSupported => "not-supported",
        }
    }
}

impl From<PermissionState> for PermissionStatus {
    fn from(state: PermissionState) -> Self {
        match state {
            PermissionState::Granted => PermissionStatus::Granted,
            PermissionState::Denied => PermissionStatus::Denied,
            PermissionState::Default => PermissionStatus::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A push subscription in the JSON shape the platform serializes it to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

/// Browser push primitives: worker registration, permission prompt and
/// the platform-side subscription store.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    /// Whether both background workers and push delivery are available.
    fn is_supported(&self) -> bool;

    async fn register_worker(&self, script_url: &str) -> Result<(), PushError>;

    fn permission(&self) -> PermissionState;

    async fn request_permission(&self) -> PermissionState;

    async fn get_subscription(&self) -> Result<Option<Subscription>, PushError>;

    async fn subscribe(&self, options: SubscribeOptions) -> Result<Subscription, PushError>;

    async fn unsubscribe(&self, subscription: &Subscription) -> Result<bool, PushError>;
}

/// Decode a base64url VAPID public key. Padding and the standard alphabet
/// are tolerated.
pub fn decode_application_server_key(key: &str) -> Result<Vec<u8>, PushError> {
    let normalized: String = key
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| PushError::InvalidKey(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PushError::InvalidKey("empty key".into()));
    }
    Ok(bytes)
}
