#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push notifications are not supported on this platform")]
    NotSupported,
    #[error("service worker not ready")]
    NotReady,
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("notification permission dismissed")]
    PermissionDismissed,
    #[error("not subscribed to notifications")]
    NotSubscribed,
    #[error("failed to fetch VAPID key: {0}")]
    VapidKey(String),
    #[error("invalid application server key: {0}")]
    InvalidKey(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP status {status}")]
    Status { endpoint: String, status: u16 },
}
