use loyalty_client_common::config::PushConfig;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::PushApi;
use crate::error::PushError;
use crate::message::{navigation_target, WorkerMessage};
use crate::platform::{
    decode_application_server_key, PermissionState, PermissionStatus, PushPlatform,
    SubscribeOptions, Subscription,
};

/// Foreground side of push: worker registration, permission and the
/// subscription mirrored between the platform and the backend.
pub struct PushSubscriptionManager {
    platform: Arc<dyn PushPlatform>,
    api: PushApi,
    registered: bool,
    vapid_key: Option<String>,
    subscription: Option<Subscription>,
}

impl PushSubscriptionManager {
    pub fn new(platform: Arc<dyn PushPlatform>, api: PushApi) -> Self {
        Self {
            platform,
            api,
            registered: false,
            vapid_key: None,
            subscription: None,
        }
    }

    pub fn from_config(
        platform: Arc<dyn PushPlatform>,
        config: &PushConfig,
    ) -> Result<Self, PushError> {
        Ok(Self::new(platform, PushApi::from_config(config)?))
    }

    /// Register the worker, fetch the VAPID key and pick up any existing
    /// subscription. Returns `false` if push cannot be used.
    pub async fn init(&mut self) -> bool {
        if !self.platform.is_supported() {
            warn!("push messaging is not supported");
            return false;
        }

        let script = self.api.worker_script_url();
        if let Err(e) = self.platform.register_worker(&script).await {
            error!(error = %e, script = %script, "worker registration failed");
            return false;
        }
        self.registered = true;
        info!(script = %script, "worker registered");

        if let Err(e) = self.vapid_key().await {
            error!(error = %e, "failed to initialize push notifications");
            return false;
        }

        match self.platform.get_subscription().await {
            Ok(existing) => self.subscription = existing,
            Err(e) => {
                error!(error = %e, "failed to read existing subscription");
                return false;
            }
        }
        true
    }

    /// Fetch the backend's VAPID public key and remember it.
    pub async fn vapid_key(&mut self) -> Result<String, PushError> {
        let key = self.api.vapid_key().await?;
        self.vapid_key = Some(key.clone());
        Ok(key)
    }

    /// Prompt for permission and subscribe once it is granted.
    pub async fn request_permission(&mut self) -> Result<Subscription, PushError> {
        if !self.platform.is_supported() {
            return Err(PushError::NotSupported);
        }
        match self.platform.request_permission().await {
            PermissionState::Granted => self.subscribe().await,
            PermissionState::Denied => Err(PushError::PermissionDenied),
            PermissionState::Default => Err(PushError::PermissionDismissed),
        }
    }

    /// Subscribe on the platform and register the subscription with the
    /// backend.
    ///
    /// If the backend rejects it the platform subscription is kept and
    /// `is_subscribed` stays true; call `unsubscribe` to roll back.
    pub async fn subscribe(&mut self) -> Result<Subscription, PushError> {
        if !self.registered {
            return Err(PushError::NotReady);
        }
        let key = self
            .vapid_key
            .as_deref()
            .ok_or_else(|| PushError::VapidKey("key not loaded".into()))?;
        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key: decode_application_server_key(key)?,
        };

        let subscription = self.platform.subscribe(options).await?;
        self.subscription = Some(subscription.clone());

        self.api.send_subscription(&subscription).await?;
        info!(endpoint = %subscription.endpoint, "subscribed to push notifications");
        Ok(subscription)
    }

    /// Drop the platform subscription and tell the backend.
    pub async fn unsubscribe(&mut self) -> Result<bool, PushError> {
        let Some(subscription) = self.subscription.as_ref() else {
            return Ok(true);
        };

        self.platform.unsubscribe(subscription).await?;
        // The platform no longer holds it, whatever the backend says.
        self.subscription = None;

        let acknowledged = self.api.remove_subscription().await?;
        if !acknowledged {
            warn!("backend did not acknowledge unsubscribe");
        }
        info!("unsubscribed from push notifications");
        Ok(true)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn permission_status(&self) -> PermissionStatus {
        if !self.platform.is_supported() {
            return PermissionStatus::NotSupported;
        }
        self.platform.permission().into()
    }

    pub async fn send_test_notification(&self) -> Result<Value, PushError> {
        if self.subscription.is_none() {
            return Err(PushError::NotSubscribed);
        }
        self.api.send_test_notification().await
    }

    /// Handle a message posted by the worker to the foreground. Returns the
    /// path to navigate to after a notification click.
    pub fn on_worker_message(&self, message: &Value, current_path: &str) -> Option<String> {
        let message = WorkerMessage::parse(message);
        let target = navigation_target(&message, current_path).map(str::to_string);
        if let Some(url) = &target {
            info!(url = %url, "notification clicked, navigating");
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SubscriptionKeys;
    use async_trait::async_trait;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakePlatform {
        supported: bool,
        permission: PermissionState,
        existing: Option<Subscription>,
        subscribed_with: Mutex<Option<SubscribeOptions>>,
        unsubscribes: AtomicUsize,
    }

    impl FakePlatform {
        fn new(permission: PermissionState) -> Self {
            Self {
                supported: true,
                permission,
                existing: None,
                subscribed_with: Mutex::new(None),
                unsubscribes: AtomicUsize::new(0),
            }
        }
    }

    fn sample_subscription() -> Subscription {
        Subscription {
            endpoint: "https://push.example/send/abc".into(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "BNcRd".into(),
                auth: "tBHI".into(),
            },
        }
    }

    #[async_trait]
    impl PushPlatform for FakePlatform {
        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn register_worker(&self, _script_url: &str) -> Result<(), PushError> {
            Ok(())
        }

        fn permission(&self) -> PermissionState {
            self.permission
        }

        async fn request_permission(&self) -> PermissionState {
            self.permission
        }

        async fn get_subscription(&self) -> Result<Option<Subscription>, PushError> {
            Ok(self.existing.clone())
        }

        async fn subscribe(&self, options: SubscribeOptions) -> Result<Subscription, PushError> {
            *self.subscribed_with.lock().unwrap() = Some(options);
            Ok(sample_subscription())
        }

        async fn unsubscribe(&self, _subscription: &Subscription) -> Result<bool, PushError> {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Backend {
        subscribe_status: Mutex<Option<StatusCode>>,
        subscribed: Mutex<Vec<serde_json::Value>>,
        unsubscribes: AtomicUsize,
        tests: AtomicUsize,
        cookies: Mutex<Vec<String>>,
    }

    // 65 bytes, base64url without padding.
    const VAPID: &str =
        "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

    async fn serve_backend(backend: Arc<Backend>) -> String {
        let app = Router::new()
            .route(
                "/api/vapid-key",
                get(|| async { Json(serde_json::json!({ "publicKey": VAPID })) }),
            )
            .route(
                "/api/subscribe-notifications",
                post(
                    |State(b): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                        if let Some(cookie) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
                            b.cookies.lock().unwrap().push(cookie.to_string());
                        }
                        b.subscribed.lock().unwrap().push(body);
                        match *b.subscribe_status.lock().unwrap() {
                            Some(status) => (status, Json(serde_json::json!({"error": "nope"}))),
                            None => (StatusCode::OK, Json(serde_json::json!({"success": true}))),
                        }
                    },
                ),
            )
            .route(
                "/api/unsubscribe-notifications",
                post(|State(b): State<Arc<Backend>>| async move {
                    b.unsubscribes.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"success": true}))
                }),
            )
            .route(
                "/api/test-notification",
                post(|State(b): State<Arc<Backend>>| async move {
                    b.tests.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"success": true}))
                }),
            )
            .with_state(backend);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn manager(
        platform: Arc<FakePlatform>,
        backend: Arc<Backend>,
        cookie: Option<&str>,
    ) -> PushSubscriptionManager {
        let config = PushConfig {
            base_url: serve_backend(backend).await,
            session_cookie: cookie.map(str::to_string),
            ..PushConfig::default()
        };
        PushSubscriptionManager::from_config(platform, &config).unwrap()
    }

    #[tokio::test]
    async fn init_then_subscribe_posts_subscription() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Granted));
        let backend = Arc::new(Backend::default());
        let mut m = manager(platform.clone(), backend.clone(), Some("session=abc")).await;

        assert!(m.init().await);
        assert!(!m.is_subscribed());

        let sub = m.request_permission().await.unwrap();
        assert_eq!(sub.endpoint, "https://push.example/send/abc");
        assert!(m.is_subscribed());

        let options = platform.subscribed_with.lock().unwrap().clone().unwrap();
        assert!(options.user_visible_only);
        assert_eq!(options.application_server_key.len(), 65);

        let posted = backend.subscribed.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["subscription"]["keys"]["auth"], "tBHI");
        assert_eq!(*backend.cookies.lock().unwrap(), vec!["session=abc".to_string()]);
    }

    #[tokio::test]
    async fn permission_outcomes_are_distinct() {
        let backend = Arc::new(Backend::default());
        let mut denied = manager(
            Arc::new(FakePlatform::new(PermissionState::Denied)),
            backend.clone(),
            None,
        )
        .await;
        assert!(matches!(
            denied.request_permission().await,
            Err(PushError::PermissionDenied)
        ));

        let mut dismissed = manager(
            Arc::new(FakePlatform::new(PermissionState::Default)),
            backend.clone(),
            None,
        )
        .await;
        assert!(matches!(
            dismissed.request_permission().await,
            Err(PushError::PermissionDismissed)
        ));

        let mut unsupported = FakePlatform::new(PermissionState::Granted);
        unsupported.supported = false;
        let mut m = manager(Arc::new(unsupported), backend, None).await;
        assert_eq!(m.permission_status(), PermissionStatus::NotSupported);
        assert!(!m.init().await);
        assert!(matches!(
            m.request_permission().await,
            Err(PushError::NotSupported)
        ));
    }

    #[tokio::test]
    async fn subscribe_requires_init() {
        let backend = Arc::new(Backend::default());
        let mut m = manager(
            Arc::new(FakePlatform::new(PermissionState::Granted)),
            backend.clone(),
            None,
        )
        .await;
        assert!(matches!(m.subscribe().await, Err(PushError::NotReady)));
        assert!(backend.subscribed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_rejection_surfaces_and_keeps_platform_subscription() {
        let backend = Arc::new(Backend::default());
        *backend.subscribe_status.lock().unwrap() = Some(StatusCode::INTERNAL_SERVER_ERROR);
        let mut m = manager(
            Arc::new(FakePlatform::new(PermissionState::Granted)),
            backend,
            None,
        )
        .await;
        assert!(m.init().await);

        match m.subscribe().await {
            Err(PushError::Status { status, endpoint }) => {
                assert_eq!(status, 500);
                assert!(endpoint.ends_with("/api/subscribe-notifications"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(m.is_subscribed());
    }

    #[tokio::test]
    async fn unsubscribe_without_subscription_skips_server() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Granted));
        let backend = Arc::new(Backend::default());
        let mut m = manager(platform.clone(), backend.clone(), None).await;

        assert!(m.unsubscribe().await.unwrap());
        assert_eq!(platform.unsubscribes.load(Ordering::SeqCst), 0);
        assert_eq!(backend.unsubscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn existing_subscription_is_loaded_and_removed() {
        let mut platform = FakePlatform::new(PermissionState::Granted);
        platform.existing = Some(sample_subscription());
        let platform = Arc::new(platform);
        let backend = Arc::new(Backend::default());
        let mut m = manager(platform.clone(), backend.clone(), None).await;

        assert!(m.init().await);
        assert!(m.is_subscribed());
        assert_eq!(m.permission_status().as_str(), "granted");

        m.send_test_notification().await.unwrap();
        assert_eq!(backend.tests.load(Ordering::SeqCst), 1);

        assert!(m.unsubscribe().await.unwrap());
        assert!(!m.is_subscribed());
        assert_eq!(platform.unsubscribes.load(Ordering::SeqCst), 1);
        assert_eq!(backend.unsubscribes.load(Ordering::SeqCst), 1);

        assert!(matches!(
            m.send_test_notification().await,
            Err(PushError::NotSubscribed)
        ));
    }

    #[tokio::test]
    async fn clicked_message_navigates_away_from_current_page() {
        let m = manager(
            Arc::new(FakePlatform::new(PermissionState::Granted)),
            Arc::new(Backend::default()),
            None,
        )
        .await;
        let msg = serde_json::json!({
            "type": "NOTIFICATION_CLICKED",
            "url": "/campaigns",
            "data": {"type": "campaign"}
        });
        assert_eq!(m.on_worker_message(&msg, "/dashboard").as_deref(), Some("/campaigns"));
        assert_eq!(m.on_worker_message(&msg, "/campaigns"), None);
        assert_eq!(m.on_worker_message(&serde_json::json!({"type": "OTHER"}), "/"), None);
    }

    #[tokio::test]
    async fn init_fails_when_vapid_key_unavailable() {
        let config = PushConfig {
            base_url: serve_backend(Arc::new(Backend::default())).await,
            vapid_path: "/api/missing".into(),
            ..PushConfig::default()
        };
        let mut m = PushSubscriptionManager::from_config(
            Arc::new(FakePlatform::new(PermissionState::Granted)),
            &config,
        )
        .unwrap();
        assert!(!m.init().await);
    }
}
