use loyalty_client_common::config::PushConfig;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::PushError;
use crate::platform::Subscription;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VapidKeyResponse {
    public_key: String,
}

/// HTTP client for the backend's push endpoints.
pub struct PushApi {
    client: reqwest::Client,
    base_url: String,
    config: PushConfig,
}

impl PushApi {
    pub fn from_config(config: &PushConfig) -> Result<Self, PushError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| PushError::Platform(format!("invalid session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn worker_script_url(&self) -> String {
        self.url(&self.config.worker_script)
    }

    /// `GET` the VAPID public key (base64url).
    pub async fn vapid_key(&self) -> Result<String, PushError> {
        let url = self.url(&self.config.vapid_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PushError::VapidKey(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PushError::VapidKey(format!("HTTP status {}", response.status())));
        }
        let body: VapidKeyResponse = response
            .json()
            .await
            .map_err(|e| PushError::VapidKey(e.to_string()))?;
        debug!(url = %url, "fetched VAPID key");
        Ok(body.public_key)
    }

    /// `POST {subscription}`; any non-2xx is an error.
    pub async fn send_subscription(&self, subscription: &Subscription) -> Result<Value, PushError> {
        let url = self.url(&self.config.subscribe_path);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "subscription": subscription }))
            .send()
            .await?;
        Self::json_or_status(url, response).await
    }

    /// `POST` with no body. Returns whether the backend acknowledged it.
    pub async fn remove_subscription(&self) -> Result<bool, PushError> {
        let url = self.url(&self.config.unsubscribe_path);
        let response = self.client.post(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Ask the backend to push a test message to our own subscription.
    pub async fn send_test_notification(&self) -> Result<Value, PushError> {
        let url = self.url(&self.config.test_path);
        let response = self.client.post(&url).send().await?;
        Self::json_or_status(url, response).await
    }

    async fn json_or_status(url: String, response: reqwest::Response) -> Result<Value, PushError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status {
                endpoint: url,
                status: status.as_u16(),
            });
        }
        // Some endpoints answer 2xx with an empty body.
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
