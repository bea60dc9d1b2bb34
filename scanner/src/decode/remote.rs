use async_trait::async_trait;
use loyalty_client_common::config::DecodeConfig;
use loyalty_client_common::frame::Frame;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Decoder, DecoderSetupError, ScanResult};

const DEFAULT_METHOD: &str = "remote";

#[derive(Debug, Serialize)]
struct DecodeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts each frame as a JPEG data URL to a decode endpoint.
pub struct RemoteDecoder {
    client: reqwest::Client,
    endpoint: String,
    quality: u8,
    timeout: Duration,
    not_found_markers: Vec<String>,
}

impl RemoteDecoder {
    pub fn from_config(config: &DecodeConfig) -> Result<Self, DecoderSetupError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(DecoderSetupError::Client)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            quality: config.jpeg_quality,
            timeout: Duration::from_millis(config.timeout_ms),
            not_found_markers: config.not_found_markers.clone(),
        })
    }

    fn interpret(&self, response: DecodeResponse) -> ScanResult {
        if response.success {
            if let Some(data) = response.data.filter(|d| !d.is_empty()) {
                let method = response.method.unwrap_or_else(|| DEFAULT_METHOD.to_string());
                return ScanResult::Found {
                    payload: data,
                    method,
                };
            }
        }
        match response.error {
            Some(error) if self.is_not_found(&error) => ScanResult::NotFound,
            Some(error) => ScanResult::Error { reason: error },
            None => ScanResult::NotFound,
        }
    }

    fn is_not_found(&self, error: &str) -> bool {
        self.not_found_markers
            .iter()
            .any(|marker| error.contains(marker.as_str()))
    }
}

#[async_trait]
impl Decoder for RemoteDecoder {
    async fn decode(&self, frame: Frame) -> ScanResult {
        let seq = frame.seq;
        let image = match frame.to_data_url(self.quality) {
            Ok(url) => url,
            Err(e) => return ScanResult::error(format!("frame encoding failed: {e}")),
        };
        drop(frame);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&DecodeRequest { image: &image })
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(seq, timeout = ?self.timeout, "decode request timed out");
                return ScanResult::error(format!("decode request timed out after {:?}", self.timeout));
            }
            Err(e) => return ScanResult::error(format!("decode request failed: {e}")),
        };

        let status = response.status();
        // The endpoint reports failures in the JSON body, sometimes with a
        // non-2xx status, so the body is parsed either way.
        match response.json::<DecodeResponse>().await {
            Ok(body) => {
                let result = self.interpret(body);
                debug!(seq, %status, ?result, "remote decode");
                result
            }
            Err(e) => ScanResult::error(format!("unreadable decode response ({status}): {e}")),
        }
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use base64::Engine;
    use image::RgbaImage;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn frame() -> Frame {
        Frame::from_rgba(
            RgbaImage::from_pixel(16, 16, image::Rgba([30, 60, 90, 255])),
            1708300000000,
            1,
        )
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/scan_qr_local")
    }

    fn decoder(endpoint: String, timeout_ms: u64) -> RemoteDecoder {
        RemoteDecoder::from_config(&DecodeConfig {
            endpoint,
            timeout_ms,
            ..DecodeConfig::default()
        })
        .unwrap()
    }

    async fn respond_with(status: StatusCode, body: Value) -> RemoteDecoder {
        let router = Router::new().route(
            "/scan_qr_local",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        decoder(serve(router).await, 2000)
    }

    #[tokio::test]
    async fn found_payload_and_method() {
        let d = respond_with(
            StatusCode::OK,
            json!({"success": true, "data": "CUST-42", "method": "OpenCV QRCodeDetector"}),
        )
        .await;
        assert_eq!(
            d.decode(frame()).await,
            ScanResult::found("CUST-42", "OpenCV QRCodeDetector")
        );
    }

    #[tokio::test]
    async fn method_defaults_when_missing() {
        let d = respond_with(StatusCode::OK, json!({"success": true, "data": "XYZ"})).await;
        assert_eq!(d.decode(frame()).await, ScanResult::found("XYZ", "remote"));
    }

    #[tokio::test]
    async fn no_code_marker_is_not_found() {
        let d = respond_with(
            StatusCode::OK,
            json!({"success": false, "error": "QR kod bulunamadı"}),
        )
        .await;
        assert_eq!(d.decode(frame()).await, ScanResult::NotFound);
    }

    #[tokio::test]
    async fn other_errors_are_errors_even_with_bad_status() {
        let d = respond_with(
            StatusCode::BAD_REQUEST,
            json!({"success": false, "error": "Base64 decode failed"}),
        )
        .await;
        assert_eq!(
            d.decode(frame()).await,
            ScanResult::error("Base64 decode failed")
        );
    }

    #[tokio::test]
    async fn unparseable_body_is_an_error() {
        let router = Router::new().route(
            "/scan_qr_local",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }),
        );
        let d = decoder(serve(router).await, 2000);
        assert!(matches!(d.decode(frame()).await, ScanResult::Error { .. }));
    }

    #[tokio::test]
    async fn hung_endpoint_times_out() {
        let router = Router::new().route(
            "/scan_qr_local",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"success": true, "data": "late"}))
            }),
        );
        let d = decoder(serve(router).await, 100);
        match d.decode(frame()).await {
            ScanResult::Error { reason } => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_carries_jpeg_data_url() {
        let seen: Arc<Mutex<Option<String>>> = Arc::default();
        let seen_in_handler = Arc::clone(&seen);
        let router = Router::new().route(
            "/scan_qr_local",
            post(move |Json(body): Json<Value>| {
                let seen = Arc::clone(&seen_in_handler);
                async move {
                    *seen.lock().unwrap() = body["image"].as_str().map(str::to_string);
                    Json(json!({"success": false, "error": "QR kod bulunamadı"}))
                }
            }),
        );
        let d = decoder(serve(router).await, 2000);
        d.decode(frame()).await;

        let image = seen.lock().unwrap().clone().unwrap();
        let b64 = image.strip_prefix("data:image/jpeg;base64,").unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
