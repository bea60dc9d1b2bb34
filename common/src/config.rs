use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// MJPEG stream URL, or the single-frame URL in polling mode.
    pub url: String,
    #[serde(default = "default_camera_mode")]
    pub mode: String,
    #[serde(default = "default_facing")]
    pub facing: String,
    #[serde(default = "default_width")]
    pub width: ResolutionRange,
    #[serde(default = "default_height")]
    pub height: ResolutionRange,
    /// Refuse plain-http cameras on non-loopback hosts.
    #[serde(default)]
    pub require_secure: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    #[serde(default = "default_poll_fps")]
    pub poll_fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResolutionRange {
    pub min: u32,
    pub ideal: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// `remote` or `local`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            strategy: default_strategy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecodeConfig {
    #[serde(default = "default_decode_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_decode_timeout")]
    pub timeout_ms: u64,
    /// Error strings from the decode endpoint that mean "nothing in view yet".
    #[serde(default = "default_not_found_markers")]
    pub not_found_markers: Vec<String>,
    #[serde(default = "default_enhance")]
    pub enhance: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_decode_endpoint(),
            jpeg_quality: default_jpeg_quality(),
            timeout_ms: default_decode_timeout(),
            not_found_markers: default_not_found_markers(),
            enhance: default_enhance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_worker_script")]
    pub worker_script: String,
    #[serde(default = "default_vapid_path")]
    pub vapid_path: String,
    #[serde(default = "default_subscribe_path")]
    pub subscribe_path: String,
    #[serde(default = "default_unsubscribe_path")]
    pub unsubscribe_path: String,
    #[serde(default = "default_test_path")]
    pub test_path: String,
    /// Sent as the `Cookie` header so the backend can tie requests to a login.
    #[serde(default)]
    pub session_cookie: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            worker_script: default_worker_script(),
            vapid_path: default_vapid_path(),
            subscribe_path: default_subscribe_path(),
            unsubscribe_path: default_unsubscribe_path(),
            test_path: default_test_path(),
            session_cookie: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_icon")]
    pub badge: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_landing_url")]
    pub default_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            icon: default_icon(),
            badge: default_icon(),
            tag: default_tag(),
            default_url: default_landing_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.decode.jpeg_quality == 0 || config.decode.jpeg_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "decode.jpeg_quality must be in 1..=100, got {}",
                config.decode.jpeg_quality
            )));
        }
        if config.scan.interval_ms == 0 {
            return Err(ConfigError::Invalid("scan.interval_ms must be non-zero".into()));
        }
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_camera_mode() -> String {
    "mjpeg".into()
}
fn default_facing() -> String {
    "environment".into()
}
fn default_width() -> ResolutionRange {
    ResolutionRange {
        min: 320,
        ideal: 640,
        max: 1280,
    }
}
fn default_height() -> ResolutionRange {
    ResolutionRange {
        min: 240,
        ideal: 480,
        max: 720,
    }
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_max_reconnects() -> u32 {
    3
}
fn default_poll_fps() -> f64 {
    5.0
}
fn default_interval_ms() -> u64 {
    300
}
fn default_strategy() -> String {
    "remote".into()
}
fn default_decode_endpoint() -> String {
    "http://localhost:5000/scan_qr_local".into()
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_decode_timeout() -> u64 {
    5000
}
fn default_not_found_markers() -> Vec<String> {
    vec!["QR kod bulunamadı".into(), "no code found".into()]
}
fn default_enhance() -> bool {
    true
}
fn default_base_url() -> String {
    "http://localhost:5000".into()
}
fn default_worker_script() -> String {
    "/static/sw.js".into()
}
fn default_vapid_path() -> String {
    "/api/vapid-key".into()
}
fn default_subscribe_path() -> String {
    "/api/subscribe-notifications".into()
}
fn default_unsubscribe_path() -> String {
    "/api/unsubscribe-notifications".into()
}
fn default_test_path() -> String {
    "/api/test-notification".into()
}
fn default_title() -> String {
    "Cafe Loyalty".into()
}
fn default_body() -> String {
    "You have a new notification!".into()
}
fn default_icon() -> String {
    "/static/icons/icon-192.png".into()
}
fn default_tag() -> String {
    "cafe-notification".into()
}
fn default_landing_url() -> String {
    "/dashboard".into()
}
fn default_log_level() -> String {
    "info".into()
}
