pub mod mjpeg;

use async_trait::async_trait;
use image::RgbaImage;
use loyalty_client_common::config::{CameraConfig, ResolutionRange};
use tracing::{debug, info};

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera, the one pointed at a customer's code.
    Environment,
    User,
}

impl Facing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Environment => "environment",
            Facing::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "environment" | "rear" | "back" => Some(Facing::Environment),
            "user" | "front" => Some(Facing::User),
            _ => None,
        }
    }
}

/// What the scanner asks the camera for: a preferred facing mode plus an
/// ideal/min/max resolution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: Facing,
    pub width: ResolutionRange,
    pub height: ResolutionRange,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            width: ResolutionRange {
                min: 320,
                ideal: 640,
                max: 1280,
            },
            height: ResolutionRange {
                min: 240,
                ideal: 480,
                max: 720,
            },
        }
    }
}

impl CameraConstraints {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            facing: Facing::parse(&config.facing).unwrap_or(Facing::Environment),
            width: config.width,
            height: config.height,
        }
    }
}

/// Readiness levels of a video source, numbered like the media element
/// model they mirror. Frames are only worth sampling at `HaveEnoughData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedCause {
    /// The camera can only be reached over an insecure channel.
    InsecureContext,
    /// The platform has no camera API at all.
    MissingApi,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    DeviceNotFound,
    #[error("camera not supported: {0:?}")]
    NotSupported(UnsupportedCause),
    #[error("camera error: {0}")]
    Unknown(String),
}

impl CameraError {
    /// What the user should do about it.
    pub fn remediation(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => {
                "Camera permission was denied. Allow camera access for this site, \
                 reload the page and try again."
            }
            CameraError::DeviceNotFound => {
                "No camera was found. Make sure the device has a camera and that \
                 no other application is using it."
            }
            CameraError::NotSupported(UnsupportedCause::InsecureContext) => {
                "The camera needs a secure (HTTPS) connection. Use the \"Take/Choose \
                 Photo\" option instead; it works over plain HTTP."
            }
            CameraError::NotSupported(UnsupportedCause::MissingApi) => {
                "This browser does not support camera access. Use the \"Take/Choose \
                 Photo\" option or enter the code manually."
            }
            CameraError::Unknown(_) => {
                "The camera could not be started. Try the \"Take/Choose Photo\" option, \
                 reload the page or use a different browser."
            }
        }
    }
}

/// A live video stream handed out by a [`CameraBackend`].
///
/// Event ordering: callers await [`loaded_metadata`](VideoSource::loaded_metadata)
/// first and [`play`](VideoSource::play) second. Until both have completed
/// `draw` may return a zero-sized or missing picture.
#[async_trait]
pub trait VideoSource: Send {
    /// Resolves once the stream's dimensions are known.
    async fn loaded_metadata(&mut self) -> Result<(), CameraError>;

    /// Resolves once playback has started.
    async fn play(&mut self) -> Result<(), CameraError>;

    fn ready_state(&self) -> ReadyState;

    /// Render the current picture, like drawing a video element onto a canvas.
    fn draw(&self) -> Option<RgbaImage>;

    /// Set once the stream is lost for good.
    fn fault(&self) -> Option<CameraError>;

    fn live_tracks(&self) -> usize;

    /// Stop every track. Must be idempotent.
    fn stop_tracks(&mut self);
}

/// Platform camera API.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Secure-context and API-presence checks, run before any acquisition.
    fn check_support(&self) -> Result<(), CameraError> {
        Ok(())
    }

    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn VideoSource>, CameraError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Owns one acquired camera stream until [`close`](CameraSession::close).
pub struct CameraSession {
    stream: Option<Box<dyn VideoSource>>,
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("open", &self.stream.is_some())
            .field("live_tracks", &self.live_tracks())
            .finish()
    }
}

impl CameraSession {
    pub async fn open(
        backend: &dyn CameraBackend,
        constraints: &CameraConstraints,
    ) -> Result<Self, CameraError> {
        backend.check_support()?;
        info!(
            backend = backend.name(),
            facing = constraints.facing.as_str(),
            width = constraints.width.ideal,
            height = constraints.height.ideal,
            "requesting camera stream"
        );
        let stream = backend.acquire(constraints).await?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Wait for metadata, then for playback. Frames sampled before this
    /// returns have zero dimensions.
    pub async fn wait_until_playing(&mut self) -> Result<(), CameraError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::Unknown("camera already closed".into()))?;
        stream.loaded_metadata().await?;
        debug!("camera metadata loaded");
        stream.play().await?;
        debug!("camera playback started");
        Ok(())
    }

    pub fn source(&self) -> Option<&dyn VideoSource> {
        self.stream.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.live_tracks())
    }

    /// Stop all tracks and drop the stream. No-op when already closed.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("camera stream closed");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}
