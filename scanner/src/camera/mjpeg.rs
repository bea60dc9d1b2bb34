use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use image::{ImageFormat, ImageReader, RgbaImage};
use loyalty_client_common::config::CameraConfig;
use reqwest::Url;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CameraBackend, CameraConstraints, CameraError, ReadyState, UnsupportedCause, VideoSource};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
/// Largest part the parser buffers before giving up on it.
const MAX_PART_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

impl From<StreamError> for CameraError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::HttpStatus(401 | 403) => CameraError::PermissionDenied,
            StreamError::HttpStatus(404) => CameraError::DeviceNotFound,
            StreamError::HttpConnect(ref inner) if inner.is_connect() || inner.is_timeout() => {
                CameraError::DeviceNotFound
            }
            other => CameraError::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamMode {
    /// One long-lived `multipart/x-mixed-replace` response.
    Mjpeg,
    /// Fetch a single JPEG every `interval`.
    Polling { interval: Duration },
}

/// A network camera that serves JPEG pictures over HTTP.
pub struct NetworkCamera {
    url: Url,
    mode: StreamMode,
    require_secure: bool,
    connect_timeout: Duration,
    max_reconnects: u32,
}

impl NetworkCamera {
    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        let url = Url::parse(&config.url)
            .map_err(|e| CameraError::Unknown(format!("invalid camera url {}: {e}", config.url)))?;
        let mode = match config.mode.as_str() {
            "mjpeg" => StreamMode::Mjpeg,
            "polling" => {
                let fps = if config.poll_fps > 0.0 { config.poll_fps } else { 1.0 };
                StreamMode::Polling {
                    interval: Duration::from_secs_f64(1.0 / fps),
                }
            }
            other => {
                return Err(CameraError::Unknown(format!(
                    "unknown camera mode '{other}', expected 'mjpeg' or 'polling'"
                )))
            }
        };
        Ok(Self {
            url,
            mode,
            require_secure: config.require_secure,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            max_reconnects: config.max_reconnects,
        })
    }

    fn request_url(&self, constraints: &CameraConstraints) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("facing", constraints.facing.as_str())
            .append_pair("width", &constraints.width.ideal.to_string())
            .append_pair("height", &constraints.height.ideal.to_string());
        url
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

#[async_trait]
impl CameraBackend for NetworkCamera {
    fn check_support(&self) -> Result<(), CameraError> {
        match self.url.scheme() {
            "https" => Ok(()),
            "http" => {
                let host = self.url.host_str().unwrap_or_default();
                if self.require_secure && !is_loopback(host) {
                    Err(CameraError::NotSupported(UnsupportedCause::InsecureContext))
                } else {
                    Ok(())
                }
            }
            _ => Err(CameraError::NotSupported(UnsupportedCause::MissingApi)),
        }
    }

    async fn acquire(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Box<dyn VideoSource>, CameraError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| CameraError::Unknown(e.to_string()))?;
        let url = self.request_url(constraints);
        let feed = Arc::new(Feed::new());
        let cancel = CancellationToken::new();

        let task = match self.mode {
            StreamMode::Mjpeg => {
                let response = connect(&client, url.as_str()).await?;
                info!(status = %response.status(), "connected to MJPEG stream");
                let reader = run_mjpeg_reader(
                    client,
                    url.to_string(),
                    response,
                    Arc::clone(&feed),
                    self.max_reconnects,
                );
                spawn_cancellable(reader, cancel.clone())
            }
            StreamMode::Polling { interval } => {
                let first = fetch_frame(&client, url.as_str()).await?;
                feed.publish(first);
                info!(?interval, "polling camera for frames");
                let reader = run_polling_reader(
                    client,
                    url.to_string(),
                    Arc::clone(&feed),
                    interval,
                    self.max_reconnects,
                );
                spawn_cancellable(reader, cancel.clone())
            }
        };

        Ok(Box::new(NetworkSource {
            status: feed.status.subscribe(),
            feed,
            reader: Some(task),
            cancel,
            playing: false,
        }))
    }

    fn name(&self) -> &str {
        match self.mode {
            StreamMode::Mjpeg => "mjpeg",
            StreamMode::Polling { .. } => "polling",
        }
    }
}

fn spawn_cancellable<F>(fut: F, cancel: CancellationToken) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => debug!("camera reader cancelled"),
            _ = fut => {}
        }
    })
}

// -- Shared feed --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum FeedStatus {
    Connecting,
    Streaming { width: u32, height: u32 },
    Faulted(CameraError),
}

/// Latest JPEG from the reader task plus the stream status.
struct Feed {
    latest: Mutex<Option<Bytes>>,
    status: watch::Sender<FeedStatus>,
}

impl Feed {
    fn new() -> Self {
        let (status, _) = watch::channel(FeedStatus::Connecting);
        Self {
            latest: Mutex::new(None),
            status,
        }
    }

    fn publish(&self, jpeg: Bytes) {
        if matches!(*self.status.borrow(), FeedStatus::Connecting) {
            let dimensions = ImageReader::new(Cursor::new(&jpeg[..]))
                .with_guessed_format()
                .ok()
                .and_then(|r| r.into_dimensions().ok());
            match dimensions {
                Some((width, height)) => {
                    debug!(width, height, "camera metadata available");
                    self.status.send_replace(FeedStatus::Streaming { width, height });
                }
                None => {
                    warn!(bytes = jpeg.len(), "unreadable JPEG header, skipping frame");
                    return;
                }
            }
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(jpeg);
        }
    }

    /// Drop the last picture so nothing stale is sampled while reconnecting.
    fn interrupt(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            if latest.take().is_some() {
                debug!("camera feed interrupted, discarding last frame");
            }
        }
    }

    fn fault(&self, e: CameraError) {
        error!(error = %e, "camera stream lost");
        self.status.send_replace(FeedStatus::Faulted(e));
    }
}

/// The video source handed out by [`NetworkCamera`].
pub struct NetworkSource {
    feed: Arc<Feed>,
    status: watch::Receiver<FeedStatus>,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    playing: bool,
}

#[async_trait]
impl VideoSource for NetworkSource {
    async fn loaded_metadata(&mut self) -> Result<(), CameraError> {
        let status = self
            .status
            .wait_for(|s| !matches!(s, FeedStatus::Connecting))
            .await
            .map(|s| s.clone())
            .map_err(|_| CameraError::Unknown("camera reader exited".into()))?;
        match status {
            FeedStatus::Faulted(e) => Err(e),
            _ => Ok(()),
        }
    }

    async fn play(&mut self) -> Result<(), CameraError> {
        if let Some(e) = self.fault() {
            return Err(e);
        }
        self.playing = true;
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        match *self.status.borrow() {
            FeedStatus::Connecting | FeedStatus::Faulted(_) => ReadyState::HaveNothing,
            FeedStatus::Streaming { width, height } if width == 0 || height == 0 => {
                ReadyState::HaveNothing
            }
            FeedStatus::Streaming { .. } => {
                let has_frame = self.feed.latest.lock().map(|l| l.is_some()).unwrap_or(false);
                if self.playing && has_frame {
                    ReadyState::HaveEnoughData
                } else {
                    ReadyState::HaveMetadata
                }
            }
        }
    }

    fn draw(&self) -> Option<RgbaImage> {
        if !self.playing {
            return None;
        }
        let jpeg = self.feed.latest.lock().ok()?.clone()?;
        match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                warn!(error = %e, bytes = jpeg.len(), "failed to decode camera JPEG");
                None
            }
        }
    }

    fn fault(&self) -> Option<CameraError> {
        match &*self.status.borrow() {
            FeedStatus::Faulted(e) => Some(e.clone()),
            _ => None,
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.reader.is_some())
    }

    fn stop_tracks(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.reader.take() {
            task.abort();
            self.playing = false;
            debug!("camera reader stopped");
        }
    }
}

impl Drop for NetworkSource {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

// -- Readers ------------------------------------------------------------------

async fn connect(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, StreamError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(StreamError::HttpConnect)?;
    if !response.status().is_success() {
        return Err(StreamError::HttpStatus(response.status().as_u16()));
    }
    Ok(response)
}

async fn fetch_frame(client: &reqwest::Client, url: &str) -> Result<Bytes, StreamError> {
    let response = connect(client, url).await?;
    response.bytes().await.map_err(StreamError::HttpStream)
}

/// Consume the MJPEG stream, reconnecting with exponential backoff.
/// Gives up and faults the feed after `max_reconnects` failed attempts in a row.
async fn run_mjpeg_reader(
    client: reqwest::Client,
    url: String,
    first: reqwest::Response,
    feed: Arc<Feed>,
    max_reconnects: u32,
) {
    let mut pending = Some(first);
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);
    let mut failures: u32 = 0;

    loop {
        let response = match pending.take() {
            Some(r) => Ok(r),
            None => {
                info!(url, "reconnecting to MJPEG stream");
                connect(&client, &url).await
            }
        };
        let outcome = match response {
            Ok(r) => consume_stream(r, &feed).await,
            Err(e) => Err(e),
        };
        feed.interrupt();

        match outcome {
            Ok(frames) if frames > 0 => {
                info!(frames, "stream ended cleanly, reconnecting");
                failures = 0;
                backoff = Duration::from_secs(2);
            }
            Ok(_) => {
                warn!("stream ended without a frame");
                failures += 1;
            }
            Err(e) => {
                warn!(error = %e, "stream error, reconnecting in {:?}", backoff);
                failures += 1;
            }
        }

        if failures > max_reconnects {
            feed.fault(CameraError::Unknown(format!(
                "camera stream lost after {failures} attempts"
            )));
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(response: reqwest::Response, feed: &Feed) -> Result<u64, StreamError> {
    let mut byte_stream = response.bytes_stream();
    let mut parser = MjpegParser::new();
    let mut frames = 0;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(StreamError::HttpStream)?;
        for jpeg in parser.push(&chunk) {
            frames += 1;
            feed.publish(jpeg);
        }
    }
    Ok(frames)
}

async fn run_polling_reader(
    client: reqwest::Client,
    url: String,
    feed: Arc<Feed>,
    interval: Duration,
    max_reconnects: u32,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;

    loop {
        ticker.tick().await;
        match fetch_frame(&client, &url).await {
            Ok(jpeg) => {
                failures = 0;
                feed.publish(jpeg);
            }
            Err(e) => {
                failures += 1;
                feed.interrupt();
                warn!(error = %e, failures, "failed to fetch camera frame");
                if failures > max_reconnects {
                    feed.fault(e.into());
                    return;
                }
            }
        }
    }
}

// -- Multipart parser ---------------------------------------------------------

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for `multipart/x-mixed-replace; boundary=frame` bodies.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    /// Feed one network chunk; returns every JPEG completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the tail in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    else {
                        // Skip already-scanned bytes next time
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        break;
                    };
                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let mut part = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                    part.truncate(end);
                    if !part.is_empty() {
                        out.push(part.freeze());
                    }
                    self.state = ParseState::SeekingHeaderEnd;
                }
            }
        }

        if !matches!(self.state, ParseState::SeekingBoundary) && self.buffer.len() > MAX_PART_BYTES
        {
            warn!(bytes = self.buffer.len(), "MJPEG part too large, resynchronizing");
            self.buffer.clear();
            self.jpeg_start = 0;
            self.state = ParseState::SeekingBoundary;
        }
        out
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSession;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use futures_util::stream;
    use axum::routing::get;
    use axum::Router;
    use loyalty_client_common::config::ResolutionRange;
    use loyalty_client_common::frame::Frame;

    fn part(jpeg: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(BOUNDARY);
        out.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        out.extend_from_slice(jpeg);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let frame = Frame::from_rgba(
            RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255])),
            0,
            0,
        );
        frame.encode_jpeg(80).unwrap()
    }

    fn camera_config(url: String, mode: &str) -> CameraConfig {
        CameraConfig {
            url,
            mode: mode.into(),
            facing: "environment".into(),
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
            require_secure: false,
            connect_timeout_secs: 2,
            max_reconnects: 5,
            poll_fps: 20.0,
        }
    }

    /// One-frame MJPEG endpoint at `/stream`; `hold_open` keeps the response
    /// alive after the frame instead of ending it.
    fn mjpeg_router(jpeg: Vec<u8>, hold_open: bool) -> Router {
        let mut body = part(&jpeg);
        body.extend_from_slice(BOUNDARY);
        Router::new().route(
            "/stream",
            get(move || {
                let first = stream::iter(vec![Ok::<_, std::io::Error>(body.clone())]);
                let rest: stream::BoxStream<'static, Result<Vec<u8>, std::io::Error>> = if hold_open {
                    stream::pending().boxed()
                } else {
                    stream::empty().boxed()
                };
                async move {
                    (
                        [(header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame")],
                        Body::from_stream(first.chain(rest)),
                    )
                }
            }),
        )
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn parser_splits_frames() {
        let mut parser = MjpegParser::new();
        let mut body = part(b"\xFF\xD8one\xFF\xD9");
        body.extend(part(b"\xFF\xD8two\xFF\xD9"));
        body.extend_from_slice(BOUNDARY);
        let frames = parser.push(&body);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"\xFF\xD8one\xFF\xD9");
        assert_eq!(&frames[1][..], b"\xFF\xD8two\xFF\xD9");
    }

    #[test]
    fn parser_handles_boundary_split_across_chunks() {
        let mut parser = MjpegParser::new();
        let mut body = part(b"abcdef");
        body.extend_from_slice(BOUNDARY);
        let mut frames = Vec::new();
        for chunk in body.chunks(3) {
            frames.extend(parser.push(chunk));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"abcdef");
    }

    #[test]
    fn parser_ignores_preamble() {
        let mut parser = MjpegParser::new();
        let mut body = b"garbage before the first part".to_vec();
        body.extend(part(b"jpeg"));
        body.extend_from_slice(BOUNDARY);
        assert_eq!(parser.push(&body).len(), 1);
    }

    #[test]
    fn parser_drops_oversized_part_and_resyncs() {
        let mut parser = MjpegParser::new();
        let mut head = BOUNDARY.to_vec();
        head.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        assert!(parser.push(&head).is_empty());

        let junk = vec![0xAB; 64 * 1024];
        for _ in 0..(MAX_PART_BYTES / junk.len() + 1) {
            assert!(parser.push(&junk).is_empty());
        }
        assert!(parser.buffer.len() <= BOUNDARY.len());

        let mut body = part(b"fresh");
        body.extend_from_slice(BOUNDARY);
        let frames = parser.push(&body);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"fresh");
    }

    #[test]
    fn parser_caps_missing_header_end() {
        let mut parser = MjpegParser::new();
        parser.push(BOUNDARY);
        parser.push(&vec![b'x'; MAX_PART_BYTES + 1]);
        assert!(matches!(parser.state, ParseState::SeekingBoundary));
        assert!(parser.buffer.len() <= BOUNDARY.len());
    }

    #[tokio::test]
    async fn dropped_stream_stops_serving_last_frame() {
        let base = serve(mjpeg_router(sample_jpeg(32, 24), false)).await;
        let camera = NetworkCamera::from_config(&camera_config(format!("{base}/stream"), "mjpeg"))
            .unwrap();

        let mut session = CameraSession::open(&camera, &CameraConstraints::default())
            .await
            .unwrap();
        session.wait_until_playing().await.unwrap();

        // The response ends right after its only frame; the reader is now
        // backing off before reconnecting.
        let source = session.source().unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while source.ready_state() == ReadyState::HaveEnoughData {
            assert!(tokio::time::Instant::now() < deadline, "stale frame still served");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(source.ready_state(), ReadyState::HaveMetadata);
        assert!(source.draw().is_none());
        session.close();
    }

    #[test]
    fn insecure_remote_camera_rejected() {
        let mut config = camera_config("http://192.168.1.20:8080/stream".into(), "mjpeg");
        config.require_secure = true;
        let camera = NetworkCamera::from_config(&config).unwrap();
        assert_eq!(
            camera.check_support(),
            Err(CameraError::NotSupported(UnsupportedCause::InsecureContext))
        );

        config.url = "http://127.0.0.1:8080/stream".into();
        let camera = NetworkCamera::from_config(&config).unwrap();
        assert!(camera.check_support().is_ok());
    }

    #[test]
    fn unknown_scheme_is_missing_api() {
        let camera =
            NetworkCamera::from_config(&camera_config("rtsp://cam/live".into(), "mjpeg")).unwrap();
        assert_eq!(
            camera.check_support(),
            Err(CameraError::NotSupported(UnsupportedCause::MissingApi))
        );
    }

    #[test]
    fn constraints_forwarded_as_query() {
        let camera = NetworkCamera::from_config(&camera_config(
            "http://127.0.0.1/stream?quality=80".into(),
            "mjpeg",
        ))
        .unwrap();
        let url = camera.request_url(&CameraConstraints::default());
        assert_eq!(
            url.query(),
            Some("quality=80&facing=environment&width=640&height=480")
        );
    }

    #[test]
    fn unknown_mode_rejected() {
        let result = NetworkCamera::from_config(&camera_config("http://127.0.0.1/".into(), "h265"));
        assert!(matches!(result, Err(CameraError::Unknown(_))));
    }

    #[tokio::test]
    async fn mjpeg_stream_becomes_ready_after_play() {
        let base = serve(mjpeg_router(sample_jpeg(32, 24), true)).await;
        let camera = NetworkCamera::from_config(&camera_config(format!("{base}/stream"), "mjpeg"))
            .unwrap();

        let mut session = CameraSession::open(&camera, &CameraConstraints::default())
            .await
            .unwrap();
        session.wait_until_playing().await.unwrap();

        let source = session.source().unwrap();
        assert_eq!(source.ready_state(), ReadyState::HaveEnoughData);
        let picture = source.draw().unwrap();
        assert_eq!(picture.dimensions(), (32, 24));
        assert_eq!(session.live_tracks(), 1);

        session.close();
        assert_eq!(session.live_tracks(), 0);
    }

    #[tokio::test]
    async fn polling_camera_serves_single_frames() {
        let jpeg = sample_jpeg(16, 16);
        let router = Router::new().route(
            "/frame",
            get(move || {
                let jpeg = jpeg.clone();
                async move { ([(header::CONTENT_TYPE, "image/jpeg")], jpeg) }
            }),
        );
        let base = serve(router).await;
        let camera =
            NetworkCamera::from_config(&camera_config(format!("{base}/frame"), "polling"))
                .unwrap();

        let mut session = CameraSession::open(&camera, &CameraConstraints::default())
            .await
            .unwrap();
        session.wait_until_playing().await.unwrap();
        assert_eq!(
            session.source().unwrap().draw().unwrap().dimensions(),
            (16, 16)
        );
    }

    #[tokio::test]
    async fn http_status_maps_to_camera_error() {
        let router = Router::new()
            .route("/locked", get(|| async { StatusCode::FORBIDDEN }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(router).await;

        let camera =
            NetworkCamera::from_config(&camera_config(format!("{base}/locked"), "mjpeg")).unwrap();
        let err = CameraSession::open(&camera, &CameraConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);

        let camera =
            NetworkCamera::from_config(&camera_config(format!("{base}/gone"), "polling")).unwrap();
        let err = CameraSession::open(&camera, &CameraConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err, CameraError::DeviceNotFound);
    }
}
