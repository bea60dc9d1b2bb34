use loyalty_client_common::config::Config;
use loyalty_client_common::frame::Frame;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::camera::{CameraBackend, CameraConstraints, CameraError, CameraSession};
use crate::decode::{Decoder, ScanResult};
use crate::error::ScanError;
use crate::sampler::FrameSampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopped,
    Failed,
}

/// Receives session progress. Callbacks run on the session's timer task
/// (or on the caller of `start`/`stop`) and may call back into the session.
pub trait ScanObserver: Send + Sync {
    fn on_state(&self, _state: SessionState) {}

    /// Called at most once per `start`.
    fn on_found(&self, payload: &str, method: &str);

    fn on_error(&self, _error: &ScanError) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    State(SessionState),
    Found { payload: String, method: String },
    Error(ScanError),
}

/// Forwards every callback into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ScanEvent) {
        // The receiver going away just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ScanObserver for ChannelObserver {
    fn on_state(&self, state: SessionState) {
        self.send(ScanEvent::State(state));
    }

    fn on_found(&self, payload: &str, method: &str) {
        self.send(ScanEvent::Found {
            payload: payload.to_string(),
            method: method.to_string(),
        });
    }

    fn on_error(&self, error: &ScanError) {
        self.send(ScanEvent::Error(error.clone()));
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub interval: Duration,
    pub constraints: CameraConstraints,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300),
            constraints: CameraConstraints::default(),
        }
    }
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.scan.interval_ms),
            constraints: CameraConstraints::from_config(&config.camera),
        }
    }
}

struct Core {
    state: SessionState,
    /// Bumped on every accepted `start`, so a slow start that lost a race
    /// with `stop` + `start` cannot clobber the newer attempt.
    generation: u64,
    camera: Option<CameraSession>,
    cancel: Option<CancellationToken>,
    ticker: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Arc<dyn CameraBackend>,
    decoder: Arc<dyn Decoder>,
    observer: Arc<dyn ScanObserver>,
    sampler: FrameSampler,
    settings: ScanSettings,
    core: Mutex<Core>,
}

enum Tick {
    Capture(Frame),
    Skip,
    Exit,
}

/// Camera + sampler + decoder driven by a repeating timer.
///
/// While `Active` the session owns exactly one camera stream and one timer
/// task. Both are released together on the way to `Stopped` or `Failed`,
/// and when the last handle is dropped.
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("state", &self.state())
            .field("decoder", &self.inner.decoder.name())
            .finish()
    }
}

impl ScanSession {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn Decoder>,
        observer: Arc<dyn ScanObserver>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                decoder,
                observer,
                sampler: FrameSampler::new(),
                settings,
                core: Mutex::new(Core {
                    state: SessionState::Idle,
                    generation: 0,
                    camera: None,
                    cancel: None,
                    ticker: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Live tracks of the camera held by this session.
    pub fn live_tracks(&self) -> usize {
        self.inner
            .lock()
            .camera
            .as_ref()
            .map_or(0, CameraSession::live_tracks)
    }

    /// Acquire the camera and begin polling.
    ///
    /// A no-op while `Starting` or `Active`. `Active` is entered only after
    /// the stream has reported metadata and started playing. Camera errors
    /// move the session to `Failed` and are returned; they are not retried.
    pub async fn start(&self) -> Result<(), ScanError> {
        let generation = {
            let mut core = self.inner.lock();
            if matches!(core.state, SessionState::Starting | SessionState::Active) {
                debug!(state = ?core.state, "scan already running, ignoring start");
                return Ok(());
            }
            core.state = SessionState::Starting;
            core.generation += 1;
            core.generation
        };
        self.inner.observer.on_state(SessionState::Starting);

        let opened = async {
            let mut camera = CameraSession::open(
                self.inner.backend.as_ref(),
                &self.inner.settings.constraints,
            )
            .await?;
            camera.wait_until_playing().await?;
            Ok::<_, CameraError>(camera)
        }
        .await;

        let mut camera = match opened {
            Ok(camera) => camera,
            Err(e) => {
                let error = ScanError::from(e);
                let current = {
                    let mut core = self.inner.lock();
                    let current =
                        core.generation == generation && core.state == SessionState::Starting;
                    if current {
                        core.state = SessionState::Failed;
                    }
                    current
                };
                if !current {
                    debug!(error = %error, "camera failed after the session was stopped");
                    return Ok(());
                }
                warn!(error = %error, remediation = error.remediation(), "camera acquisition failed");
                self.inner.observer.on_state(SessionState::Failed);
                self.inner.observer.on_error(&error);
                return Err(error);
            }
        };

        {
            let mut core = self.inner.lock();
            if core.generation != generation || core.state != SessionState::Starting {
                drop(core);
                camera.close();
                debug!("session stopped while starting, camera released");
                return Ok(());
            }
            let cancel = CancellationToken::new();
            core.state = SessionState::Active;
            core.camera = Some(camera);
            core.cancel = Some(cancel.clone());
            core.ticker = Some(tokio::spawn(run_ticker(
                Arc::downgrade(&self.inner),
                generation,
                self.inner.settings.interval,
                cancel,
            )));
        }
        info!(
            decoder = self.inner.decoder.name(),
            interval_ms = self.inner.settings.interval.as_millis() as u64,
            "scan session active"
        );
        self.inner.observer.on_state(SessionState::Active);
        Ok(())
    }

    /// Cancel the timer, release the camera and move to `Stopped`.
    ///
    /// Valid in every state, idempotent, and safe to call from inside an
    /// observer callback.
    pub fn stop(&self) {
        let (camera, previous) = {
            let mut core = self.inner.lock();
            let previous = core.state;
            core.release_timer();
            core.state = SessionState::Stopped;
            (core.camera.take(), previous)
        };
        if let Some(mut camera) = camera {
            camera.close();
        }
        if previous != SessionState::Stopped {
            info!(from = ?previous, "scan session stopped");
            self.inner.observer.on_state(SessionState::Stopped);
        }
    }
}

impl Core {
    fn release_timer(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move an `Active` session of this generation to `next`, returning the
    /// camera to close. `None` if somebody else already ended it.
    fn finish(&self, generation: u64, next: SessionState) -> Option<Option<CameraSession>> {
        let mut core = self.lock();
        if core.generation != generation || core.state != SessionState::Active {
            return None;
        }
        core.state = next;
        if let Some(cancel) = core.cancel.take() {
            cancel.cancel();
        }
        // Called from the timer task itself; detach instead of aborting.
        core.ticker.take();
        Some(core.camera.take())
    }

    fn capture(&self, generation: u64) -> Tick {
        let fault = {
            let core = self.lock();
            if core.generation != generation || core.state != SessionState::Active {
                return Tick::Exit;
            }
            let Some(source) = core.camera.as_ref().and_then(|c| c.source()) else {
                return Tick::Exit;
            };
            match source.fault() {
                Some(fault) => fault,
                None => {
                    return match self.sampler.capture_frame(source) {
                        Some(frame) => Tick::Capture(frame),
                        None => Tick::Skip,
                    }
                }
            }
        };

        let error = ScanError::Fatal(fault.to_string());
        if let Some(camera) = self.finish(generation, SessionState::Failed) {
            drop(camera);
            warn!(error = %error, "camera lost, scan session failed");
            self.observer.on_state(SessionState::Failed);
            self.observer.on_error(&error);
        }
        Tick::Exit
    }

    /// Returns `false` once the session has ended.
    fn handle_result(&self, generation: u64, result: ScanResult) -> bool {
        match result {
            ScanResult::Found { payload, method } => {
                if let Some(camera) = self.finish(generation, SessionState::Stopped) {
                    drop(camera);
                    info!(method = %method, bytes = payload.len(), "code found, scan session stopped");
                    self.observer.on_state(SessionState::Stopped);
                    self.observer.on_found(&payload, &method);
                } else {
                    debug!("discarding result for a session that already ended");
                }
                false
            }
            ScanResult::NotFound => {
                trace!("no code in frame");
                true
            }
            ScanResult::Error { reason } => {
                warn!(reason = %reason, "decode failed, continuing");
                self.observer.on_error(&ScanError::Transient(reason));
                true
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(|p| p.into_inner());
        core.release_timer();
        if let Some(mut camera) = core.camera.take() {
            camera.close();
        }
    }
}

/// The session's repeating timer. Holds only a weak reference so a dropped
/// session takes its timer down with it.
async fn run_ticker(
    inner: Weak<Inner>,
    generation: u64,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // A decode still in flight swallows the ticks that fire meanwhile.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(session) = inner.upgrade() else { break };
        let frame = match session.capture(generation) {
            Tick::Capture(frame) => frame,
            Tick::Skip => continue,
            Tick::Exit => break,
        };
        let decoder = Arc::clone(&session.decoder);
        drop(session);

        let seq = frame.seq;
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = decoder.decode(frame) => result,
        };
        trace!(seq, ?result, "decode cycle");

        let Some(session) = inner.upgrade() else { break };
        if !session.handle_result(generation, result) {
            break;
        }
    }
    debug!(generation, "scan timer exited");
}
