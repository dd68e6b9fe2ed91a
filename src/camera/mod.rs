mod device;

use image::DynamicImage;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::CameraError;
use crate::ocr::OverlayRenderer;
use crate::pipeline::{FrameOutcome, Pipeline};

pub use device::{CameraDevice, FfmpegCamera, FrameSource};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            RUNNING => LoopState::Running,
            STOPPING => LoopState::Stopping,
            _ => LoopState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning(LoopState),
}

impl StartOutcome {
    pub fn status_message(&self) -> &'static str {
        match self {
            StartOutcome::Started => "Camera started. Use /stop-camera to stop.",
            StartOutcome::AlreadyRunning(LoopState::Stopping) => {
                "Camera is stopping, try again shortly"
            }
            StartOutcome::AlreadyRunning(_) => "Camera already running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraStatus {
    pub state: LoopState,
    pub target_lang: Option<String>,
    pub started_at: Option<String>,
    pub frames: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Session {
    target_lang: Option<String>,
    started_at: Option<String>,
    last_error: Option<String>,
}

/// Owns the single live overlay loop.
///
/// State moves `Idle -> Running -> Stopping -> Idle`. Only `start` leaves
/// `Idle`, only the loop itself returns to it.
pub struct CameraSupervisor {
    state: AtomicU8,
    device: Arc<dyn CameraDevice>,
    pipeline: Pipeline,
    renderer: OverlayRenderer,
    preview_path: Option<PathBuf>,
    session: Mutex<Session>,
    frames: AtomicU64,
    latest_frame: RwLock<Option<Arc<Vec<u8>>>>,
}

impl CameraSupervisor {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        pipeline: Pipeline,
        renderer: OverlayRenderer,
        preview_path: Option<PathBuf>,
    ) -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            device,
            pipeline,
            renderer,
            preview_path,
            session: Mutex::new(Session::default()),
            frames: AtomicU64::new(0),
            latest_frame: RwLock::new(None),
        }
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Launches the loop on the blocking pool and returns without waiting for
    /// the device. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>, target_lang: Option<&str>) -> StartOutcome {
        if let Err(current) =
            self.state
                .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            let state = LoopState::from_u8(current);
            debug!("camera: start ignored, loop is {}", state.as_str());
            return StartOutcome::AlreadyRunning(state);
        }

        let target_lang = target_lang
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.pipeline.defaults().target_lang)
            .to_string();
        {
            let mut session = self.session();
            session.target_lang = Some(target_lang.clone());
            session.started_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
            session.last_error = None;
        }
        self.frames.store(0, Ordering::SeqCst);

        info!("camera: starting live loop (target={})", target_lang);
        let supervisor = Arc::clone(self);
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || supervisor.run_loop(&handle, &target_lang));
        StartOutcome::Started
    }

    /// Asks a running loop to stop after its current frame. Returns whether
    /// a stop was requested.
    pub fn request_stop(&self) -> bool {
        let requested = self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if requested {
            info!("camera: stop requested");
        }
        requested
    }

    /// Runs the loop in the foreground. Resolving `stop` requests a stop;
    /// returns the final status once the loop is back to `Idle`.
    pub async fn run_until<F>(self: &Arc<Self>, target_lang: Option<&str>, stop: F) -> CameraStatus
    where
        F: Future<Output = ()>,
    {
        self.start(target_lang);
        let mut stop = std::pin::pin!(stop);
        let mut stop_sent = false;
        while self.state() != LoopState::Idle {
            tokio::select! {
                _ = &mut stop, if !stop_sent => {
                    stop_sent = true;
                    self.request_stop();
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
        self.status()
    }

    pub fn status(&self) -> CameraStatus {
        let session = self.session();
        CameraStatus {
            state: self.state(),
            target_lang: session.target_lang.clone(),
            started_at: session.started_at.clone(),
            frames: self.frames.load(Ordering::SeqCst),
            last_error: session.last_error.clone(),
        }
    }

    /// PNG of the most recent overlay frame while the loop is running.
    pub fn latest_frame(&self) -> Option<Arc<Vec<u8>>> {
        self.latest_frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, err: &CameraError) {
        warn!("camera: {}", err);
        self.session().last_error = Some(err.to_string());
    }

    fn run_loop(&self, handle: &Handle, target_lang: &str) {
        let mut source = match self.device.open() {
            Ok(source) => source,
            Err(err) => {
                self.record_error(&err);
                self.state.store(IDLE, Ordering::SeqCst);
                return;
            }
        };
        info!("camera: capturing from {}", self.device.describe());

        loop {
            let frame = match source.read_frame() {
                Ok(frame) => DynamicImage::ImageRgb8(frame),
                Err(err) => {
                    self.record_error(&err);
                    self.state.store(STOPPING, Ordering::SeqCst);
                    break;
                }
            };
            let outcome = handle.block_on(self.pipeline.process_frame(&frame, target_lang));
            self.publish(&frame, &outcome);
            self.frames.fetch_add(1, Ordering::SeqCst);
            if self.state.load(Ordering::SeqCst) != RUNNING {
                break;
            }
        }

        drop(source);
        *self
            .latest_frame
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.state.store(IDLE, Ordering::SeqCst);
        info!(
            "camera: stopped after {} frames",
            self.frames.load(Ordering::SeqCst)
        );
    }

    fn publish(&self, frame: &DynamicImage, outcome: &FrameOutcome) {
        let lines = vec![
            format!("OCR: {}", outcome.text),
            format!("Translated: {}", outcome.translated),
        ];
        // boxes come back in preprocessed-image space
        let sx = frame.width() as f32 / outcome.width.max(1) as f32;
        let sy = frame.height() as f32 / outcome.height.max(1) as f32;
        let boxes = outcome
            .tokens
            .iter()
            .map(|token| token.bbox.scaled(sx, sy))
            .collect::<Vec<_>>();

        let png = match self.renderer.render_png(frame, &lines, &boxes) {
            Ok(png) => png,
            Err(err) => {
                warn!("camera: failed to render overlay: {:#}", err);
                return;
            }
        };
        if let Some(path) = self.preview_path.as_deref() {
            if let Err(err) = std::fs::write(path, &png) {
                warn!(
                    "camera: failed to write preview {}: {}",
                    path.display(),
                    err
                );
            }
        }
        *self
            .latest_frame
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(png));
    }
}
