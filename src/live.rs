//! Live emotion detection: camera → sampler → detector → overlay + attendance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::attendance::{AttendanceRateLimiter, SpawnDispatch};
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::media::{Camera, MediaCapture};
use crate::model::{DetectionResult, Face, sorted_counts};
use crate::overlay::{Canvas, OverlayRenderer};
use crate::sampler::{FrameSampler, FrameSink, SampledFrame};
use crate::traits::{AttendanceMarker, Detector};

const CAMERA_PERMISSION_MESSAGE: &str = "Could not access camera. Please allow permission.";

/// What the live page shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionView {
    /// Faces from the newest applied detection.
    pub faces: Vec<Face>,
    /// Server-side running emotion tally.
    pub history: HashMap<String, u64>,
    pub error: Option<String>,
    /// Set once a 401 cleared the session. The camera is off at that point.
    pub signed_out: bool,
    /// Sequence of the frame the view reflects, 0 before the first result.
    pub last_sequence: u64,
}

impl DetectionView {
    /// Tally entries, largest count first.
    #[must_use]
    pub fn history_sorted(&self) -> Vec<(&str, u64)> {
        sorted_counts(&self.history)
    }
}

struct Pipeline<C: Camera, D, M: AttendanceMarker, K> {
    capture: Arc<MediaCapture<C>>,
    detector: D,
    renderer: OverlayRenderer,
    canvas: Mutex<K>,
    limiter: Mutex<AttendanceRateLimiter<SpawnDispatch<M>>>,
    credentials: Arc<dyn CredentialStore>,
    view: watch::Sender<DetectionView>,
}

impl<C, D, M, K> Pipeline<C, D, M, K>
where
    C: Camera,
    D: Detector,
    M: AttendanceMarker,
    K: Canvas + Send + 'static,
{
    async fn process(&self, frame: SampledFrame) {
        match self.detector.detect(&frame.encoded).await {
            Ok(result) => self.apply(&frame, result),
            Err(Error::Unauthorized) => self.sign_out(),
            Err(e) => self.fail(&frame, &e),
        }
    }

    fn fail(&self, frame: &SampledFrame, error: &Error) {
        tracing::warn!(error = %error, sequence = frame.sequence, "Detection failed");
        let shown = self.view.send_if_modified(|view| {
            if view.signed_out || frame.sequence <= view.last_sequence {
                return false;
            }
            view.last_sequence = frame.sequence;
            view.error = Some(error.to_string());
            true
        });
        if !shown {
            tracing::debug!(sequence = frame.sequence, "Discarding stale detection error");
        }
    }

    fn apply(&self, frame: &SampledFrame, result: DetectionResult) {
        // Held across the freshness check and the redraw so results land in order.
        let mut canvas = self.canvas.lock().unwrap_or_else(PoisonError::into_inner);

        let fresh = self.view.send_if_modified(|view| {
            if view.signed_out || frame.sequence <= view.last_sequence {
                return false;
            }
            view.last_sequence = frame.sequence;
            view.faces = result.faces.clone();
            view.history = result.history.clone();
            view.error = None;
            true
        });
        if !fresh {
            tracing::debug!(sequence = frame.sequence, "Discarding stale detection");
            return;
        }

        self.renderer.render(&mut *canvas, &frame.image, &result.faces);
        drop(canvas);

        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .maybe_dispatch(&result.faces, Instant::now());
    }

    fn sign_out(&self) {
        tracing::warn!("Session rejected by server; signing out");
        self.credentials.clear();
        self.capture.stop();
        self.view.send_modify(|view| {
            view.signed_out = true;
            view.faces.clear();
        });
    }
}

struct PipelineSink<C: Camera, D, M: AttendanceMarker, K>(Arc<Pipeline<C, D, M, K>>);

impl<C, D, M, K> FrameSink for PipelineSink<C, D, M, K>
where
    C: Camera,
    D: Detector,
    M: AttendanceMarker,
    K: Canvas + Send + 'static,
{
    fn submit(&self, frame: SampledFrame) {
        if self.0.view.borrow().signed_out {
            return;
        }
        let pipeline = self.0.clone();
        tokio::spawn(async move { pipeline.process(frame).await });
    }
}

/// Live detection page.
///
/// Overlapping detections are allowed; a result is applied only if its frame
/// is newer than the one the view already shows.
pub struct LiveDetection<C: Camera, D, M: AttendanceMarker, K> {
    sink: Arc<PipelineSink<C, D, M, K>>,
    sampler: FrameSampler,
}

impl<C, D, M, K> LiveDetection<C, D, M, K>
where
    C: Camera,
    D: Detector,
    M: AttendanceMarker,
    K: Canvas + Send + 'static,
{
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        camera: C,
        detector: D,
        marker: M,
        credentials: Arc<dyn CredentialStore>,
        canvas: K,
    ) -> Self {
        let limiter = AttendanceRateLimiter::new(
            SpawnDispatch::new(Arc::new(marker)),
            credentials.clone(),
            config.attendance_mode(),
            config.cooldown(),
        );
        let (view, _) = watch::channel(DetectionView::default());
        let pipeline = Pipeline {
            capture: Arc::new(MediaCapture::new(camera).with_constraints(config.camera().clone())),
            detector,
            renderer: OverlayRenderer::default(),
            canvas: Mutex::new(canvas),
            limiter: Mutex::new(limiter),
            credentials,
            view,
        };
        Self {
            sink: Arc::new(PipelineSink(Arc::new(pipeline))),
            sampler: FrameSampler::new(config.frame_interval(), config.jpeg_quality()),
        }
    }

    /// Open the camera and begin sampling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] if the camera cannot be opened; the
    /// view carries a permission hint in that case.
    pub async fn start(&mut self) -> Result<(), Error> {
        let pipeline = &self.sink.0;
        pipeline.view.send_modify(|view| {
            view.error = None;
            view.signed_out = false;
        });
        if let Err(e) = pipeline.capture.start().await {
            pipeline
                .view
                .send_modify(|view| view.error = Some(CAMERA_PERMISSION_MESSAGE.to_string()));
            return Err(e);
        }
        self.sampler
            .start_loop(pipeline.capture.clone(), self.sink.clone());
        Ok(())
    }

    /// Stop sampling and release the camera. Detections already in flight
    /// still complete.
    pub async fn stop(&mut self) {
        self.sampler.stop_loop().await;
        self.sink.0.capture.stop();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sampler.is_running() && self.sink.0.capture.is_active()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DetectionView> {
        self.sink.0.view.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> DetectionView {
        self.sink.0.view.borrow().clone()
    }

    /// Run `f` against the overlay canvas.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&K) -> R) -> R {
        let canvas = self
            .sink
            .0
            .canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&canvas)
    }
}

impl<C: Camera, D, M: AttendanceMarker, K> Drop for LiveDetection<C, D, M, K> {
    fn drop(&mut self) {
        // The sampler aborts its own task on drop; in-flight detections may
        // still hold the pipeline, so release the camera explicitly.
        self.sink.0.capture.stop();
    }
}
