//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use url::Url;

use crate::attendance::{AttendanceAction, Dispatch};
use crate::error::Error;
use crate::media::{Camera, CameraConstraints, CameraDevice, CameraError, VideoStream};
use crate::model::{AttendanceMark, DetectionResult, LoginPayload};
use crate::sampler::{EncodedFrame, FrameSink, SampledFrame};
use crate::traits::{AttendanceMarker, Detector, FaceAuthApi};
use crate::types::{FaceSessionId, FaceToken, Identity};

// ── Camera ─────────────────────────────────────────────────────────

#[derive(Default)]
struct CameraState {
    width: AtomicU32,
    height: AtomicU32,
    opens: AtomicUsize,
    open_streams: AtomicUsize,
    stops: AtomicUsize,
    grabs: AtomicUsize,
    failure: Mutex<Option<CameraError>>,
    open_delay: Mutex<Option<Duration>>,
    last_constraints: Mutex<Option<CameraConstraints>>,
    devices: Mutex<Vec<CameraDevice>>,
    listing_fails: AtomicBool,
}

#[derive(Clone, Default)]
pub(crate) struct FakeCamera {
    state: Arc<CameraState>,
}

impl FakeCamera {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let camera = Self::default();
        camera.set_dimensions(width, height);
        camera
    }

    pub(crate) fn with_devices(self, devices: &[(&str, &str)]) -> Self {
        *self.state.devices.lock().unwrap() = devices
            .iter()
            .map(|(id, label)| CameraDevice {
                device_id: (*id).to_string(),
                label: (*label).to_string(),
            })
            .collect();
        self
    }

    pub(crate) fn fail_listing(&self) {
        self.state.listing_fails.store(true, Ordering::SeqCst);
    }

    /// Constraints passed to the most recent successful open.
    pub(crate) fn last_constraints(&self) -> Option<CameraConstraints> {
        self.state.last_constraints.lock().unwrap().clone()
    }

    pub(crate) fn set_dimensions(&self, width: u32, height: u32) {
        self.state.width.store(width, Ordering::SeqCst);
        self.state.height.store(height, Ordering::SeqCst);
    }

    pub(crate) fn fail_with(&self, error: CameraError) {
        *self.state.failure.lock().unwrap() = Some(error);
    }

    pub(crate) fn delay_open(&self, delay: Duration) {
        *self.state.open_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn open_streams(&self) -> usize {
        self.state.open_streams.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn grabs(&self) -> usize {
        self.state.grabs.load(Ordering::SeqCst)
    }
}

impl Camera for FakeCamera {
    type Stream = FakeStream;

    async fn open(&self, constraints: &CameraConstraints) -> Result<FakeStream, CameraError> {
        let delay = *self.state.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.state.failure.lock().unwrap().clone();
        if let Some(e) = failure {
            return Err(e);
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state.open_streams.fetch_add(1, Ordering::SeqCst);
        *self.state.last_constraints.lock().unwrap() = Some(constraints.clone());
        Ok(FakeStream {
            state: self.state.clone(),
            live: true,
        })
    }

    async fn devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
        if self.state.listing_fails.load(Ordering::SeqCst) {
            return Err(CameraError::Device("enumeration failed".into()));
        }
        Ok(self.state.devices.lock().unwrap().clone())
    }
}

pub(crate) struct FakeStream {
    state: Arc<CameraState>,
    live: bool,
}

impl FakeStream {
    fn release(&mut self) {
        if self.live {
            self.live = false;
            self.state.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl VideoStream for FakeStream {
    fn dimensions(&self) -> (u32, u32) {
        (
            self.state.width.load(Ordering::SeqCst),
            self.state.height.load(Ordering::SeqCst),
        )
    }

    fn grab(&mut self) -> Option<RgbaImage> {
        self.state.grabs.fetch_add(1, Ordering::SeqCst);
        let (w, h) = self.dimensions();
        Some(RgbaImage::from_pixel(w, h, Rgba([90, 90, 90, 255])))
    }

    fn stop(&mut self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        self.release();
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Sinks and dispatch ─────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct RecordingSink {
    frames: Mutex<Vec<SampledFrame>>,
}

impl RecordingSink {
    pub(crate) fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub(crate) fn sequences(&self) -> Vec<u64> {
        self.frames.lock().unwrap().iter().map(|f| f.sequence).collect()
    }
}

impl FrameSink for RecordingSink {
    fn submit(&self, frame: SampledFrame) {
        self.frames.lock().unwrap().push(frame);
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingDispatch {
    actions: Arc<Mutex<Vec<AttendanceAction>>>,
}

impl RecordingDispatch {
    pub(crate) fn actions(&self) -> Vec<AttendanceAction> {
        self.actions.lock().unwrap().clone()
    }
}

impl Dispatch for RecordingDispatch {
    fn dispatch(&self, action: AttendanceAction) {
        self.actions.lock().unwrap().push(action);
    }
}

// ── Attendance endpoint ────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct FakeMarker {
    calls: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
    received: Mutex<Vec<AttendanceAction>>,
}

impl FakeMarker {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn received(&self) -> Vec<AttendanceAction> {
        self.received.lock().unwrap().clone()
    }

    async fn record(&self, action: AttendanceAction) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(action);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::RequestFailed {
                operation: "attendance mark",
                status: 500,
                detail: "boom".into(),
            });
        }
        Ok(())
    }
}

impl AttendanceMarker for FakeMarker {
    async fn mark(&self, mark: &AttendanceMark) -> Result<(), Error> {
        self.record(AttendanceAction::Mark(mark.clone())).await
    }

    async fn mark_self(&self, emotion: &str) -> Result<(), Error> {
        self.record(AttendanceAction::MarkSelf {
            emotion: emotion.to_string(),
        })
        .await
    }
}

// ── Detector ───────────────────────────────────────────────────────

pub(crate) enum Scripted<T> {
    Ok(T, Duration),
    Unauthorized,
    Fail(u16, &'static str),
    /// Same as `Fail`, answered after a delay.
    FailAfter(Duration, u16, &'static str),
}

impl<T> Scripted<T> {
    pub(crate) async fn play(self, operation: &'static str) -> Result<T, Error> {
        match self {
            Self::Ok(value, delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(value)
            }
            Self::Unauthorized => Err(Error::Unauthorized),
            Self::Fail(status, detail) => Err(Error::RequestFailed {
                operation,
                status,
                detail: detail.to_string(),
            }),
            Self::FailAfter(delay, status, detail) => {
                tokio::time::sleep(delay).await;
                Err(Error::RequestFailed {
                    operation,
                    status,
                    detail: detail.to_string(),
                })
            }
        }
    }
}

/// Answers detections from a script, then with empty results.
#[derive(Default)]
pub(crate) struct FakeDetector {
    script: Mutex<VecDeque<Scripted<DetectionResult>>>,
    calls: AtomicUsize,
}

impl FakeDetector {
    pub(crate) fn scripted(script: Vec<Scripted<DetectionResult>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for FakeDetector {
    async fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionResult, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(step) => step.play("emotion detection").await,
            None => Ok(DetectionResult::default()),
        }
    }
}

// ── Face auth endpoints ────────────────────────────────────────────

pub(crate) struct FakeFaceApi {
    start: Mutex<Option<Scripted<FaceSessionId>>>,
    verify: Mutex<Option<Scripted<LoginPayload>>>,
    start_calls: AtomicUsize,
    verified_tokens: Mutex<Vec<FaceToken>>,
}

impl FakeFaceApi {
    pub(crate) fn new(start: Scripted<FaceSessionId>, verify: Scripted<LoginPayload>) -> Self {
        Self {
            start: Mutex::new(Some(start)),
            verify: Mutex::new(Some(verify)),
            start_calls: AtomicUsize::new(0),
            verified_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Start returns `session_id`, verify succeeds with token `"jwt"`.
    pub(crate) fn succeeding(session_id: &str) -> Self {
        Self::new(
            Scripted::Ok(FaceSessionId::from(session_id.to_string()), Duration::ZERO),
            Scripted::Ok(LoginPayload::new("jwt"), Duration::ZERO),
        )
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn verified_tokens(&self) -> Vec<FaceToken> {
        self.verified_tokens.lock().unwrap().clone()
    }
}

impl FaceAuthApi for FakeFaceApi {
    async fn start_session(&self, _identity: &Identity) -> Result<FaceSessionId, Error> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.start.lock().unwrap().take();
        match step {
            Some(step) => step.play("face session start").await,
            None => Ok(FaceSessionId::default()),
        }
    }

    async fn verify(&self, token: &FaceToken) -> Result<LoginPayload, Error> {
        self.verified_tokens.lock().unwrap().push(token.clone());
        let step = self.verify.lock().unwrap().take();
        let result = match step {
            Some(step) => step.play("face verification").await,
            None => Ok(LoginPayload::new("jwt")),
        };
        result.map_err(|e| Error::VerificationFailed(e.to_string()))
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

/// Serve `router` on an ephemeral local port and return its base URL.
pub(crate) async fn spawn_server(router: axum::Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}").parse().unwrap()
}
