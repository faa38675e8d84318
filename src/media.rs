//! Camera acquisition.
//!
//! A [`MediaCapture`] exclusively owns at most one open [`VideoStream`]. The
//! stream is released on `stop()`, before every new `start()`, and on drop,
//! so no exit path leaves the camera on.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use image::RgbaImage;

use crate::error::Error;

/// Frame rates offered to the user when picking a camera.
pub const FRAME_RATE_CHOICES: [u32; 4] = [15, 24, 30, 60];

const DEFAULT_IDEAL_FPS: u32 = 24;

/// Why a camera could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device error: {0}")]
    Device(String),
}

impl CameraError {
    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Camera access was denied.",
            Self::Device(_) => "Unable to access camera.",
        }
    }
}

impl From<CameraError> for Error {
    fn from(e: CameraError) -> Self {
        Self::CameraUnavailable(e.user_message().to_string())
    }
}

/// Which device to open and how fast it should run.
///
/// `ideal_fps` is a hint; devices pick the closest rate they support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    /// `None` lets the platform pick its default camera.
    pub device_id: Option<String>,
    pub ideal_fps: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            ideal_fps: DEFAULT_IDEAL_FPS,
        }
    }
}

impl CameraConstraints {
    #[must_use]
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub fn with_ideal_fps(mut self, fps: u32) -> Self {
        self.ideal_fps = fps;
        self
    }
}

/// A video input as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub device_id: String,
    /// Empty until the user has granted camera permission once.
    pub label: String,
}

/// A video-only camera device.
pub trait Camera: Send + Sync + 'static {
    type Stream: VideoStream;

    /// Request access and open a stream.
    fn open(
        &self,
        constraints: &CameraConstraints,
    ) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;

    /// List the available video inputs.
    fn devices(&self) -> impl Future<Output = Result<Vec<CameraDevice>, CameraError>> + Send {
        async { Ok(Vec::new()) }
    }
}

/// An open camera stream.
pub trait VideoStream: Send + 'static {
    /// Current frame size. `(0, 0)` until the first frame has arrived.
    fn dimensions(&self) -> (u32, u32);

    /// Copy of the current frame.
    fn grab(&mut self) -> Option<RgbaImage>;

    /// Stop every track. Called exactly once per stream.
    fn stop(&mut self);
}

pub struct MediaCapture<C: Camera> {
    camera: C,
    constraints: Mutex<CameraConstraints>,
    devices: Mutex<Vec<CameraDevice>>,
    stream: Mutex<Option<C::Stream>>,
}

impl<C: Camera> MediaCapture<C> {
    #[must_use]
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            constraints: Mutex::new(CameraConstraints::default()),
            devices: Mutex::new(Vec::new()),
            stream: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_constraints(self, constraints: CameraConstraints) -> Self {
        *lock(&self.constraints) = constraints;
        self
    }

    /// Constraints for the next `start()`. A running stream is not affected.
    pub fn set_constraints(&self, constraints: CameraConstraints) {
        *lock(&self.constraints) = constraints;
    }

    #[must_use]
    pub fn constraints(&self) -> CameraConstraints {
        lock(&self.constraints).clone()
    }

    /// Open the camera, releasing any stream held from a previous start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] on denial or device failure.
    pub async fn start(&self) -> Result<(), Error> {
        self.stop();
        let stream = self.open().await?;
        self.install(stream);
        self.refresh_devices().await;
        Ok(())
    }

    /// Open a stream with the current constraints without taking ownership
    /// of it yet. Pair with [`install`](Self::install).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] on denial or device failure.
    pub async fn open(&self) -> Result<C::Stream, Error> {
        let constraints = self.constraints();
        self.camera.open(&constraints).await.map_err(|e| {
            tracing::warn!(error = %e, "Camera unavailable");
            Error::from(e)
        })
    }

    /// Take ownership of an opened stream, stopping any stream held before.
    pub fn install(&self, stream: C::Stream) {
        // A concurrent start may have won the race; keep only the newest stream.
        if let Some(mut previous) = self.lock().replace(stream) {
            previous.stop();
        }
        tracing::info!("Camera started");
    }

    /// Stop every track and drop the stream. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(mut stream) = self.lock().take() {
            stream.stop();
            tracing::info!("Camera stopped");
        }
    }

    /// Re-list video inputs. Labels are only filled in once access was
    /// granted, so this runs after every successful start.
    ///
    /// With no device chosen yet, the first listed one becomes the choice.
    /// Listing failures keep the previous list.
    pub async fn refresh_devices(&self) -> Vec<CameraDevice> {
        match self.camera.devices().await {
            Ok(devices) => {
                if let Some(first) = devices.first() {
                    let mut constraints = lock(&self.constraints);
                    if constraints.device_id.is_none() {
                        constraints.device_id = Some(first.device_id.clone());
                    }
                }
                lock(&self.devices).clone_from(&devices);
                devices
            }
            Err(e) => {
                tracing::debug!(error = %e, "Camera listing failed");
                self.devices()
            }
        }
    }

    /// Video inputs from the last listing.
    #[must_use]
    pub fn devices(&self) -> Vec<CameraDevice> {
        lock(&self.devices).clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Current frame size, `(0, 0)` when not running or not ready.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.lock().as_ref().map_or((0, 0), |s| s.dimensions())
    }

    /// Snapshot of the current frame, `None` when not running or not ready.
    #[must_use]
    pub fn snapshot(&self) -> Option<RgbaImage> {
        let mut guard = self.lock();
        let stream = guard.as_mut()?;
        let (w, h) = stream.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        stream.grab()
    }

    fn lock(&self) -> MutexGuard<'_, Option<C::Stream>> {
        lock(&self.stream)
    }
}

impl<C: Camera> Drop for MediaCapture<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
