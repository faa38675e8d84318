//! Face sign-in session.
//!
//! `Idle → Starting → Camera → Verifying → Idle`. Every exit (success,
//! failure, cancel, or the login future being dropped) returns to `Idle`
//! with the camera released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::media::{Camera, CameraConstraints, CameraDevice, MediaCapture, VideoStream};
use crate::model::LoginPayload;
use crate::traits::FaceAuthApi;
use crate::types::{FaceSessionId, FaceToken, Identity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Camera,
    Verifying,
}

impl Phase {
    /// Progress bar fill for this phase.
    #[must_use]
    pub fn progress_percent(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 25,
            Self::Camera => 70,
            Self::Verifying => 100,
        }
    }
}

/// Observable snapshot of the sign-in session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceAuthState {
    pub phase: Phase,
    /// Whole seconds left before capture. Only meaningful in `Camera`.
    pub countdown_seconds: u64,
    /// May be empty when the server returned none.
    pub session_id: Option<FaceSessionId>,
    pub identity: Option<Identity>,
    pub error: Option<String>,
}

impl FaceAuthState {
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.phase.progress_percent()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }
}

/// Whole seconds remaining in a countdown of `total` started at `started_at`.
///
/// Derived from elapsed time only, so late or skipped ticks cannot drift it.
#[must_use]
pub fn seconds_left(now: Instant, started_at: Instant, total: Duration) -> u64 {
    let elapsed = now.saturating_duration_since(started_at);
    total.as_secs().saturating_sub(elapsed.as_secs())
}

struct Shared<C: Camera> {
    capture: MediaCapture<C>,
    state: watch::Sender<FaceAuthState>,
    /// Bumped by every new login and every cancel. A login only touches
    /// shared state while the epoch it started with is still current.
    epoch: watch::Sender<u64>,
}

impl<C: Camera> Shared<C> {
    /// Run `f` under the epoch lock if `epoch` is still current.
    fn if_current(&self, epoch: u64, f: impl FnOnce(&Self)) -> bool {
        let mut ran = false;
        self.epoch.send_if_modified(|current| {
            if *current == epoch {
                f(self);
                ran = true;
            }
            false
        });
        ran
    }

    fn update(&self, epoch: u64, f: impl FnOnce(&mut FaceAuthState)) -> bool {
        self.if_current(epoch, |shared| shared.state.send_modify(f))
    }

    /// Claim the session for a new login, superseding any running one.
    fn begin(&self, identity: &Identity) -> u64 {
        let mut epoch = 0;
        self.epoch.send_modify(|current| {
            *current += 1;
            epoch = *current;
            self.capture.stop();
            self.state.send_replace(FaceAuthState {
                phase: Phase::Starting,
                identity: Some(identity.clone()),
                ..FaceAuthState::default()
            });
        });
        epoch
    }

    async fn superseded(&self, epoch: u64) {
        let mut rx = self.epoch.subscribe();
        // The sender lives as long as `self`, so this only ends on a change.
        let _ = rx.wait_for(|current| *current != epoch).await;
    }
}

trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<C: Camera> Cancel for Shared<C> {
    fn cancel(&self) -> bool {
        let cancelled = self.epoch.send_if_modified(|current| {
            if self.state.borrow().phase == Phase::Idle {
                return false;
            }
            *current += 1;
            self.capture.stop();
            self.state.send_modify(|s| {
                s.phase = Phase::Idle;
                s.countdown_seconds = 0;
                s.session_id = None;
                s.error = None;
            });
            true
        });
        if cancelled {
            tracing::info!("Face sign-in cancelled");
        }
        cancelled
    }
}

/// Cancels the running sign-in from anywhere (a UI callback, another task).
#[derive(Clone)]
pub struct CancelHandle {
    target: Arc<dyn Cancel>,
}

impl CancelHandle {
    /// Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        self.target.cancel()
    }
}

/// Releases the camera if the login future ends without reaching a verdict.
struct ExitGuard<'a, C: Camera> {
    shared: &'a Shared<C>,
    epoch: u64,
}

impl<C: Camera> Drop for ExitGuard<'_, C> {
    fn drop(&mut self) {
        self.shared.if_current(self.epoch, |shared| {
            shared.capture.stop();
            shared.state.send_if_modified(|s| {
                if s.phase == Phase::Idle {
                    return false;
                }
                s.phase = Phase::Idle;
                s.countdown_seconds = 0;
                true
            });
        });
    }
}

pub struct FaceAuthMachine<C: Camera, A> {
    shared: Arc<Shared<C>>,
    api: A,
    countdown: Duration,
    tick: Duration,
}

impl<C: Camera, A: FaceAuthApi> FaceAuthMachine<C, A> {
    #[must_use]
    pub fn new(config: &ClientConfig, camera: C, api: A) -> Self {
        let (state, _) = watch::channel(FaceAuthState::default());
        let (epoch, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                capture: MediaCapture::new(camera).with_constraints(config.camera().clone()),
                state,
                epoch,
            }),
            api,
            countdown: config.countdown(),
            tick: config.countdown_tick(),
        }
    }

    /// Run one face sign-in for `identity`.
    ///
    /// Starting a login while another is in progress cancels the earlier one.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyIdentity`] for a blank identity; nothing is sent.
    /// - [`Error::RequestFailed`] if the session could not be started.
    /// - [`Error::CameraUnavailable`] if the camera could not be opened.
    /// - [`Error::VerificationFailed`] if the server rejected the capture.
    /// - [`Error::Cancelled`] if [`cancel`](Self::cancel) ran first.
    pub async fn login(&self, identity: &str) -> Result<LoginPayload, Error> {
        let identity: Identity = match identity.parse() {
            Ok(identity) => identity,
            Err(e) => {
                self.shared.state.send_if_modified(|s| {
                    if s.is_busy() {
                        return false;
                    }
                    s.error = Some(e.to_string());
                    true
                });
                return Err(e);
            }
        };

        let shared = self.shared.as_ref();
        let epoch = shared.begin(&identity);
        let _guard = ExitGuard { shared, epoch };

        let result = tokio::select! {
            biased;
            () = shared.superseded(epoch) => Err(Error::Cancelled),
            result = self.run(&identity, epoch) => result,
        };

        match &result {
            Ok(_) => {
                shared.update(epoch, |s| {
                    s.phase = Phase::Idle;
                    s.countdown_seconds = 0;
                    s.error = None;
                });
                tracing::info!("Face sign-in succeeded");
            }
            Err(Error::Cancelled) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Face sign-in failed");
                shared.update(epoch, |s| {
                    s.phase = Phase::Idle;
                    s.countdown_seconds = 0;
                    s.session_id = None;
                    s.error = Some(e.to_string());
                });
            }
        }
        result
    }

    async fn run(&self, identity: &Identity, epoch: u64) -> Result<LoginPayload, Error> {
        let shared = self.shared.as_ref();

        let session_id = self.api.start_session(identity).await?;
        if session_id.is_empty() {
            tracing::warn!("Face session started without an id; continuing");
        } else {
            tracing::debug!(%session_id, "Face session started");
        }
        shared.update(epoch, |s| s.session_id = Some(session_id.clone()));

        // A cancel can land while the camera is opening. The stream is only
        // handed to the capture while this login still owns the session.
        let mut pending = Some(shared.capture.open().await?);
        shared.if_current(epoch, |shared| {
            if let Some(stream) = pending.take() {
                shared.capture.install(stream);
            }
        });
        if let Some(mut stale) = pending {
            stale.stop();
            return Err(Error::Cancelled);
        }
        shared.capture.refresh_devices().await;

        let started_at = Instant::now();
        shared.update(epoch, |s| {
            s.phase = Phase::Camera;
            s.countdown_seconds = self.countdown.as_secs();
        });

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let left = seconds_left(Instant::now(), started_at, self.countdown);
            shared.update(epoch, |s| s.countdown_seconds = left);
            if left == 0 {
                break;
            }
        }

        shared.update(epoch, |s| s.phase = Phase::Verifying);
        self.api.verify(&FaceToken::for_session(&session_id)).await
    }

    /// Abort the running sign-in. No-op when idle.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            target: self.shared.clone(),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FaceAuthState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> FaceAuthState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn camera_active(&self) -> bool {
        self.shared.capture.is_active()
    }

    /// Camera choice for the next login.
    pub fn set_camera_constraints(&self, constraints: CameraConstraints) {
        self.shared.capture.set_constraints(constraints);
    }

    #[must_use]
    pub fn camera_constraints(&self) -> CameraConstraints {
        self.shared.capture.constraints()
    }

    /// Video inputs seen at the last camera start.
    #[must_use]
    pub fn devices(&self) -> Vec<CameraDevice> {
        self.shared.capture.devices()
    }
}
