//! Rate-limited, fire-and-forget attendance marking.
//!
//! Marking attendance must never hold up or break live detection: sends are
//! detached, their failures are logged at debug level and dropped, and the
//! cooldown advances at dispatch time whatever the outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::credentials::{CredentialStore, resolve_display_name};
use crate::error::Error;
use crate::model::{AttendanceMark, Face};
use crate::traits::AttendanceMarker;

/// How detections are turned into attendance records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttendanceMode {
    /// Kiosk: mark the recognized person by display name.
    #[default]
    Roster,
    /// Personal device: mark the signed-in account; the server resolves the name.
    SelfService,
}

impl AttendanceMode {
    /// Sampling cadence each mode ships with.
    #[must_use]
    pub fn default_frame_interval(self) -> Duration {
        match self {
            Self::Roster => Duration::from_millis(700),
            Self::SelfService => Duration::from_millis(800),
        }
    }
}

impl std::str::FromStr for AttendanceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roster" | "kiosk" => Ok(Self::Roster),
            "self" | "self-service" | "self_service" => Ok(Self::SelfService),
            other => Err(Error::Config(format!(
                "ATTENDANCE_MODE: expected 'roster' or 'self', got '{other}'"
            ))),
        }
    }
}

/// An attendance side effect ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceAction {
    Mark(AttendanceMark),
    MarkSelf { emotion: String },
}

/// Best-effort executor for attendance sends. Never reports back.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, action: AttendanceAction);
}

/// Sends each action on its own tokio task.
pub struct SpawnDispatch<M: AttendanceMarker> {
    marker: Arc<M>,
}

impl<M: AttendanceMarker> SpawnDispatch<M> {
    #[must_use]
    pub fn new(marker: Arc<M>) -> Self {
        Self { marker }
    }
}

impl<M: AttendanceMarker> Dispatch for SpawnDispatch<M> {
    fn dispatch(&self, action: AttendanceAction) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime; attendance mark dropped");
            return;
        };
        let marker = self.marker.clone();
        handle.spawn(async move {
            let result = match &action {
                AttendanceAction::Mark(mark) => marker.mark(mark).await,
                AttendanceAction::MarkSelf { emotion } => marker.mark_self(emotion).await,
            };
            if let Err(e) = result {
                tracing::debug!(error = %e, ?action, "Attendance mark failed; not retried");
            }
        });
    }
}

/// Decides when a detection turns into an attendance mark.
pub struct AttendanceRateLimiter<D: Dispatch> {
    dispatcher: D,
    credentials: Arc<dyn CredentialStore>,
    mode: AttendanceMode,
    cooldown: Duration,
    last_sent_at: Option<Instant>,
}

impl<D: Dispatch> AttendanceRateLimiter<D> {
    #[must_use]
    pub fn new(
        dispatcher: D,
        credentials: Arc<dyn CredentialStore>,
        mode: AttendanceMode,
        cooldown: Duration,
    ) -> Self {
        Self {
            dispatcher,
            credentials,
            mode,
            cooldown,
            last_sent_at: None,
        }
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    #[must_use]
    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Dispatch a mark for the first face unless still inside the cooldown.
    ///
    /// Returns whether a mark was dispatched. `last_sent_at` moves to `now`
    /// on dispatch, before the send has any outcome.
    pub fn maybe_dispatch(&mut self, faces: &[Face], now: Instant) -> bool {
        let Some(top) = faces.first() else {
            return false;
        };
        if let Some(last) = self.last_sent_at {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }

        let action = match self.mode {
            AttendanceMode::Roster => AttendanceAction::Mark(AttendanceMark {
                name: resolve_display_name(self.credentials.as_ref()),
                emotion: top.top_emotion.clone(),
            }),
            AttendanceMode::SelfService => AttendanceAction::MarkSelf {
                emotion: top.top_emotion.clone(),
            },
        };
        self.last_sent_at = Some(now);
        self.dispatcher.dispatch(action);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::credentials::MemoryCredentials;
    use crate::model::BBox;
    use crate::testing::{FakeMarker, RecordingDispatch};
    use crate::token::unsigned_token;

    fn face(emotion: &str) -> Face {
        Face {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            top_emotion: emotion.to_string(),
        }
    }

    fn limiter(
        mode: AttendanceMode,
        credentials: Arc<dyn CredentialStore>,
    ) -> (AttendanceRateLimiter<RecordingDispatch>, RecordingDispatch) {
        let dispatch = RecordingDispatch::default();
        let limiter = AttendanceRateLimiter::new(
            dispatch.clone(),
            credentials,
            mode,
            Duration::from_millis(2500),
        );
        (limiter, dispatch)
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("roster".parse::<AttendanceMode>().unwrap(), AttendanceMode::Roster);
        assert_eq!(" SELF ".parse::<AttendanceMode>().unwrap(), AttendanceMode::SelfService);
        assert!("bogus".parse::<AttendanceMode>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn first_detection_dispatches_immediately() {
        let (mut limiter, dispatch) =
            limiter(AttendanceMode::Roster, Arc::new(MemoryCredentials::new()));
        assert!(limiter.maybe_dispatch(&[face("happy")], Instant::now()));
        assert_eq!(
            dispatch.actions(),
            vec![AttendanceAction::Mark(AttendanceMark {
                name: "Camera User".into(),
                emotion: "happy".into(),
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_faces_no_dispatch_and_no_cooldown_advance() {
        let (mut limiter, dispatch) =
            limiter(AttendanceMode::Roster, Arc::new(MemoryCredentials::new()));
        assert!(!limiter.maybe_dispatch(&[], Instant::now()));
        assert!(limiter.last_sent_at().is_none());
        assert!(dispatch.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn only_first_face_is_marked() {
        let (mut limiter, dispatch) =
            limiter(AttendanceMode::Roster, Arc::new(MemoryCredentials::new()));
        limiter.maybe_dispatch(&[face("happy"), face("sad")], Instant::now());
        let actions = dispatch.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], AttendanceAction::Mark(m) if m.emotion == "happy"));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_suppresses_until_elapsed() {
        let (mut limiter, dispatch) =
            limiter(AttendanceMode::Roster, Arc::new(MemoryCredentials::new()));
        let t0 = Instant::now();
        assert!(limiter.maybe_dispatch(&[face("happy")], t0));
        assert!(!limiter.maybe_dispatch(&[face("happy")], t0 + Duration::from_millis(700)));
        assert!(!limiter.maybe_dispatch(&[face("happy")], t0 + Duration::from_millis(2499)));
        assert!(limiter.maybe_dispatch(&[face("sad")], t0 + Duration::from_millis(2500)));
        assert_eq!(dispatch.actions().len(), 2);
        assert_eq!(limiter.last_sent_at(), Some(t0 + Duration::from_millis(2500)));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_gaps_never_below_cooldown() {
        let (mut limiter, _dispatch) =
            limiter(AttendanceMode::Roster, Arc::new(MemoryCredentials::new()));
        let t0 = Instant::now();
        let mut sent = Vec::new();
        // irregular cadence, including bursts and missed ticks
        let mut offset = 0u64;
        for step in [0, 700, 700, 30, 1100, 700, 700, 5, 2600, 700, 700, 800, 0, 900] {
            offset += step;
            let now = t0 + Duration::from_millis(offset);
            if limiter.maybe_dispatch(&[face("neutral")], now) {
                sent.push(now);
            }
        }
        assert!(sent.len() >= 3);
        for pair in sent.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn name_resolved_per_dispatch() {
        let creds = Arc::new(MemoryCredentials::new().with_display_name("Front Desk"));
        let (mut limiter, dispatch) = limiter(AttendanceMode::Roster, creds.clone());
        let t0 = Instant::now();

        limiter.maybe_dispatch(&[face("happy")], t0);
        creds.set(unsigned_token(&json!({"sub": "alice"})));
        limiter.maybe_dispatch(&[face("happy")], t0 + Duration::from_secs(3));

        let names: Vec<String> = dispatch
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                AttendanceAction::Mark(m) => Some(m.name),
                AttendanceAction::MarkSelf { .. } => None,
            })
            .collect();
        assert_eq!(names, vec!["Front Desk", "alice"]);
    }

    #[tokio::test(start_paused = true)]
    async fn self_service_marks_without_name() {
        let (mut limiter, dispatch) =
            limiter(AttendanceMode::SelfService, Arc::new(MemoryCredentials::new()));
        limiter.maybe_dispatch(&[face("surprise")], Instant::now());
        assert_eq!(
            dispatch.actions(),
            vec![AttendanceAction::MarkSelf {
                emotion: "surprise".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_still_advances_cooldown() {
        let marker = Arc::new(FakeMarker::failing());
        let mut limiter = AttendanceRateLimiter::new(
            SpawnDispatch::new(marker.clone()),
            Arc::new(MemoryCredentials::new()) as Arc<dyn CredentialStore>,
            AttendanceMode::Roster,
            Duration::from_millis(2500),
        );
        let t0 = Instant::now();

        assert!(limiter.maybe_dispatch(&[face("happy")], t0));
        tokio::task::yield_now().await;
        assert_eq!(marker.calls(), 1);
        assert_eq!(limiter.last_sent_at(), Some(t0));

        // still cooling down despite the failure; no retry happens either
        assert!(!limiter.maybe_dispatch(&[face("happy")], t0 + Duration::from_millis(1000)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(marker.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_send_does_not_hold_cooldown_open() {
        let marker = Arc::new(FakeMarker::slow(Duration::from_secs(10)));
        let mut limiter = AttendanceRateLimiter::new(
            SpawnDispatch::new(marker.clone()),
            Arc::new(MemoryCredentials::new()) as Arc<dyn CredentialStore>,
            AttendanceMode::Roster,
            Duration::from_millis(2500),
        );
        let t0 = Instant::now();
        assert!(limiter.maybe_dispatch(&[face("happy")], t0));
        assert!(limiter.maybe_dispatch(&[face("happy")], t0 + Duration::from_millis(2500)));
        tokio::task::yield_now().await;
        assert_eq!(marker.calls(), 2);
    }
}
