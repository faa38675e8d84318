use std::future::Future;

use crate::error::Error;
use crate::model::{AttendanceMark, DetectionResult, LoginPayload};
use crate::sampler::EncodedFrame;
use crate::types::{FaceSessionId, FaceToken, Identity};

/// Remote emotion detection.
///
/// Implemented by [`ApiClient`](crate::ApiClient); tests and offline tools can
/// substitute their own.
pub trait Detector: Send + Sync + 'static {
    /// Submit one encoded frame.
    ///
    /// Must fail with [`Error::Unauthorized`] on a 401 so callers can sign out
    /// without inspecting messages.
    fn detect(
        &self,
        frame: &EncodedFrame,
    ) -> impl Future<Output = Result<DetectionResult, Error>> + Send;
}

/// Attendance recording endpoints.
pub trait AttendanceMarker: Send + Sync + 'static {
    /// Record attendance for a named person.
    fn mark(&self, mark: &AttendanceMark) -> impl Future<Output = Result<(), Error>> + Send;

    /// Record attendance for the signed-in account.
    fn mark_self(&self, emotion: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Face sign-in endpoints.
pub trait FaceAuthApi: Send + Sync + 'static {
    /// Open a face-authentication session for `identity`.
    ///
    /// An empty session id is a valid, degraded answer.
    fn start_session(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<FaceSessionId, Error>> + Send;

    /// Submit the capture token. Any non-success answer is
    /// [`Error::VerificationFailed`].
    fn verify(&self, token: &FaceToken) -> impl Future<Output = Result<LoginPayload, Error>> + Send;
}

/// Read-only dashboard endpoints.
#[cfg(feature = "dashboard")]
pub trait DashboardApi: Send + Sync + 'static {
    fn summary(&self) -> impl Future<Output = Result<crate::dashboard::Summary, Error>> + Send;

    fn attendance_daily(
        &self,
        days: u32,
    ) -> impl Future<Output = Result<Vec<crate::dashboard::DailyCount>, Error>> + Send;

    fn emotions(
        &self,
        days: u32,
    ) -> impl Future<Output = Result<crate::dashboard::EmotionDistribution, Error>> + Send;

    fn recent(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<crate::dashboard::AttendanceRecord>, Error>> + Send;
}

impl<T: Detector> Detector for std::sync::Arc<T> {
    fn detect(
        &self,
        frame: &EncodedFrame,
    ) -> impl Future<Output = Result<DetectionResult, Error>> + Send {
        (**self).detect(frame)
    }
}

impl<T: AttendanceMarker> AttendanceMarker for std::sync::Arc<T> {
    fn mark(&self, mark: &AttendanceMark) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).mark(mark)
    }

    fn mark_self(&self, emotion: &str) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).mark_self(emotion)
    }
}

impl<T: FaceAuthApi> FaceAuthApi for std::sync::Arc<T> {
    fn start_session(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<FaceSessionId, Error>> + Send {
        (**self).start_session(identity)
    }

    fn verify(
        &self,
        token: &FaceToken,
    ) -> impl Future<Output = Result<LoginPayload, Error>> + Send {
        (**self).verify(token)
    }
}

#[cfg(feature = "dashboard")]
impl<T: DashboardApi> DashboardApi for std::sync::Arc<T> {
    fn summary(&self) -> impl Future<Output = Result<crate::dashboard::Summary, Error>> + Send {
        (**self).summary()
    }

    fn attendance_daily(
        &self,
        days: u32,
    ) -> impl Future<Output = Result<Vec<crate::dashboard::DailyCount>, Error>> + Send {
        (**self).attendance_daily(days)
    }

    fn emotions(
        &self,
        days: u32,
    ) -> impl Future<Output = Result<crate::dashboard::EmotionDistribution, Error>> + Send {
        (**self).emotions(days)
    }

    fn recent(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<crate::dashboard::AttendanceRecord>, Error>> + Send {
        (**self).recent(limit)
    }
}
