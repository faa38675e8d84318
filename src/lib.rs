#![doc = include_str!("../README.md")]

pub mod api;
pub mod attendance;
pub mod config;
pub mod credentials;
#[cfg(feature = "dashboard")]
pub mod dashboard;
pub mod error;
pub mod face_auth;
pub mod live;
pub mod media;
pub mod model;
pub mod overlay;
pub mod sampler;
pub mod token;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use api::ApiClient;
pub use attendance::{
    AttendanceAction, AttendanceMode, AttendanceRateLimiter, Dispatch, SpawnDispatch,
};
pub use config::ClientConfig;
pub use credentials::{CredentialStore, MemoryCredentials, is_signed_in, resolve_display_name};
#[cfg(feature = "dashboard")]
pub use dashboard::{
    AttendanceRecord, DailyCount, Dashboard, DashboardAggregator, EmotionDistribution, Summary,
};
pub use error::Error;
pub use face_auth::{CancelHandle, FaceAuthMachine, FaceAuthState, Phase, seconds_left};
pub use live::{DetectionView, LiveDetection};
pub use media::{
    Camera, CameraConstraints, CameraDevice, CameraError, FRAME_RATE_CHOICES, MediaCapture,
    VideoStream,
};
pub use model::{AttendanceMark, BBox, DetectionResult, Face, LoginPayload};
pub use overlay::{
    Canvas, DrawCommand, DrawList, OverlayRenderer, OverlayStyle, RasterCanvas, TextRun,
};
pub use sampler::{EncodedFrame, FrameEncoder, FrameSampler, FrameSink, SampledFrame};
pub use token::{UntrustedClaims, decode_untrusted_claims, subject_from_token};
#[cfg(feature = "dashboard")]
pub use traits::DashboardApi;
pub use traits::{AttendanceMarker, Detector, FaceAuthApi};
pub use types::{FaceSessionId, FaceToken, Identity};
