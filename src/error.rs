#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Camera permission denied or device failure. Recoverable by retrying.
    #[error("{0}")]
    CameraUnavailable(String),

    /// The server answered 401. The local session must be cleared.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{operation} failed (HTTP {status}): {detail}")]
    RequestFailed {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Please enter your email or username first.")]
    EmptyIdentity,

    #[error("Face verification failed: {0}")]
    VerificationFailed(String),

    #[error("Face sign-in cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Frame encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the 401 condition, which every caller maps to a sign-out.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
