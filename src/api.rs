use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::model::{
    AttendanceMark, DetectionResult, FaceStartRequest, FaceStartResponse, FaceVerifyRequest,
    LoginPayload, SelfAttendanceMark,
};
use crate::sampler::EncodedFrame;
use crate::traits::{AttendanceMarker, Detector, FaceAuthApi};
use crate::types::{FaceSessionId, FaceToken, Identity};

/// HTTP client for the attendance service.
///
/// Reads the bearer token from the injected [`CredentialStore`] on every
/// call. With no token stored, requests go out without an `Authorization`
/// header at all.
pub struct ApiClient {
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    http: reqwest::Client,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            credentials,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Submit one JPEG frame for emotion detection.
    ///
    /// # Errors
    ///
    /// [`Error::Unauthorized`] on 401 whatever the body says,
    /// [`Error::RequestFailed`] on any other non-success status,
    /// [`Error::Http`] on transport or decoding failure.
    pub async fn detect_emotion(&self, frame: &EncodedFrame) -> Result<DetectionResult, Error> {
        let part = Part::bytes(frame.bytes.clone())
            .file_name(EncodedFrame::FILE_NAME)
            .mime_str(EncodedFrame::MIME)?;
        let form = Form::new().part("image", part);

        let response = self
            .authorized(self.http.post(self.config.endpoint("/api/emotion/detect")))
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response, "emotion detection").await?;
        response.json::<DetectionResult>().await.map_err(Into::into)
    }

    /// Record attendance for `mark.name`. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Same mapping as [`detect_emotion`](Self::detect_emotion).
    pub async fn mark_attendance(&self, mark: &AttendanceMark) -> Result<(), Error> {
        let response = self
            .authorized(self.http.post(self.config.endpoint("/api/attendance/mark")))
            .json(mark)
            .send()
            .await?;
        Self::ensure_success(response, "attendance mark").await?;
        Ok(())
    }

    /// Record attendance for the signed-in account.
    ///
    /// # Errors
    ///
    /// Same mapping as [`detect_emotion`](Self::detect_emotion).
    pub async fn mark_own_attendance(&self, emotion: &str) -> Result<(), Error> {
        let response = self
            .authorized(self.http.post(self.config.endpoint("/api/attendance/mark_self")))
            .json(&SelfAttendanceMark { emotion })
            .send()
            .await?;
        Self::ensure_success(response, "attendance self-mark").await?;
        Ok(())
    }

    /// Open a face sign-in session. A missing id comes back as an empty one.
    ///
    /// # Errors
    ///
    /// [`Error::RequestFailed`] on non-success, [`Error::Http`] on transport failure.
    pub async fn start_face_session(&self, identity: &Identity) -> Result<FaceSessionId, Error> {
        let response = self
            .http
            .post(self.config.endpoint("/api/auth/face/start"))
            .json(&FaceStartRequest { identity })
            .send()
            .await?;

        let response = Self::ensure_success(response, "face session start").await?;
        let body = response.json::<FaceStartResponse>().await?;
        Ok(body.face_session_id.unwrap_or_default())
    }

    /// Verify a capture token and receive a new session.
    ///
    /// # Errors
    ///
    /// [`Error::VerificationFailed`] on any non-success status,
    /// [`Error::Http`] on transport failure.
    pub async fn verify_face(&self, token: &FaceToken) -> Result<LoginPayload, Error> {
        let response = self
            .http
            .post(self.config.endpoint("/api/auth/face/verify"))
            .json(&FaceVerifyRequest { face_token: token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, "Face verification rejected");
            let detail = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            };
            return Err(Error::VerificationFailed(detail));
        }
        response.json::<LoginPayload>().await.map_err(Into::into)
    }

    #[cfg(feature = "dashboard")]
    pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, u32)],
        operation: &'static str,
    ) -> Result<T, Error> {
        let response = self
            .authorized(self.http.get(self.config.endpoint(path)))
            .query(query)
            .send()
            .await?;
        let response = Self::ensure_success(response, operation).await?;
        response.json::<T>().await.map_err(Into::into)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.get().filter(|t| !t.is_empty()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::RequestFailed {
            operation,
            status: status.as_u16(),
            detail: body,
        })
    }
}

impl Detector for ApiClient {
    async fn detect(&self, frame: &EncodedFrame) -> Result<DetectionResult, Error> {
        self.detect_emotion(frame).await
    }
}

impl AttendanceMarker for ApiClient {
    async fn mark(&self, mark: &AttendanceMark) -> Result<(), Error> {
        self.mark_attendance(mark).await
    }

    async fn mark_self(&self, emotion: &str) -> Result<(), Error> {
        self.mark_own_attendance(emotion).await
    }
}

impl FaceAuthApi for ApiClient {
    async fn start_session(&self, identity: &Identity) -> Result<FaceSessionId, Error> {
        self.start_face_session(identity).await
    }

    async fn verify(&self, token: &FaceToken) -> Result<LoginPayload, Error> {
        self.verify_face(token).await
    }
}
