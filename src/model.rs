use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{FaceSessionId, FaceToken, Identity};

/// Axis-aligned box in source-frame pixels (unscaled, not mirrored).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub bbox: BBox,
    /// Highest-confidence emotion label for this face.
    pub top_emotion: String,
}

/// Result of one inference call. Produced fresh per frame, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub faces: Vec<Face>,
    /// Server-side running tally of emotion labels.
    #[serde(default)]
    pub history: HashMap<String, u64>,
}

impl DetectionResult {
    /// Faces are reported in server order; the first one drives attendance.
    #[must_use]
    pub fn top_face(&self) -> Option<&Face> {
        self.faces.first()
    }

    /// Tally entries sorted by count, highest first.
    #[must_use]
    pub fn history_sorted(&self) -> Vec<(&str, u64)> {
        sorted_counts(&self.history)
    }
}

/// Body of `POST /api/attendance/mark`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceMark {
    pub name: String,
    pub emotion: String,
}

/// Body of `POST /api/attendance/mark_self`; the server takes the name from the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SelfAttendanceMark<'a> {
    pub(crate) emotion: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct FaceStartRequest<'a> {
    pub(crate) identity: &'a Identity,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FaceStartResponse {
    #[serde(default)]
    pub(crate) face_session_id: Option<FaceSessionId>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FaceVerifyRequest<'a> {
    pub(crate) face_token: &'a FaceToken,
}

/// Success payload of face verification: a freshly issued session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct LoginPayload {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user_display: Option<String>,
}

impl LoginPayload {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            user_display: None,
        }
    }
}

fn default_token_type() -> String {
    "bearer".into()
}

pub(crate) fn sorted_counts(counts: &HashMap<String, u64>) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
}
