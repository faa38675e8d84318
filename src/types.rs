use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Prefix the server expects on capture tokens synthesized from a session id.
const CAPTURE_TOKEN_PREFIX: &str = "demo-token-";

/// Email or username typed into the face sign-in form.
///
/// Guaranteed non-blank and trimmed by construction.
/// Use `"alice".parse::<Identity>()` or `Identity::try_from(string)` to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::EmptyIdentity);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl From<Identity> for String {
    fn from(i: Identity) -> Self {
        i.0
    }
}

/// Server-issued face-authentication session identifier (opaque).
///
/// May be empty: the server signals a degraded session that way.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct FaceSessionId(pub String);

impl FaceSessionId {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Capture token submitted to the face verification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct FaceToken(pub String);

impl FaceToken {
    /// Synthesizes the capture token for a session once the countdown expires.
    #[must_use]
    pub fn for_session(session_id: &FaceSessionId) -> Self {
        Self(format!("{CAPTURE_TOKEN_PREFIX}{session_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
