//! Display-only inspection of bearer tokens.
//!
//! Nothing here verifies a signature. The decoded claims are good for showing
//! a name on screen and for labelling attendance marks; they must never gate
//! access to anything.

use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value as JsonValue;

/// Base64url that accepts both padded and unpadded segments.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims decoded from a token payload without verification.
#[derive(Debug, Clone)]
pub struct UntrustedClaims {
    inner: JsonValue,
}

impl UntrustedClaims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// The `sub` claim, if it is a non-empty string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_claim("sub")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Decodes the middle segment of a three-part `header.payload.signature` token.
///
/// Returns `None` for anything that is not exactly three segments or whose
/// payload is not base64url-encoded JSON.
#[must_use]
pub fn decode_untrusted_claims(token: &str) -> Option<UntrustedClaims> {
    let payload = extract_payload_segment(token)?;
    let inner: JsonValue = serde_json::from_slice(&payload).ok()?;
    Some(UntrustedClaims { inner })
}

/// Subject claim of a token, for display only.
#[must_use]
pub fn subject_from_token(token: &str) -> Option<String> {
    decode_untrusted_claims(token)?.subject().map(str::to_owned)
}

fn extract_payload_segment(token: &str) -> Option<Vec<u8>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    LENIENT_URL_SAFE.decode(parts[1]).ok()
}

#[cfg(test)]
pub(crate) fn unsigned_token(claims: &JsonValue) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;

    use super::*;

    #[test]
    fn subject_decoded_from_payload() {
        let token = unsigned_token(&json!({"sub": "42", "username": "alice"}));
        assert_eq!(subject_from_token(&token).as_deref(), Some("42"));

        let claims = decode_untrusted_claims(&token).unwrap();
        assert_eq!(claims.get_claim("username"), Some(&json!("alice")));
    }

    #[test]
    fn padded_payload_accepted() {
        let payload = URL_SAFE.encode(json!({"sub": "bob"}).to_string());
        let token = format!("e30.{payload}.sig");
        assert_eq!(subject_from_token(&token).as_deref(), Some("bob"));
    }

    #[test]
    fn wrong_segment_count_yields_none() {
        assert!(subject_from_token("opaque-bearer").is_none());
        assert!(subject_from_token("a.b").is_none());
        assert!(subject_from_token("a.b.c.d").is_none());
    }

    #[test]
    fn garbage_payload_yields_none() {
        assert!(subject_from_token("e30.%%%.sig").is_none());
        // valid base64, not JSON
        assert!(subject_from_token("e30.aGVsbG8.sig").is_none());
    }

    #[test]
    fn missing_or_empty_subject_yields_none() {
        assert!(subject_from_token(&unsigned_token(&json!({"name": "x"}))).is_none());
        assert!(subject_from_token(&unsigned_token(&json!({"sub": ""}))).is_none());
        assert!(subject_from_token(&unsigned_token(&json!({"sub": 7}))).is_none());
    }
}
