use std::sync::RwLock;

use crate::token;

/// Name used for attendance marks when nothing better is known.
pub const FALLBACK_DISPLAY_NAME: &str = "Camera User";

/// Consumer-provided bearer token storage.
///
/// Every authenticated call reads the token through this trait instead of
/// ambient global state. Clearing it is how the client signs out locally.
///
/// # Example
///
/// ```rust,ignore
/// impl CredentialStore for KeychainStore {
///     fn get(&self) -> Option<String> {
///         self.keychain.read("token").ok()
///     }
///     fn set(&self, token: String) {
///         let _ = self.keychain.write("token", &token);
///     }
///     fn clear(&self) {
///         let _ = self.keychain.delete("token");
///     }
/// }
/// ```
pub trait CredentialStore: Send + Sync + 'static {
    /// Current bearer token, if signed in.
    fn get(&self) -> Option<String>;

    /// Store a freshly issued bearer token.
    fn set(&self, token: String);

    /// Drop the token (local sign-out).
    fn clear(&self);

    /// Locally cached display name, used when the token carries no subject.
    fn display_name(&self) -> Option<String> {
        None
    }
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
    display_name: Option<String>,
}

impl MemoryCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start signed in with the given token.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set(token.into());
        self
    }

    /// Set the cached display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl CredentialStore for MemoryCredentials {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: String) {
        *self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }
}

/// True when a bearer token is stored. Screens behind sign-in check this
/// before rendering and send the user to the login surface otherwise.
#[must_use]
pub fn is_signed_in<C: CredentialStore + ?Sized>(credentials: &C) -> bool {
    credentials.get().is_some_and(|t| !t.is_empty())
}

/// Name attached to an attendance mark.
///
/// Resolution order: token subject, then cached display name, then
/// [`FALLBACK_DISPLAY_NAME`]. Evaluated on every call.
#[must_use]
pub fn resolve_display_name<C: CredentialStore + ?Sized>(credentials: &C) -> String {
    credentials
        .get()
        .and_then(|t| token::subject_from_token(&t))
        .or_else(|| credentials.display_name().filter(|n| !n.is_empty()))
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string())
}
