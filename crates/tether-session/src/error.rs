//! Error types for the session layer.

/// Errors from token validation.
///
/// Persistence never shows up here: saves, loads, and deletes are
/// best-effort and only log on failure.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// There is no token to validate.
    #[error("no session token stored")]
    NoToken,

    /// The server rejected the token (401). The stored token and username
    /// have been cleared.
    #[error("session token rejected by server")]
    Unauthorized,

    /// The probe request itself failed (network, DNS, timeout).
    #[error("auth probe failed: {0}")]
    Probe(String),
}
