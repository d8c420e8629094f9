//! The session store: token and username, durable plus an in-memory override.
//!
//! # Token lookup order
//!
//! ```text
//! load_token():  override (if non-empty) → persisted (if non-empty) → ""
//! ```
//!
//! The override exists so a fresh login can be used right away without a
//! round trip through disk. It lives only as long as the store.
//!
//! # Failure semantics
//!
//! Persistence is best-effort. A failed save or delete is logged and
//! swallowed; callers that care re-check with `load_*` instead of trusting
//! an earlier write.

use std::sync::{Mutex, PoisonError};

use crate::{AuthProbe, ProbeOutcome, SessionError, SessionKey, Storage};

/// A point-in-time copy of the session, handed to the handshake builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Effective token (override first). Empty when logged out.
    pub token: String,
    /// Display name. Empty when unknown.
    pub username: String,
}

impl Session {
    /// Whether there is a token to authenticate with.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Durable token/username storage shared between the orchestrator and the
/// application.
///
/// All methods take `&self`; wrap the store in an `Arc` to share it.
pub struct SessionStore {
    storage: Box<dyn Storage>,
    override_token: Mutex<Option<String>>,
}

impl SessionStore {
    /// Creates a store over the given backend.
    pub fn new(storage: impl Storage) -> Self {
        Self {
            storage: Box::new(storage),
            override_token: Mutex::new(None),
        }
    }

    // -- Token ------------------------------------------------------------

    /// Persists the token. Best-effort.
    pub fn save_token(&self, token: &str) {
        self.write(SessionKey::Token, token);
    }

    /// Returns the override if set and non-empty, else the persisted token,
    /// else an empty string.
    pub fn load_token(&self) -> String {
        if let Some(token) = self.override_token().as_deref().filter(|t| !t.is_empty()) {
            return token.to_owned();
        }
        self.read(SessionKey::Token)
    }

    /// Deletes the persisted token and drops the override. Best-effort.
    pub fn clear_token(&self) {
        self.clear_session_token();
        self.delete(SessionKey::Token);
    }

    /// Sets the in-memory override for the rest of this store's lifetime.
    /// Not persisted; call [`save_token`](Self::save_token) for that.
    pub fn set_session_token(&self, token: &str) {
        *self.override_token() = Some(token.to_owned());
    }

    /// Drops the override so `load_token` falls back to the persisted value.
    pub fn clear_session_token(&self) {
        *self.override_token() = None;
    }

    // -- Username ---------------------------------------------------------

    /// Persists the display name. Best-effort.
    pub fn save_username(&self, username: &str) {
        self.write(SessionKey::Username, username);
    }

    /// Returns the persisted display name or an empty string.
    pub fn load_username(&self) -> String {
        self.read(SessionKey::Username)
    }

    /// Deletes the persisted display name. Best-effort.
    pub fn clear_username(&self) {
        self.delete(SessionKey::Username);
    }

    // -- Whole session ----------------------------------------------------

    /// Forgets everything: override, token, and username.
    pub fn invalidate(&self) {
        self.clear_token();
        self.clear_username();
        tracing::info!("session invalidated");
    }

    /// Copies the current effective token and username.
    pub fn snapshot(&self) -> Session {
        Session {
            token: self.load_token(),
            username: self.load_username(),
        }
    }

    /// Asks the server whether the current token is still good.
    ///
    /// A 401 is the only thing that kills the session: token and username
    /// are cleared and [`SessionError::Unauthorized`] is returned. Any other
    /// answer from the server counts as success.
    ///
    /// # Errors
    /// - [`SessionError::NoToken`] if there is nothing to validate. No
    ///   request is made and the session is left as is, which is already
    ///   the logged-out state a 401 would produce.
    /// - [`SessionError::Unauthorized`] on a 401
    /// - [`SessionError::Probe`] if the request itself failed
    pub async fn validate_token(&self, probe: &impl AuthProbe) -> Result<(), SessionError> {
        let token = self.load_token();
        if token.is_empty() {
            return Err(SessionError::NoToken);
        }

        match probe.probe(&token).await? {
            ProbeOutcome::Authorized => Ok(()),
            ProbeOutcome::Unauthorized => {
                tracing::info!("server rejected session token");
                self.invalidate();
                Err(SessionError::Unauthorized)
            }
            ProbeOutcome::Status(code) => {
                tracing::warn!(code, "unexpected probe status, keeping session");
                Ok(())
            }
        }
    }

    // -- Best-effort plumbing ---------------------------------------------

    fn read(&self, key: SessionKey) -> String {
        match self.storage.read(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = key.name(), error = %e, "session read failed");
                String::new()
            }
        }
    }

    fn write(&self, key: SessionKey, value: &str) {
        if let Err(e) = self.storage.write(key, value) {
            tracing::warn!(key = key.name(), error = %e, "session write failed");
        }
    }

    fn delete(&self, key: SessionKey) {
        if let Err(e) = self.storage.remove(key) {
            tracing::warn!(key = key.name(), error = %e, "session delete failed");
        }
    }

    fn override_token(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.override_token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
