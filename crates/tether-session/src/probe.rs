//! Authenticated probe used to check a stored token.
//!
//! The server is the only authority on whether a token is still alive, so
//! validation is one cheap authenticated request. The [`AuthProbe`] trait
//! keeps the store testable; [`HttpProbe`] is the real thing.

use std::future::Future;
use std::time::Duration;

use crate::SessionError;

/// How long an HTTP probe may take before it counts as a failure.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the server said about a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx: the token is good.
    Authorized,
    /// 401: the token is dead.
    Unauthorized,
    /// Any other status. Not proof of a dead token.
    Status(u16),
}

/// Performs one authenticated request with a bearer token.
pub trait AuthProbe: Send + Sync {
    /// Probes the server with `token`.
    ///
    /// # Errors
    /// [`SessionError::Probe`] when no answer came back at all.
    fn probe(&self, token: &str) -> impl Future<Output = Result<ProbeOutcome, SessionError>> + Send;
}

/// `GET {base_url}/profile` with `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Probes `{base_url}/profile` with a fresh client.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Probes `{base_url}/profile` with an existing client (shared pools,
    /// custom TLS roots).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/profile", base_url.trim_end_matches('/')),
        }
    }

    /// The full URL this probe requests.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AuthProbe for HttpProbe {
    async fn probe(&self, token: &str) -> Result<ProbeOutcome, SessionError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| SessionError::Probe(e.to_string()))?;

        let status = response.status();
        tracing::debug!(url = %self.url, %status, "auth probe answered");

        Ok(if status == reqwest::StatusCode::UNAUTHORIZED {
            ProbeOutcome::Unauthorized
        } else if status.is_success() {
            ProbeOutcome::Authorized
        } else {
            ProbeOutcome::Status(status.as_u16())
        })
    }
}
