use std::fmt;

/// The externally visible connection state.
///
/// Only the update thread changes it; background tasks report through the
/// dial result mailbox instead.
///
/// ```text
///            request_connect()
///   Idle ─────────────────────→ Connecting ──dial ok──→ Connected
///    ↑                            │   ↑                     │
///    │                      dial err  │ backoff elapsed     │
///    │                            ▼   │                     │
///    │                            Failed                    │
///    └──────────── reset_to_login() / reset_and_reconnect() ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Nothing is happening; waiting for a request.
    #[default]
    Idle,
    /// A dial is in flight.
    Connecting,
    /// A transport is adopted and the handshake has been queued.
    Connected,
    /// The last dial failed; a retry is scheduled.
    Failed,
}

impl ConnectionState {
    /// Short status text for a connection indicator.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Offline",
            Self::Connecting => "Connecting…",
            Self::Connected => "Online",
            Self::Failed => "Connection failed",
        }
    }

    /// Whether the application may send right now.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
