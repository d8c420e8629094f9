//! Client transport layer for Tether.
//!
//! Two layers live here:
//!
//! - The [`Connector`] and [`Connection`] traits, which abstract over how a
//!   physical link is dialed and how text frames move over it. The
//!   [`WebSocketConnector`] is the production implementation and
//!   [`MemoryConnector`] is an in-process one for tests and offline runs.
//! - [`Transport`], which owns one live connection: the idempotent closed
//!   flag, the background reader loop feeding a bounded inbound queue, and a
//!   lock-guarded `send`. [`Outbox`] puts a bounded outbound queue and a
//!   writer task in front of a transport so callers never block on a write.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

mod config;
mod error;
pub mod memory;
mod outbox;
mod transport;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryPeer};
pub use outbox::Outbox;
pub use transport::Transport;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one transport instance.
///
/// A reconnect always produces a new id, which makes it easy to tell in
/// logs which physical connection a frame belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Dials new outgoing connections.
///
/// The returned futures are `Send` because the orchestrator runs every dial
/// on a background task.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Performs one blocking dial to `address`.
    ///
    /// # Errors
    /// Returns [`TransportError::Dial`] with a human-readable reason.
    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single physical link that carries text frames.
///
/// `send` and `recv` may be called concurrently from different tasks;
/// implementations must not hold one lock across both directions.
pub trait Connection: Send + Sync + 'static {
    /// Writes one text frame.
    fn send(&self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reads the next text frame.
    ///
    /// Returns `Ok(None)` when the remote side closed the link cleanly.
    fn recv(&self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;

    /// Closes the link.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
