//! Unified error type for Tether.

use tether_protocol::ProtocolError;
use tether_session::SessionError;
use tether_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so an
/// application depending only on `tether` handles one type.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (dial, send, closed).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid envelope).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (missing or rejected token, probe failure).
    #[error(transparent)]
    Session(#[from] SessionError),
}
