use std::time::Duration;

use tether_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// The `Display` text of a dial error is what the UI shows while the
/// orchestrator sits in `Failed`, so keep it human-readable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The dial did not finish before the configured deadline.
    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// A send was attempted after the transport was closed.
    /// No I/O was performed.
    #[error("write on closed connection")]
    WriteOnClosed,

    /// Writing a frame failed. The transport is closed afterwards.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed. Fatal for the reader loop.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The socket reported an error while closing.
    #[error("close failed: {0}")]
    CloseFailed(#[source] std::io::Error),

    /// The outbound queue is at capacity; the envelope was not queued.
    #[error("outbound queue full")]
    OutboxFull,

    /// The envelope could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
