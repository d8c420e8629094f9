//! Error types for the protocol layer.
//!
//! Each crate in Tether defines its own error enum. When you see a
//! `ProtocolError`, the problem is in turning envelopes into frames or
//! frames into envelopes, never in the network itself.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (envelope → text).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (text → envelope).
    ///
    /// Common causes: malformed JSON, a missing `type` field, or a
    /// frame that isn't an object at all. The transport's reader loop
    /// drops such frames and keeps reading.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope parsed but breaks a protocol rule (empty kind).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
