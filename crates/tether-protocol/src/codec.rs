//! Codec trait and the JSON implementation.
//!
//! Every frame on the wire is a single text message, so a codec here maps
//! between Rust values and `String`s. The transport only ever asks a codec
//! for [`Envelope`](crate::Envelope)s, but the methods stay generic so the
//! application can reuse the same codec for its payload types.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values into text frames and decodes text frames back.
///
/// `Send + Sync + 'static` because a codec is shared between the update
/// thread and the transport's background reader and writer tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the frame is malformed or has
    /// the wrong shape.
    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use tether_protocol::{Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = codec.encode(&Envelope::new("ping", 7)).unwrap();
/// assert_eq!(frame, r#"{"type":"ping","data":7}"#);
///
/// let back: Envelope = codec.decode(&frame).unwrap();
/// assert_eq!(back.kind, "ping");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}
