//! The envelope: the only thing that ever travels on the wire.
//!
//! ```text
//! {"type": "state.request", "data": {"since": 12}}
//!  └─ kind ─────────────┘   └─ payload (opaque) ─┘
//! ```
//!
//! The core never looks inside `payload`. It moves envelopes between the
//! socket and the application, and only the application knows what a given
//! `kind` means.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ProtocolError;

/// One logical message unit: a `kind` plus an opaque `payload`.
///
/// `kind` is serialized as `"type"` and `payload` as `"data"`. A frame
/// without `"data"` decodes with a `null` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifies the message's purpose. Opaque to the core.
    #[serde(rename = "type")]
    pub kind: String,

    /// Arbitrary structured data, carried without interpretation.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

impl Envelope {
    /// Builds an envelope from anything that converts into a JSON value
    /// (`json!` literals, strings, numbers).
    pub fn new(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Builds an envelope whose payload is a serialized application type.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if `data` can't be represented as
    /// JSON (for example a map with non-string keys).
    pub fn with_data<T: Serialize>(kind: impl Into<String>, data: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_value(data).map_err(ProtocolError::Encode)?;
        Ok(Self {
            kind: kind.into(),
            payload,
        })
    }

    /// Interprets the payload as an application type.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload has the wrong shape.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(ProtocolError::Decode)
    }

    /// Checks the rules the wire format can't express on its own.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] for an empty or
    /// whitespace-only kind.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.kind.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("envelope kind is empty".into()));
        }
        Ok(())
    }
}
