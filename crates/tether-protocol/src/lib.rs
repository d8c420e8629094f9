//! Wire protocol for Tether.
//!
//! This crate defines what travels over the single client connection:
//!
//! - **Types** ([`Envelope`]): one self-describing message unit, a
//!   `kind` plus an opaque `payload`.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become
//!   text frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding
//!   or decoding.
//!
//! # Architecture
//!
//! The protocol layer sits below the transport. It knows nothing about
//! sockets, reader loops, or connection state.
//!
//! ```text
//! Orchestrator (state) → Transport (frames) → Protocol (Envelope ↔ text)
//! ```

mod codec;
mod envelope;
mod error;

pub use codec::{Codec, JsonCodec};
pub use envelope::Envelope;
pub use error::ProtocolError;
