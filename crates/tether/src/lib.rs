//! # Tether
//!
//! Client-side network session layer for games.
//!
//! Tether keeps one persistent connection to a single game server endpoint
//! and exposes it to a single-threaded update loop. The application calls
//! [`Orchestrator::request_connect`] when it wants to be online and
//! [`Orchestrator::tick`] once per frame; everything else happens in the
//! background:
//!
//! - dials run on the tokio runtime, at most one at a time, and report back
//!   through a small drop-oldest mailbox
//! - a failed dial is retried after a fixed backoff until it succeeds or the
//!   application resets
//! - after every successful dial the configured handshake is queued, built
//!   from the current [`Session`](tether_session::Session)
//! - inbound envelopes are handed to the application's handler in wire order
//!
//! No I/O ever happens on the thread that calls `tick`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! # async fn run() {
//! let session = Arc::new(SessionStore::new(MemoryStorage::new()));
//! let mut client = Orchestrator::new(
//!     OrchestratorConfig::new("ws://127.0.0.1:8080/ws"),
//!     WebSocketConnector,
//!     session,
//!     tokio::runtime::Handle::current(),
//! );
//! client.request_connect();
//!
//! let mut frame = tokio::time::interval(std::time::Duration::from_millis(16));
//! loop {
//!     frame.tick().await;
//!     client.tick(&mut |envelope: Envelope| {
//!         println!("{} {}", envelope.kind, envelope.payload);
//!     });
//! }
//! # }
//! ```

mod config;
mod dial;
mod error;
mod mailbox;
mod orchestrator;
mod pump;
mod state;

pub use config::OrchestratorConfig;
pub use dial::DialId;
pub use error::TetherError;
pub use orchestrator::{HandshakeFn, Orchestrator};
pub use pump::MessageHandler;
pub use state::ConnectionState;

/// Convenience re-exports for applications.
pub mod prelude {
    pub use crate::{ConnectionState, MessageHandler, Orchestrator, OrchestratorConfig, TetherError};
    pub use tether_protocol::Envelope;
    pub use tether_session::{FileStorage, HttpProbe, MemoryStorage, Session, SessionError, SessionStore};
    pub use tether_transport::{MemoryConnector, TransportConfig, TransportError, WebSocketConnector};
}
