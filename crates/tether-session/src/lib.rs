//! Session persistence for Tether.
//!
//! This crate decides whether the client can reconnect without asking the
//! player to log in again:
//!
//! 1. **Storage**: where the token and username live between runs
//!    ([`Storage`] trait, [`FileStorage`], [`MemoryStorage`])
//! 2. **Session store**: best-effort save/load/clear plus an in-memory
//!    override token for the current run ([`SessionStore`])
//! 3. **Validation**: an authenticated probe that throws the session away
//!    when the server says it's dead ([`AuthProbe`], [`HttpProbe`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Orchestrator (above)  ← reads a Session snapshot for the post-connect handshake
//!     ↕
//! Session Layer (this crate)  ← token + username, durable and in-memory
//!     ↕
//! Storage / HTTP probe (below)  ← file system, GET /profile
//! ```

mod error;
mod probe;
mod storage;
mod store;

pub use error::SessionError;
pub use probe::{AuthProbe, HttpProbe, ProbeOutcome};
pub use storage::{FileStorage, MemoryStorage, SessionKey, Storage};
pub use store::{Session, SessionStore};
