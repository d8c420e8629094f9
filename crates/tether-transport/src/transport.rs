//! One live connection: closed flag, reader loop, inbound queue.
//!
//! # Locking
//!
//! The connection handle and the `closed` flag live together behind one
//! `std::sync::Mutex`. Every decision to use or drop the handle is made
//! under that lock, and the actual I/O happens after it is released, so a
//! slow write never blocks `is_closed()` on the update thread.
//!
//! ```text
//!            open()
//!              │
//!              ▼
//!   [open: closed=false, conn=Some] ──send() I/O error──┐
//!              │        │                              │
//!          close()   reader EOF / read error           │
//!              ▼        ▼                              ▼
//!        [dead: closed=true, conn=None]  ←─────────────┘
//! ```
//!
//! A dead transport is never revived; reconnecting means opening a new one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tether_protocol::{Codec, Envelope, JsonCodec};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::{Connection, ConnectionId, Connector, TransportConfig, TransportError};

struct Link<C> {
    closed: bool,
    conn: Option<Arc<C>>,
}

/// The live wrapper around one physical connection.
///
/// Created by [`Transport::open`] (dial + start reader) or
/// [`Transport::start`] (adopt an already-dialed connection). Both require
/// a Tokio runtime context because the reader loop is spawned immediately.
pub struct Transport<C: Connection> {
    id: ConnectionId,
    link: Arc<Mutex<Link<C>>>,
    /// Single consumer: the frame pump. The mutex only makes the type
    /// `Sync` so the transport can be shared with an [`Outbox`](crate::Outbox).
    inbound: Mutex<mpsc::Receiver<Envelope>>,
    reader: AbortHandle,
    codec: JsonCodec,
}

impl<C: Connection> Transport<C> {
    /// Dials `address` and starts the reader loop.
    ///
    /// # Errors
    /// Whatever the connector reports; no transport exists on failure.
    pub async fn open<K>(connector: &K, address: &str, config: &TransportConfig) -> Result<Self, TransportError>
    where
        K: Connector<Connection = C>,
    {
        let conn = connector.connect(address).await?;
        let transport = Self::start(conn, config);
        tracing::info!(id = %transport.id, address, "transport open");
        Ok(transport)
    }

    /// Wraps an established connection and spawns its reader loop.
    pub fn start(conn: C, config: &TransportConfig) -> Self {
        let id = ConnectionId::next();
        let conn = Arc::new(conn);
        let link = Arc::new(Mutex::new(Link {
            closed: false,
            conn: Some(Arc::clone(&conn)),
        }));
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));

        let reader = tokio::spawn(read_loop(id, conn, Arc::clone(&link), tx)).abort_handle();

        Self {
            id,
            link,
            inbound: Mutex::new(rx),
            reader,
            codec: JsonCodec,
        }
    }

    /// This transport's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Serializes `{kind, payload}` and writes it as one frame.
    ///
    /// # Errors
    /// - [`TransportError::WriteOnClosed`] if the transport is already
    ///   closed (no I/O is attempted)
    /// - the connection's write error, after which the transport is closed
    pub async fn send(&self, kind: impl Into<String>, payload: impl Into<Value>) -> Result<(), TransportError> {
        self.send_envelope(&Envelope::new(kind, payload)).await
    }

    /// Same as [`send`](Self::send) for a prebuilt envelope.
    ///
    /// # Errors
    /// See [`send`](Self::send). An encode failure is reported as
    /// [`TransportError::Protocol`] and leaves the transport open.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let conn = {
            let link = self.lock();
            match (&link.conn, link.closed) {
                (Some(conn), false) => Arc::clone(conn),
                _ => return Err(TransportError::WriteOnClosed),
            }
        };

        let frame = self.codec.encode(envelope)?;
        if let Err(e) = conn.send(frame).await {
            tracing::debug!(id = %self.id, error = %e, "write failed, closing transport");
            self.detach();
            return Err(e);
        }
        Ok(())
    }

    /// Thread-safe read of the closed flag.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Closes the transport. Idempotent.
    ///
    /// The first caller performs the real socket close and gets its
    /// result; every later caller (and any caller after the reader loop
    /// already saw the link die) gets `Ok(())`.
    ///
    /// # Errors
    /// The connection's close error, first caller only.
    pub async fn close(&self) -> Result<(), TransportError> {
        match self.begin_close() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    /// The synchronous half of [`close`](Self::close): flips `closed`,
    /// releases the handle, and stops the reader loop.
    ///
    /// Returns the connection if this call won the race, so the caller can
    /// run the socket close wherever blocking is acceptable. Returns `None`
    /// if the transport was already closed.
    pub fn begin_close(&self) -> Option<Arc<C>> {
        let conn = {
            let mut link = self.lock();
            if link.closed {
                return None;
            }
            link.closed = true;
            link.conn.take()
        };
        self.reader.abort();
        tracing::debug!(id = %self.id, "transport closed locally");
        conn
    }

    /// Takes the next queued inbound envelope without waiting.
    ///
    /// Returns `None` when nothing has arrived since the last call, and
    /// also once the reader loop has finished and the queue is drained.
    pub fn try_recv(&self) -> Option<Envelope> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    fn detach(&self) {
        mark_dead(&self.link);
    }

    fn lock(&self) -> MutexGuard<'_, Link<C>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Connection> Drop for Transport<C> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn mark_dead<C>(link: &Mutex<Link<C>>) {
    let mut link = link.lock().unwrap_or_else(PoisonError::into_inner);
    link.closed = true;
    link.conn = None;
}

/// Reads frames until the link dies, pushing decoded envelopes in order.
///
/// Malformed frames are dropped. Dropping `inbound` on exit closes the
/// queue so the consumer can tell no more input is coming.
async fn read_loop<C: Connection>(
    id: ConnectionId,
    conn: Arc<C>,
    link: Arc<Mutex<Link<C>>>,
    inbound: mpsc::Sender<Envelope>,
) {
    let codec = JsonCodec;
    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%id, "remote closed the connection");
                break;
            }
            Err(e) => {
                tracing::info!(%id, error = %e, "read failed");
                break;
            }
        };

        let envelope = match codec.decode::<Envelope>(&frame) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%id, error = %e, "dropping malformed frame");
                continue;
            }
        };
        if let Err(e) = envelope.validate() {
            tracing::debug!(%id, error = %e, "dropping invalid envelope");
            continue;
        }

        // Blocking push: a full queue stalls the reader until the next drain.
        if inbound.send(envelope).await.is_err() {
            tracing::debug!(%id, "inbound queue dropped, stopping reader");
            break;
        }
    }
    mark_dead(&link);
}
