//! Bounded outbound queue in front of a [`Transport`].
//!
//! `Transport::send` waits on the socket. The update thread must never do
//! that, so it pushes into an `Outbox` instead and a writer task performs
//! the sends in push order.

use std::sync::Arc;

use tether_protocol::Envelope;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{Connection, Transport, TransportError};

/// Queues envelopes for one transport and writes them from a background task.
///
/// Dropping the outbox stops the writer once the queue is empty.
pub struct Outbox<C: Connection> {
    transport: Arc<Transport<C>>,
    queue: mpsc::Sender<Envelope>,
}

impl<C: Connection> Outbox<C> {
    /// Spawns the writer task on `runtime`.
    pub fn spawn(runtime: &Handle, transport: Arc<Transport<C>>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        runtime.spawn(write_loop(Arc::clone(&transport), rx));
        Self { transport, queue: tx }
    }

    /// Queues one envelope without waiting.
    ///
    /// # Errors
    /// - [`TransportError::WriteOnClosed`] if the transport is closed or the
    ///   writer has stopped
    /// - [`TransportError::OutboxFull`] if `capacity` envelopes are already
    ///   waiting
    pub fn push(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.transport.is_closed() {
            return Err(TransportError::WriteOnClosed);
        }
        self.queue.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::OutboxFull,
            TrySendError::Closed(_) => TransportError::WriteOnClosed,
        })
    }

    /// The transport this outbox writes to.
    pub fn transport(&self) -> &Arc<Transport<C>> {
        &self.transport
    }
}

async fn write_loop<C: Connection>(transport: Arc<Transport<C>>, mut queue: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = queue.recv().await {
        if let Err(e) = transport.send_envelope(&envelope).await {
            tracing::warn!(
                id = %transport.id(),
                kind = %envelope.kind,
                error = %e,
                "outbound envelope dropped"
            );
            // Encode errors only cost the one envelope.
            if transport.is_closed() {
                break;
            }
        }
    }
    tracing::debug!(id = %transport.id(), "writer stopped");
}
