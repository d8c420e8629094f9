//! The per-frame integration point.

use std::time::Instant;

use tether_protocol::Envelope;
use tether_transport::Connector;

use crate::{ConnectionState, Orchestrator};

/// Receives every inbound envelope the pump dispatches.
///
/// Any `FnMut(Envelope)` closure is a handler, so most callers never name
/// this trait.
pub trait MessageHandler {
    fn handle(&mut self, envelope: Envelope);
}

impl<F> MessageHandler for F
where
    F: FnMut(Envelope),
{
    fn handle(&mut self, envelope: Envelope) {
        self(envelope)
    }
}

impl<K: Connector> Orchestrator<K> {
    /// Advances the orchestrator by one frame. Call exactly once per
    /// application tick from the update thread. Never blocks.
    pub fn tick<H>(&mut self, handler: &mut H)
    where
        H: MessageHandler + ?Sized,
    {
        self.tick_at(Instant::now(), handler);
    }

    /// [`tick`](Self::tick) with an explicit clock reading.
    ///
    /// In order:
    /// 1. `Failed`, past the retry deadline, no dial outstanding: connect.
    /// 2. Take at most one dial result and apply it.
    /// 3. `Connected`: hand every queued inbound envelope to `handler` in
    ///    arrival order.
    /// 4. With `reconnect_on_drop`, a dead transport becomes a failure.
    pub fn tick_at<H>(&mut self, now: Instant, handler: &mut H)
    where
        H: MessageHandler + ?Sized,
    {
        if self.state == ConnectionState::Failed
            && self.pending.is_none()
            && self.retry_at.is_some_and(|at| now >= at)
        {
            tracing::debug!("retry deadline passed");
            self.request_connect();
        }

        if let Some(result) = self.results.try_take() {
            self.apply_result(result, now);
        }

        if self.state != ConnectionState::Connected {
            return;
        }

        // A transport that died since the last tick may still hold
        // envelopes the reader queued before it saw EOF.
        let mut dispatched = 0usize;
        if let Some(outbox) = &self.live {
            let transport = outbox.transport();
            while let Some(envelope) = transport.try_recv() {
                handler.handle(envelope);
                dispatched += 1;
            }
        }
        if dispatched > 0 {
            tracing::trace!(dispatched, "dispatched inbound envelopes");
        }

        if self.config.reconnect_on_drop && !self.is_transport_open() {
            self.fail("connection lost".to_string(), now);
        }
    }
}
