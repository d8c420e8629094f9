//! Queue sizing for a transport.

/// Capacities of the two queues that hang off every [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Inbound envelopes buffered between the reader loop and the frame
    /// pump. A full queue stalls the reader until the next drain.
    ///
    /// Default: 256.
    pub inbound_capacity: usize,

    /// Outbound envelopes buffered in an [`Outbox`](crate::Outbox) before
    /// pushes start failing with `OutboxFull`.
    ///
    /// Default: 64.
    pub outbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 256,
            outbound_capacity: 64,
        }
    }
}

impl TransportConfig {
    /// Clamps capacities to at least 1 (tokio channels panic on 0).
    pub fn validated(mut self) -> Self {
        if self.inbound_capacity == 0 {
            tracing::warn!("inbound_capacity is 0, clamping to 1");
            self.inbound_capacity = 1;
        }
        if self.outbound_capacity == 0 {
            tracing::warn!("outbound_capacity is 0, clamping to 1");
            self.outbound_capacity = 1;
        }
        self
    }
}
