//! Background dialing.
//!
//! Each connect request that actually needs a dial spawns one short-lived
//! task. The task opens a transport (under the configured deadline), posts
//! the outcome to the mailbox, and exits. It never touches orchestrator
//! state directly; the frame pump is the only reader of the mailbox.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tether_transport::{Connection, Connector, Transport, TransportConfig, TransportError};

use crate::mailbox::Poster;

/// Identifies one dial attempt in logs and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialId(pub(crate) u64);

impl fmt::Display for DialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dial-{}", self.0)
    }
}

/// The outcome of one dial attempt.
pub(crate) struct DialResult<C: Connection> {
    pub(crate) id: DialId,
    pub(crate) outcome: Result<Transport<C>, TransportError>,
}

/// Everything a dial task needs, captured by value.
pub(crate) struct DialJob<K: Connector> {
    pub(crate) id: DialId,
    pub(crate) connector: Arc<K>,
    pub(crate) address: String,
    pub(crate) transport: TransportConfig,
    pub(crate) timeout: Option<Duration>,
}

impl<K: Connector> DialJob<K> {
    /// Runs the dial and posts its result. Evicted results that carried a
    /// live transport are closed here, off the update thread.
    pub(crate) async fn run(self, results: Poster<DialResult<K::Connection>>) {
        tracing::debug!(id = %self.id, address = %self.address, "dialing");
        let outcome = self.open().await;
        if let Err(e) = &outcome {
            tracing::debug!(id = %self.id, error = %e, "dial failed");
        }

        for stale in results.post(DialResult { id: self.id, outcome }) {
            tracing::warn!(id = %stale.id, "result mailbox full, dropped oldest dial result");
            if let Ok(transport) = stale.outcome {
                if let Err(e) = transport.close().await {
                    tracing::debug!(id = %stale.id, error = %e, "socket close failed");
                }
            }
        }
    }

    async fn open(&self) -> Result<Transport<K::Connection>, TransportError> {
        let open = Transport::open(&*self.connector, &self.address, &self.transport);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, open)
                .await
                .map_err(|_| TransportError::DialTimeout(limit))?,
            None => open.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tether_transport::MemoryConnector;

    use super::*;
    use crate::mailbox::Mailbox;

    fn job(id: u64, connector: &Arc<MemoryConnector>) -> DialJob<MemoryConnector> {
        DialJob {
            id: DialId(id),
            connector: Arc::clone(connector),
            address: "mem://arena".into(),
            transport: TransportConfig::default(),
            timeout: Some(Duration::from_secs(1)),
        }
    }

    #[tokio::test]
    async fn test_run_closes_transport_evicted_from_full_mailbox() {
        let (connector, mut listener) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let mailbox = Mailbox::new(1);

        job(1, &connector).run(mailbox.poster()).await;
        let first = listener.try_accept().unwrap();
        job(2, &connector).run(mailbox.poster()).await;
        let second = listener.try_accept().unwrap();

        assert_eq!(first.close_count(), 1);
        assert_eq!(second.close_count(), 0);
        let kept = mailbox.try_take().unwrap();
        assert_eq!(kept.id, DialId(2));
        assert!(kept.outcome.is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_timeout_for_held_dial() {
        let (connector, _listener) = MemoryConnector::new();
        connector.hold();
        let connector = Arc::new(connector);
        let mailbox = Mailbox::new(1);

        let mut slow = job(1, &connector);
        slow.timeout = Some(Duration::from_millis(20));
        slow.run(mailbox.poster()).await;

        let result = mailbox.try_take().unwrap();
        assert!(matches!(result.outcome, Err(TransportError::DialTimeout(_))));
    }
}
