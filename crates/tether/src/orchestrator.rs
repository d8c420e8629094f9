//! The connection state machine.
//!
//! The orchestrator turns "I want to be connected" into at most one dial at
//! a time, adopts the resulting transport, queues the handshake, and
//! schedules retries after failures. It is driven from a single update
//! thread: every method takes `&mut self`, and background tasks only ever
//! talk back through the result mailbox.
//!
//! # Single flight
//!
//! `pending` holds the id of the one dial task whose result hasn't been
//! taken from the mailbox yet. It is set when a dial is launched and
//! cleared when the frame pump receives that dial's result, both on the
//! update thread. A connect request made while a dial is outstanding (for
//! example right after a reset) launches nothing and takes that dial's
//! outcome instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tether_protocol::Envelope;
use tether_session::{Session, SessionStore};
use tether_transport::{Connection, ConnectionId, Connector, Outbox, Transport, TransportError, WebSocketConnector};
use tokio::runtime::Handle;

use crate::dial::{DialId, DialJob, DialResult};
use crate::mailbox::Mailbox;
use crate::{ConnectionState, OrchestratorConfig};

/// Builds the ordered batch of envelopes sent right after every successful
/// dial (identify, then request initial state, and so on).
pub type HandshakeFn = Box<dyn Fn(&Session) -> Vec<Envelope> + Send + Sync>;

/// Owns the connection lifecycle for one endpoint.
///
/// ```rust,no_run
/// # async fn demo() {
/// use std::sync::Arc;
/// use tether::prelude::*;
///
/// let session = Arc::new(SessionStore::new(FileStorage::platform("my-game")));
/// let mut orchestrator = Orchestrator::new(
///     OrchestratorConfig::new("wss://play.example.com/ws"),
///     WebSocketConnector,
///     session,
///     tokio::runtime::Handle::current(),
/// )
/// .with_handshake(|session| vec![Envelope::new("auth", session.token.clone())]);
///
/// orchestrator.request_connect();
/// // Once per frame:
/// orchestrator.tick(&mut |envelope: Envelope| println!("{}", envelope.kind));
/// # }
/// ```
pub struct Orchestrator<K: Connector = WebSocketConnector> {
    pub(crate) config: OrchestratorConfig,
    connector: Arc<K>,
    runtime: Handle,
    session: Arc<SessionStore>,
    handshake: Option<HandshakeFn>,

    pub(crate) state: ConnectionState,
    pub(crate) last_error: Option<String>,
    pub(crate) retry_at: Option<Instant>,
    pub(crate) pending: Option<DialId>,
    next_dial: u64,

    pub(crate) live: Option<Outbox<K::Connection>>,
    pub(crate) results: Mailbox<DialResult<K::Connection>>,
}

impl<K: Connector> Orchestrator<K> {
    /// Creates an idle orchestrator. Dials and writers are spawned on
    /// `runtime`; the orchestrator itself never blocks on it.
    pub fn new(config: OrchestratorConfig, connector: K, session: Arc<SessionStore>, runtime: Handle) -> Self {
        let config = config.validated();
        let results = Mailbox::new(config.result_capacity);
        Self {
            config,
            connector: Arc::new(connector),
            runtime,
            session,
            handshake: None,
            state: ConnectionState::Idle,
            last_error: None,
            retry_at: None,
            pending: None,
            next_dial: 1,
            live: None,
            results,
        }
    }

    /// Sets the post-connect handshake.
    #[must_use]
    pub fn with_handshake<F>(mut self, handshake: F) -> Self
    where
        F: Fn(&Session) -> Vec<Envelope> + Send + Sync + 'static,
    {
        self.handshake = Some(Box::new(handshake));
        self
    }

    // -- Requests ---------------------------------------------------------

    /// Asks for a connection.
    ///
    /// No-op while `Connecting`, and while `Connected` with an open
    /// transport. Otherwise any dead transport is released, the state
    /// becomes `Connecting`, the error text and retry deadline are cleared,
    /// and a dial is launched unless one is already outstanding.
    pub fn request_connect(&mut self) {
        match self.state {
            ConnectionState::Connecting => {
                tracing::debug!("connect requested while already connecting");
                return;
            }
            ConnectionState::Connected if self.is_transport_open() => {
                tracing::debug!("connect requested while connected");
                return;
            }
            _ => {}
        }

        self.release_transport();
        self.state = ConnectionState::Connecting;
        self.last_error = None;
        self.retry_at = None;

        if let Some(id) = self.pending {
            tracing::info!(%id, "connect requested, waiting on outstanding dial");
            return;
        }
        self.launch_dial();
    }

    /// Tears the connection down and immediately asks for a new one.
    ///
    /// Use for a session reset where the player stays logged in. The caller
    /// clears its own session-bound state.
    pub fn reset_and_reconnect(&mut self) {
        self.teardown();
        self.request_connect();
    }

    /// Tears the connection down and stays `Idle`.
    ///
    /// Use on logout: the next connect is driven by a later login success,
    /// not by the retry timer.
    pub fn reset_to_login(&mut self) {
        self.teardown();
    }

    /// Queues `{kind, payload}` on the open transport. Fire-and-forget.
    ///
    /// Without an open transport the envelope is dropped with a warning and,
    /// if the orchestrator is `Idle` or holding a dead transport, a connect
    /// is requested. Queueing errors are logged, not returned.
    pub fn send_or_drop(&mut self, kind: impl Into<String>, payload: impl Into<Value>) {
        let envelope = Envelope::new(kind, payload);
        match self.try_send(envelope) {
            Ok(()) => {}
            Err(TransportError::WriteOnClosed) => {
                tracing::warn!(state = %self.state, "no open transport, envelope dropped");
                if matches!(self.state, ConnectionState::Idle | ConnectionState::Connected) {
                    self.request_connect();
                }
            }
            Err(e) => tracing::warn!(error = %e, "envelope dropped"),
        }
    }

    /// Queues an envelope on the open transport and reports failure.
    ///
    /// # Errors
    /// - [`TransportError::WriteOnClosed`] when there is no transport or it
    ///   has died
    /// - [`TransportError::OutboxFull`] when the outbound queue is full
    pub fn try_send(&self, envelope: Envelope) -> Result<(), TransportError> {
        match &self.live {
            Some(outbox) => outbox.push(envelope),
            None => Err(TransportError::WriteOnClosed),
        }
    }

    // -- Observation ------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Human-readable reason for the last failure, for display.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Time left until the automatic retry, if one is scheduled.
    pub fn retry_in(&self, now: Instant) -> Option<Duration> {
        self.retry_at.map(|at| at.saturating_duration_since(now))
    }

    /// Whether a dial task's result is still outstanding.
    pub fn is_dial_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether an adopted transport exists and is still open. No transport
    /// counts as closed.
    pub fn is_transport_open(&self) -> bool {
        self.live.as_ref().is_some_and(|outbox| !outbox.transport().is_closed())
    }

    /// Id of the adopted transport, if any.
    pub fn transport_id(&self) -> Option<ConnectionId> {
        self.live.as_ref().map(|outbox| outbox.transport().id())
    }

    /// The session store this orchestrator reads its handshake from.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // -- Transitions (update thread only) ---------------------------------

    /// Applies one dial result taken from the mailbox.
    pub(crate) fn apply_result(&mut self, result: DialResult<K::Connection>, now: Instant) {
        if self.pending == Some(result.id) {
            self.pending = None;
        } else {
            tracing::debug!(id = %result.id, "result from a dial that is no longer pending");
        }

        if self.state != ConnectionState::Connecting {
            tracing::debug!(id = %result.id, state = %self.state, "discarding stale dial result");
            if let Ok(transport) = result.outcome {
                self.close_in_background(&transport);
            }
            return;
        }

        match result.outcome {
            Ok(transport) => self.adopt(transport),
            Err(e) => self.fail(e.to_string(), now),
        }
    }

    /// Records a failure and schedules the retry. A backoff too large to
    /// represent as a deadline leaves the orchestrator `Failed` until the
    /// application asks again.
    pub(crate) fn fail(&mut self, reason: String, now: Instant) {
        self.release_transport();
        let retry_at = now.checked_add(self.config.retry_backoff);
        match retry_at {
            Some(_) => tracing::warn!(error = %reason, retry_in = ?self.config.retry_backoff, "connection failed"),
            None => tracing::warn!(error = %reason, "connection failed, no automatic retry"),
        }
        self.state = ConnectionState::Failed;
        self.last_error = Some(reason);
        self.retry_at = retry_at;
    }

    fn adopt(&mut self, transport: Transport<K::Connection>) {
        let transport = Arc::new(transport);
        let id = transport.id();
        let outbox = Outbox::spawn(&self.runtime, transport, self.config.transport.outbound_capacity);

        let batch = match &self.handshake {
            Some(build) => build(&self.session.snapshot()),
            None => Vec::new(),
        };
        let count = batch.len();
        for envelope in batch {
            if let Err(e) = outbox.push(envelope) {
                tracing::warn!(%id, error = %e, "handshake envelope dropped");
            }
        }

        self.live = Some(outbox);
        self.state = ConnectionState::Connected;
        self.last_error = None;
        self.retry_at = None;
        tracing::info!(%id, handshake = count, "connected");
    }

    fn launch_dial(&mut self) {
        let id = DialId(self.next_dial);
        self.next_dial += 1;
        self.pending = Some(id);

        let job = DialJob {
            id,
            connector: Arc::clone(&self.connector),
            address: self.config.address.clone(),
            transport: self.config.transport.clone(),
            timeout: self.config.dial_timeout,
        };
        tracing::info!(%id, address = %self.config.address, "connecting");
        self.runtime.spawn(job.run(self.results.poster()));
    }

    fn teardown(&mut self) {
        self.release_transport();

        for stale in self.results.drain() {
            if self.pending == Some(stale.id) {
                self.pending = None;
            }
            if let Ok(transport) = stale.outcome {
                self.close_in_background(&transport);
            }
        }

        self.state = ConnectionState::Idle;
        self.last_error = None;
        self.retry_at = None;
        tracing::info!("connection reset to idle");
    }

    /// Drops the adopted transport, closing it if it's still open.
    fn release_transport(&mut self) {
        if let Some(outbox) = self.live.take() {
            self.close_in_background(outbox.transport());
        }
    }

    /// Flips the closed flag now; the socket close runs on the runtime.
    fn close_in_background<C: Connection>(&self, transport: &Transport<C>) {
        if let Some(conn) = transport.begin_close() {
            let id = transport.id();
            self.runtime.spawn(async move {
                if let Err(e) = conn.close().await {
                    tracing::debug!(%id, error = %e, "socket close failed");
                }
            });
        }
    }
}
