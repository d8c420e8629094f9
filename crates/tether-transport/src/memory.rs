//! In-process connector: a client [`Connection`] paired with a server-side
//! [`MemoryPeer`], both backed by tokio channels.
//!
//! Useful anywhere a real socket would be in the way: orchestrator tests,
//! offline demos, replaying a recorded session. The connector can be
//! scripted to fail upcoming dials and to hold dials open until released,
//! which is how the single-flight and backoff behavior gets exercised.
//!
//! ```text
//! MemoryConnector ──connect()──→ MemoryConnection  (client side)
//!        │                              ↕ frames
//!        └──→ MemoryListener ──accept()──→ MemoryPeer (server side)
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::{Connection, Connector, TransportError};

/// What the server side pushes toward the client.
#[derive(Debug)]
enum Downstream {
    Frame(String),
    Close,
    Fail(String),
}

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<String>,
    addresses: Vec<String>,
}

/// Dials in-process connections.
///
/// Clones share the same script and listener, so a test can keep one
/// handle while the orchestrator owns another.
#[derive(Clone)]
pub struct MemoryConnector {
    script: Arc<Mutex<Script>>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
    gate: Arc<watch::Sender<bool>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

/// Receives the server side of every successful dial.
pub struct MemoryListener {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Creates a connector and the listener that sees its peers.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (gate, _) = watch::channel(true);
        let connector = Self {
            script: Arc::new(Mutex::new(Script::default())),
            accepted: tx,
            gate: Arc::new(gate),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        };
        (connector, MemoryListener { accepted: rx })
    }

    /// Makes the next not-yet-scripted dial fail with `reason`.
    /// Calls queue up: three calls fail the next three dials.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.script().failures.push_back(reason.into());
    }

    /// Holds every dial (including ones already waiting) until
    /// [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Lets held dials proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Total dials attempted so far, successful or not.
    pub fn dial_count(&self) -> usize {
        self.script().addresses.len()
    }

    /// Addresses passed to `connect`, in call order.
    pub fn dialed(&self) -> Vec<String> {
        self.script().addresses.clone()
    }

    /// Dials currently inside `connect`.
    pub fn active_dials(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// The most dials that were ever inside `connect` at the same time.
    pub fn max_concurrent_dials(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the active-dial counter however `connect` exits.
struct ActiveDial(Arc<AtomicUsize>);

impl Drop for ActiveDial {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &str) -> Result<Self::Connection, TransportError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveDial(Arc::clone(&self.active));

        self.script().addresses.push(address.to_owned());

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so this only errors if the connector
        // itself is gone, which can't happen while we borrow it.
        let _ = gate.wait_for(|open| *open).await;

        if let Some(reason) = self.script().failures.pop_front() {
            return Err(TransportError::Dial(reason));
        }

        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(LinkFlags::default());

        let peer = MemoryPeer {
            downstream: down_tx,
            upstream: up_rx,
            flags: Arc::clone(&shared),
        };
        if self.accepted.send(peer).is_err() {
            return Err(TransportError::Dial("connection refused (no listener)".into()));
        }

        Ok(MemoryConnection {
            downstream: tokio::sync::Mutex::new(down_rx),
            upstream: up_tx,
            flags: shared,
        })
    }
}

impl MemoryListener {
    /// Waits for the next connection the connector hands out.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Returns an already-established peer, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct LinkFlags {
    closes: AtomicUsize,
    closed_by_client: AtomicBool,
    writes_broken: AtomicBool,
}

/// Client side of an in-memory link.
pub struct MemoryConnection {
    downstream: tokio::sync::Mutex<mpsc::UnboundedReceiver<Downstream>>,
    upstream: mpsc::UnboundedSender<String>,
    flags: Arc<LinkFlags>,
}

impl Connection for MemoryConnection {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.flags.writes_broken.load(Ordering::SeqCst) || self.flags.closed_by_client.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory link broken",
            )));
        }
        self.upstream
            .send(frame)
            .map_err(|_| TransportError::SendFailed(io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped")))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        match self.downstream.lock().await.recv().await {
            Some(Downstream::Frame(text)) => Ok(Some(text)),
            Some(Downstream::Close) | None => Ok(None),
            Some(Downstream::Fail(reason)) => Err(TransportError::ReceiveFailed(io::Error::new(
                io::ErrorKind::ConnectionReset,
                reason,
            ))),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.flags.closes.fetch_add(1, Ordering::SeqCst);
        self.flags.closed_by_client.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Server side of an in-memory link.
pub struct MemoryPeer {
    downstream: mpsc::UnboundedSender<Downstream>,
    upstream: mpsc::UnboundedReceiver<String>,
    flags: Arc<LinkFlags>,
}

impl MemoryPeer {
    /// Sends a raw text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.downstream.send(Downstream::Frame(frame.into()));
    }

    /// Closes the link cleanly from the server side (client reads EOF).
    pub fn hang_up(&self) {
        let _ = self.downstream.send(Downstream::Close);
    }

    /// Makes the client's next read fail with an I/O error.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        let _ = self.downstream.send(Downstream::Fail(reason.into()));
    }

    /// Makes every further client write fail with an I/O error.
    pub fn break_writes(&self) {
        self.flags.writes_broken.store(true, Ordering::SeqCst);
    }

    /// Waits for the next frame the client wrote.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.upstream.recv().await
    }

    /// Returns a frame the client already wrote, if any.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.upstream.try_recv().ok()
    }

    /// How many times the client called `close` on this link.
    pub fn close_count(&self) -> usize {
        self.flags.closes.load(Ordering::SeqCst)
    }
}
