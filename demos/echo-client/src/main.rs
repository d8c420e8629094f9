//! A minimal game loop driving Tether against an echo-style server.
//!
//! ```text
//! echo-client [ws://host:port/path]
//! ```
//!
//! The address falls back to `TETHER_ADDR`, then to a local default. When
//! `TETHER_API` is set the saved token is checked against
//! `{TETHER_API}/profile` before connecting. Set `RUST_LOG=tether=debug`
//! to watch the state machine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "ws://127.0.0.1:8080/ws";
const FRAME: Duration = Duration::from_millis(16);
const PING_EVERY: u64 = 120;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let address = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TETHER_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    let session = Arc::new(SessionStore::new(FileStorage::platform("tether-echo")));
    if let Ok(api) = std::env::var("TETHER_API") {
        match session.validate_token(&HttpProbe::new(&api)).await {
            Ok(()) => tracing::info!("saved session accepted"),
            Err(SessionError::NoToken) => tracing::info!("no saved session, connecting anonymously"),
            Err(e) => tracing::warn!(error = %e, "saved session rejected"),
        }
    }

    // -----------------------------------------------------------------------
    // Orchestrator
    // -----------------------------------------------------------------------

    let config = OrchestratorConfig::new(address).with_reconnect_on_drop(true);
    let mut client = Orchestrator::new(
        config,
        WebSocketConnector,
        Arc::clone(&session),
        tokio::runtime::Handle::current(),
    )
    .with_handshake(|session| {
        let mut batch = Vec::new();
        if session.has_token() {
            batch.push(Envelope::new("identify", json!({"token": session.token})));
        }
        batch.push(Envelope::new("hello", json!({"name": session.username})));
        batch
    });

    client.request_connect();

    // -----------------------------------------------------------------------
    // Frame loop
    // -----------------------------------------------------------------------

    let mut frame = tokio::time::interval(FRAME);
    let mut last_state = client.state();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = frame.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                client.reset_to_login();
                break;
            }
        }

        client.tick(&mut |envelope: Envelope| {
            tracing::info!(kind = %envelope.kind, data = %envelope.payload, "received");
        });

        let state = client.state();
        if state != last_state {
            match client.last_error() {
                Some(reason) => tracing::info!(state = state.label(), %reason, "state changed"),
                None => tracing::info!(state = state.label(), "state changed"),
            }
            last_state = state;
        }

        frames += 1;
        if state.is_connected() && frames % PING_EVERY == 0 {
            client.send_or_drop("ping", json!({"frame": frames}));
        }
    }

    // Give the background close a moment to reach the socket.
    tokio::time::sleep(Duration::from_millis(50)).await;
}
