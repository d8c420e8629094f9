//! Integration tests for the orchestrator and frame pump.
//!
//! Everything runs over the in-memory connector, so dials can be failed,
//! held open, and counted. Time is passed in explicitly via `tick_at`; real
//! sleeps only give background tasks a chance to run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tether::prelude::*;
use tether_transport::{MemoryListener, MemoryPeer};

const ADDRESS: &str = "mem://arena";

fn setup(config: OrchestratorConfig) -> (Orchestrator<MemoryConnector>, MemoryConnector, MemoryListener) {
    let (connector, listener) = MemoryConnector::new();
    let session = Arc::new(SessionStore::new(MemoryStorage::new()));
    let orchestrator = Orchestrator::new(config, connector.clone(), session, tokio::runtime::Handle::current());
    (orchestrator, connector, listener)
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::new(ADDRESS)
}

/// Ticks at `now` until `done` holds, yielding to background tasks between
/// ticks. Returns whether `done` was reached.
async fn pump_until<F>(
    orchestrator: &mut Orchestrator<MemoryConnector>,
    now: Instant,
    seen: &mut Vec<Envelope>,
    done: F,
) -> bool
where
    F: Fn(&Orchestrator<MemoryConnector>, &[Envelope]) -> bool,
{
    for _ in 0..2000 {
        orchestrator.tick_at(now, &mut |envelope: Envelope| seen.push(envelope));
        if done(orchestrator, seen) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    false
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn decode(frame: &str) -> Envelope {
    serde_json::from_str(frame).expect("client frames are envelopes")
}

async fn connect(orchestrator: &mut Orchestrator<MemoryConnector>, listener: &mut MemoryListener) -> MemoryPeer {
    orchestrator.request_connect();
    let mut seen = Vec::new();
    assert!(pump_until(orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    listener.try_accept().expect("peer for the adopted transport")
}

// -- Single flight ------------------------------------------------------

#[tokio::test]
async fn test_repeated_requests_and_reset_never_overlap_dials() {
    let (mut orchestrator, connector, _listener) = setup(config());
    connector.hold();

    orchestrator.request_connect();
    orchestrator.request_connect();
    orchestrator.request_connect();
    settle().await;
    assert_eq!(connector.active_dials(), 1);

    // Reset while the dial hangs, then ask again: the outstanding dial is
    // reused instead of starting a second one.
    orchestrator.reset_and_reconnect();
    orchestrator.request_connect();
    settle().await;
    assert_eq!(orchestrator.state(), ConnectionState::Connecting);
    assert!(orchestrator.is_dial_pending());
    assert_eq!(connector.active_dials(), 1);

    connector.release();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Connected).await);

    assert_eq!(connector.dial_count(), 1);
    assert_eq!(connector.max_concurrent_dials(), 1);
    assert!(!orchestrator.is_dial_pending());
}

#[tokio::test]
async fn test_request_connect_while_connected_is_noop() {
    let (mut orchestrator, connector, mut listener) = setup(config());
    let _peer = connect(&mut orchestrator, &mut listener).await;
    let id = orchestrator.transport_id();

    orchestrator.request_connect();
    settle().await;
    orchestrator.tick_at(Instant::now(), &mut |_: Envelope| {});

    assert_eq!(orchestrator.state(), ConnectionState::Connected);
    assert_eq!(orchestrator.transport_id(), id);
    assert_eq!(connector.dial_count(), 1);
}

// -- Inbound delivery ---------------------------------------------------

#[tokio::test]
async fn test_inbound_envelopes_dispatched_in_wire_order() {
    let (mut orchestrator, _connector, mut listener) = setup(config());
    let peer = connect(&mut orchestrator, &mut listener).await;

    for i in 0..50 {
        peer.push(json!({"type": "tick", "data": i}).to_string());
    }

    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |_, seen| seen.len() == 50).await);
    let order: Vec<i64> = seen.iter().map(|e| e.payload.as_i64().unwrap()).collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_malformed_inbound_frame_is_skipped() {
    let (mut orchestrator, _connector, mut listener) = setup(config());
    let peer = connect(&mut orchestrator, &mut listener).await;

    peer.push("{not json");
    peer.push(json!({"type": "", "data": 1}).to_string());
    peer.push(json!({"type": "chat", "data": "hi"}).to_string());

    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |_, seen| !seen.is_empty()).await);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, "chat");
    assert_eq!(orchestrator.state(), ConnectionState::Connected);
}

// -- Failure and backoff ------------------------------------------------

#[tokio::test]
async fn test_failed_dial_retries_once_after_backoff() {
    let (mut orchestrator, connector, _listener) = setup(config());
    connector.fail_next("connection refused");

    let t0 = Instant::now();
    orchestrator.request_connect();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Failed).await);
    assert!(orchestrator.last_error().unwrap().contains("connection refused"));
    assert_eq!(orchestrator.retry_in(t0), Some(Duration::from_secs(2)));

    // Just short of the deadline: nothing new.
    for _ in 0..5 {
        orchestrator.tick_at(t0 + Duration::from_millis(1999), &mut |_: Envelope| {});
        settle().await;
    }
    assert_eq!(connector.dial_count(), 1);
    assert_eq!(orchestrator.state(), ConnectionState::Failed);

    let t1 = t0 + Duration::from_secs(2);
    assert!(pump_until(&mut orchestrator, t1, &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    for _ in 0..5 {
        orchestrator.tick_at(t1, &mut |_: Envelope| {});
        settle().await;
    }
    assert_eq!(connector.dial_count(), 2);
    assert_eq!(orchestrator.last_error(), None);
    assert_eq!(orchestrator.retry_in(t1), None);
}

#[tokio::test]
async fn test_unrepresentable_backoff_fails_without_scheduling_retry() {
    let (mut orchestrator, connector, _listener) = setup(config().with_retry_backoff(Duration::MAX));
    connector.fail_next("refused");

    let t0 = Instant::now();
    orchestrator.request_connect();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Failed).await);
    assert!(orchestrator.last_error().unwrap().contains("refused"));
    assert_eq!(orchestrator.retry_in(t0), None);

    for _ in 0..5 {
        orchestrator.tick_at(t0 + Duration::from_secs(3600), &mut |_: Envelope| {});
        settle().await;
    }
    assert_eq!(orchestrator.state(), ConnectionState::Failed);
    assert_eq!(connector.dial_count(), 1);

    // An explicit request still works.
    orchestrator.request_connect();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    assert_eq!(connector.dial_count(), 2);
}

#[tokio::test]
async fn test_two_failures_then_success_sends_handshake_in_order() {
    let (connector, mut listener) = MemoryConnector::new();
    let session = Arc::new(SessionStore::new(MemoryStorage::new()));
    session.save_token("tok-1");
    let mut orchestrator = Orchestrator::new(config(), connector.clone(), session, tokio::runtime::Handle::current())
        .with_handshake(|session| {
            vec![
                Envelope::new("auth", json!({"token": session.token})),
                Envelope::new("join_lobby", Value::Null),
            ]
        });

    connector.fail_next("connection refused");
    connector.fail_next("timeout");

    let t0 = Instant::now();
    let mut seen = Vec::new();
    orchestrator.request_connect();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Failed).await);
    assert!(orchestrator.last_error().unwrap().contains("connection refused"));

    let t1 = t0 + Duration::from_secs(2);
    assert!(
        pump_until(&mut orchestrator, t1, &mut seen, |o, _| {
            o.state() == ConnectionState::Failed && o.last_error().is_some_and(|e| e.contains("timeout"))
        })
        .await
    );

    let t2 = t1 + Duration::from_secs(2);
    assert!(pump_until(&mut orchestrator, t2, &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    assert_eq!(connector.dial_count(), 3);

    let mut peer = listener.try_accept().expect("third dial reached the server");
    let first = decode(&peer.next_frame().await.unwrap());
    let second = decode(&peer.next_frame().await.unwrap());
    assert_eq!(first.kind, "auth");
    assert_eq!(first.payload, json!({"token": "tok-1"}));
    assert_eq!(second.kind, "join_lobby");
}

#[tokio::test]
async fn test_handshake_reads_session_at_adoption_time() {
    let (connector, mut listener) = MemoryConnector::new();
    let session = Arc::new(SessionStore::new(MemoryStorage::new()));
    let mut orchestrator = Orchestrator::new(config(), connector, Arc::clone(&session), tokio::runtime::Handle::current())
        .with_handshake(|session| vec![Envelope::new("auth", session.token.clone())]);

    session.set_session_token("fresh-login");
    let mut peer = connect(&mut orchestrator, &mut listener).await;

    let auth = decode(&peer.next_frame().await.unwrap());
    assert_eq!(auth.payload, json!("fresh-login"));
}

#[tokio::test]
async fn test_dial_timeout_fails_hung_dial() {
    let (mut orchestrator, connector, _listener) =
        setup(config().with_dial_timeout(Some(Duration::from_millis(50))));
    connector.hold();

    orchestrator.request_connect();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Failed).await);
    assert!(orchestrator.last_error().unwrap().contains("timed out"));
    assert!(!orchestrator.is_dial_pending());
}

// -- Dead transport -----------------------------------------------------

#[tokio::test]
async fn test_remote_close_keeps_connected_until_reconnect_requested() {
    let (mut orchestrator, connector, mut listener) = setup(config());
    let peer = connect(&mut orchestrator, &mut listener).await;
    let first_id = orchestrator.transport_id();

    peer.hang_up();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| !o.is_transport_open()).await);

    assert_eq!(orchestrator.state(), ConnectionState::Connected);
    assert!(matches!(
        orchestrator.try_send(Envelope::new("move", json!({"x": 1}))),
        Err(TransportError::WriteOnClosed)
    ));

    orchestrator.request_connect();
    assert_eq!(orchestrator.state(), ConnectionState::Connecting);
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    assert_ne!(orchestrator.transport_id(), first_id);
    assert_eq!(connector.dial_count(), 2);
}

#[tokio::test]
async fn test_reconnect_on_drop_treats_remote_close_as_failure() {
    let (mut orchestrator, connector, mut listener) = setup(config().with_reconnect_on_drop(true));
    let peer = connect(&mut orchestrator, &mut listener).await;

    let t0 = Instant::now();
    peer.hang_up();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Failed).await);
    assert_eq!(orchestrator.last_error(), Some("connection lost"));
    assert_eq!(orchestrator.transport_id(), None);

    let t1 = t0 + Duration::from_secs(2);
    assert!(pump_until(&mut orchestrator, t1, &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    assert_eq!(connector.dial_count(), 2);
}

// -- Reset --------------------------------------------------------------

#[tokio::test]
async fn test_result_arriving_after_reset_is_discarded_and_closed() {
    let (mut orchestrator, connector, mut listener) = setup(config());
    connector.hold();
    orchestrator.request_connect();
    settle().await;

    orchestrator.reset_to_login();
    assert_eq!(orchestrator.state(), ConnectionState::Idle);

    connector.release();
    let peer = listener.accept().await.expect("held dial completes");
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| !o.is_dial_pending()).await);

    assert_eq!(orchestrator.state(), ConnectionState::Idle);
    assert_eq!(orchestrator.transport_id(), None);
    for _ in 0..100 {
        if peer.close_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(peer.close_count(), 1);
}

#[tokio::test]
async fn test_reset_to_login_closes_transport_and_stays_idle() {
    let (mut orchestrator, connector, mut listener) = setup(config());
    let peer = connect(&mut orchestrator, &mut listener).await;

    orchestrator.reset_to_login();
    settle().await;
    for _ in 0..5 {
        orchestrator.tick_at(Instant::now() + Duration::from_secs(10), &mut |_: Envelope| {});
    }

    assert_eq!(orchestrator.state(), ConnectionState::Idle);
    assert_eq!(peer.close_count(), 1);
    assert_eq!(connector.dial_count(), 1);
    assert_eq!(orchestrator.retry_in(Instant::now()), None);
}

#[tokio::test]
async fn test_reset_and_reconnect_opens_fresh_transport() {
    let (mut orchestrator, connector, mut listener) = setup(config());
    let old = connect(&mut orchestrator, &mut listener).await;
    let old_id = orchestrator.transport_id();

    orchestrator.reset_and_reconnect();
    assert_eq!(orchestrator.state(), ConnectionState::Connecting);
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Connected).await);

    settle().await;
    assert_ne!(orchestrator.transport_id(), old_id);
    assert_eq!(old.close_count(), 1);
    assert_eq!(connector.dial_count(), 2);
}

// -- Sending ------------------------------------------------------------

#[tokio::test]
async fn test_send_or_drop_writes_when_connected() {
    let (mut orchestrator, _connector, mut listener) = setup(config());
    let mut peer = connect(&mut orchestrator, &mut listener).await;

    orchestrator.send_or_drop("chat", json!({"text": "gg"}));
    let frame: Value = serde_json::from_str(&peer.next_frame().await.unwrap()).unwrap();
    assert_eq!(frame, json!({"type": "chat", "data": {"text": "gg"}}));
}

#[tokio::test]
async fn test_send_or_drop_while_idle_drops_and_starts_connecting() {
    let (mut orchestrator, connector, mut listener) = setup(config());

    orchestrator.send_or_drop("ping", Value::Null);
    assert_eq!(orchestrator.state(), ConnectionState::Connecting);

    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, Instant::now(), &mut seen, |o, _| o.state() == ConnectionState::Connected).await);
    let mut peer = listener.try_accept().unwrap();
    settle().await;
    assert!(peer.try_next_frame().is_none(), "the dropped envelope must not be replayed");
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn test_send_or_drop_while_failed_waits_for_backoff() {
    let (mut orchestrator, connector, _listener) = setup(config());
    connector.fail_next("refused");
    let t0 = Instant::now();
    orchestrator.request_connect();
    let mut seen = Vec::new();
    assert!(pump_until(&mut orchestrator, t0, &mut seen, |o, _| o.state() == ConnectionState::Failed).await);

    orchestrator.send_or_drop("ping", Value::Null);
    settle().await;
    assert_eq!(orchestrator.state(), ConnectionState::Failed);
    assert_eq!(connector.dial_count(), 1);
}

#[tokio::test]
async fn test_try_send_without_transport_is_write_on_closed() {
    let (orchestrator, _connector, _listener) = setup(config());
    assert!(matches!(
        orchestrator.try_send(Envelope::new("ping", Value::Null)),
        Err(TransportError::WriteOnClosed)
    ));
}
