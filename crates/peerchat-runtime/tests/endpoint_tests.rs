//! Integration tests for `PeerEndpoint` without the client layer
//!
//! These drive the session manager, registry and router directly and check
//! the precondition errors and subscription semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join;
use peerchat_core::{MediaStream, PeerChatError, SessionConfig, TransportError};
use peerchat_harness::{FakeMediaDevices, MemoryHub, MockTransportConfig};
use peerchat_runtime::{Inbound, PeerEndpoint, PeerId};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn endpoint(hub: &MemoryHub) -> PeerEndpoint {
    PeerEndpoint::new(
        Arc::new(hub.clone()),
        Arc::new(FakeMediaDevices::new()),
        SessionConfig::testing(),
    )
}

#[tokio::test]
async fn test_operations_require_a_session() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    let remote = PeerId::new("bob");

    assert!(matches!(
        alice.connect(&remote).await,
        Err(PeerChatError::NotStarted)
    ));
    assert!(matches!(
        alice.on_data(&remote, |_| {}),
        Err(PeerChatError::NotStarted)
    ));
    assert!(matches!(
        alice.close(&remote).await,
        Err(PeerChatError::NotStarted)
    ));
    assert!(!alice.stop().await);
    assert_eq!(alice.id(), None);
}

#[tokio::test]
async fn test_unknown_remote_errors() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    alice.start().await.expect("Failed to start");
    let remote = PeerId::new("bob");

    assert!(matches!(
        alice.send_text(&remote, "hi").await,
        Err(PeerChatError::NoSuchConnection { .. })
    ));
    assert!(matches!(
        alice.on_data(&remote, |_| {}),
        Err(PeerChatError::NoSuchConnection { .. })
    ));
    assert!(matches!(
        alice.on_close(&remote, |_| {}),
        Err(PeerChatError::NoSuchConnection { .. })
    ));
}

#[tokio::test]
async fn test_open_timeout() {
    let hub = MemoryHub::new(MockTransportConfig {
        latency_range: (1_000, 1_000),
        id_prefix: String::new(),
    });
    let alice = endpoint(&hub);

    let err = alice.start().await.expect_err("open should time out");
    assert!(matches!(
        err,
        PeerChatError::Session(TransportError::Timeout { .. })
    ));
    assert!(!alice.is_started());
}

#[tokio::test]
async fn test_connect_in_flight_is_rejected() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    alice.start().await.expect("Failed to start");
    let ghost = PeerId::new("ghost");
    hub.set_unresponsive(ghost.clone());

    let (first, second) = join(alice.connect(&ghost), alice.connect(&ghost)).await;
    let results = [first, second];
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(PeerChatError::AlreadyConnected { .. })))
            .count(),
        1
    );
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(PeerChatError::Negotiation(TransportError::Timeout { .. }))))
            .count(),
        1
    );

    // Nothing stays pending after the timeout
    let again = alice.connect(&ghost).await;
    assert!(matches!(
        again,
        Err(PeerChatError::Negotiation(TransportError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn test_incoming_is_registered_before_callback() {
    let hub = MemoryHub::ideal();
    let alice = Arc::new(endpoint(&hub));
    let bob = endpoint(&hub);
    let alice_id = alice.start().await.expect("Failed to start");
    bob.start().await.expect("Failed to start");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = alice.clone();
    let _incoming = alice
        .on_incoming(move |peer| {
            let _ = tx.send((peer.clone(), observer.is_connected(&peer)));
        })
        .expect("Failed to subscribe");

    bob.connect(&alice_id).await.expect("Failed to connect");
    let (peer, registered) = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no incoming connection")
        .expect("channel closed");
    assert_eq!(Some(peer), bob.id());
    assert!(registered);

    assert!(matches!(
        alice.on_incoming(|_| {}),
        Err(PeerChatError::AlreadySubscribed { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_data_subscription_stops_delivery() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    let bob = Arc::new(endpoint(&hub));
    alice.start().await.expect("Failed to start");
    let bob_id = bob.start().await.expect("Failed to start");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _incoming = bob
        .on_incoming(move |peer| {
            let _ = tx.send(peer);
        })
        .expect("Failed to subscribe");

    alice.connect(&bob_id).await.expect("Failed to connect");
    let alice_id = rx.recv().await.expect("no incoming connection");

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let subscription = bob
        .on_data(&alice_id, move |inbound| {
            if let Inbound::Text(_) = inbound {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .expect("Failed to subscribe");
    assert!(matches!(
        bob.on_data(&alice_id, |_| {}),
        Err(PeerChatError::AlreadySubscribed { .. })
    ));

    alice.send_text(&bob_id, "one").await.expect("send failed");
    sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    subscription.cancel();
    alice.send_text(&bob_id, "two").await.expect("send failed");
    sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_local_close_runs_callbacks_on_both_sides() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    let bob = endpoint(&hub);
    alice.start().await.expect("Failed to start");
    let bob_id = bob.start().await.expect("Failed to start");
    let (incoming_tx, mut incoming_rx) = mpsc::unbounded_channel();
    let _incoming = bob
        .on_incoming(move |peer| {
            let _ = incoming_tx.send(peer);
        })
        .expect("Failed to subscribe");

    alice.connect(&bob_id).await.expect("Failed to connect");
    let alice_id = incoming_rx.recv().await.expect("no incoming connection");

    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let local = closed_tx.clone();
    alice
        .on_close(&bob_id, move |peer| {
            let _ = local.send(format!("alice lost {}", peer));
        })
        .expect("Failed to register");
    bob.on_close(&alice_id, move |peer| {
        let _ = closed_tx.send(format!("bob lost {}", peer));
    })
    .expect("Failed to register");

    alice.close(&bob_id).await.expect("Failed to close");

    let mut events = Vec::new();
    for _ in 0..2 {
        let event = timeout(Duration::from_secs(1), closed_rx.recv())
            .await
            .expect("close callback missing")
            .expect("channel closed");
        events.push(event);
    }
    events.sort();
    assert_eq!(
        events,
        vec![format!("alice lost {}", bob_id), format!("bob lost {}", alice_id)]
    );
    assert!(alice.connections().is_empty());
    assert!(bob.connections().is_empty());
}

#[tokio::test]
async fn test_call_requires_a_connection() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    let bob = endpoint(&hub);
    alice.start().await.expect("Failed to start");
    let bob_id = bob.start().await.expect("Failed to start");

    let local = MediaStream::audio("mic");
    let result = alice.place_call(&bob_id, local.clone(), |_| {}).await;

    assert!(matches!(result, Err(PeerChatError::NoSuchConnection { .. })));
    assert!(!local.is_live());
    assert_eq!(hub.stats().calls_placed(), 0);
    assert!(alice.call_state().is_idle());
}

#[tokio::test]
async fn test_stop_abandons_connect_in_flight() {
    let hub = MemoryHub::new(MockTransportConfig {
        latency_range: (80, 80),
        id_prefix: String::new(),
    });
    let config = SessionConfig {
        open_timeout_ms: 2_000,
        connect_timeout_ms: 2_000,
        call_timeout_ms: 2_000,
        reliable: true,
    };
    let alice = Arc::new(PeerEndpoint::new(
        Arc::new(hub.clone()),
        Arc::new(FakeMediaDevices::new()),
        config.clone(),
    ));
    let bob = PeerEndpoint::new(Arc::new(hub.clone()), Arc::new(FakeMediaDevices::new()), config);
    alice.start().await.expect("Failed to start");
    let bob_id = bob.start().await.expect("Failed to start");

    let connecting = {
        let alice = alice.clone();
        let bob_id = bob_id.clone();
        tokio::spawn(async move { alice.connect(&bob_id).await })
    };
    sleep(Duration::from_millis(20)).await;
    assert!(alice.stop().await);

    let result = connecting.await.expect("connect task panicked");
    assert!(matches!(result, Err(PeerChatError::NotStarted)));
    assert!(alice.connections().is_empty());

    // The half bob accepted is closed along with it
    timeout(Duration::from_secs(1), async {
        while !bob.connections().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bob kept the abandoned connection");

    alice.start().await.expect("Failed to restart");
    alice
        .connect(&bob_id)
        .await
        .expect("a fresh session should connect");
    assert_eq!(alice.connections(), vec![bob_id]);
}

#[tokio::test]
async fn test_unanswered_calls_are_declined() {
    let hub = MemoryHub::ideal();
    let alice = endpoint(&hub);
    let bob = endpoint(&hub);
    alice.start().await.expect("Failed to start");
    let bob_id = bob.start().await.expect("Failed to start");
    alice.connect(&bob_id).await.expect("Failed to connect");

    // Bob never subscribes to incoming calls
    let local = MediaStream::audio("mic");
    let result = alice.place_call(&bob_id, local.clone(), |_| {}).await;

    assert!(matches!(
        result,
        Err(PeerChatError::Negotiation(TransportError::ChannelClosed))
    ));
    assert!(!local.is_live());
    assert!(alice.call_state().is_idle());
    assert!(bob.call_state().is_idle());
}
