//! Integration tests for the chat client against the in-memory hub
//!
//! Every test builds its own hub and clients, so nothing is shared between
//! tests. Timeouts come from `PeerChatConfig::testing()`.

use std::sync::Arc;
use std::time::Duration;

use peerchat_core::{
    CallState, DataRecord, DataType, MediaConstraints, NoticeLevel, Origin, PeerChatConfig,
    PeerChatError, SessionState, Transfer, TransportError,
};
use peerchat_harness::{FakeMediaDevices, MemoryHub, RecordingFileSink};
use peerchat_runtime::{ChatClient, ClientBuilder, Notice, OutgoingFile, PeerId};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

struct TestPeer {
    client: ChatClient,
    media: Arc<FakeMediaDevices>,
    sink: Arc<RecordingFileSink>,
    id: PeerId,
}

fn build(hub: &MemoryHub) -> (ChatClient, Arc<FakeMediaDevices>, Arc<RecordingFileSink>) {
    let media = Arc::new(FakeMediaDevices::new());
    let sink = Arc::new(RecordingFileSink::new());
    let client = ClientBuilder::new(Arc::new(hub.clone()), media.clone())
        .with_config(PeerChatConfig::testing())
        .with_file_sink(sink.clone())
        .build()
        .expect("Failed to build client");
    (client, media, sink)
}

async fn started_peer(hub: &MemoryHub) -> TestPeer {
    let (client, media, sink) = build(hub);
    let id = client.start_session().await.expect("Failed to start session");
    TestPeer {
        client,
        media,
        sink,
        id,
    }
}

/// Connect `from` to `to` through the input field and wait until both sides
/// list each other
async fn connect(from: &TestPeer, to: &TestPeer) {
    from.client.change_input(to.id.as_str());
    from.client.connect_peer().await.expect("Failed to connect");
    assert!(
        wait_until(|| to.client.state().connection.list.contains(&from.id)).await,
        "remote never saw the connection"
    );
}

async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let poll = async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(Duration::from_secs(2), poll).await.is_ok()
}

/// Wait for a notice whose text contains `needle`
async fn expect_notice(rx: &mut broadcast::Receiver<Notice>, needle: &str) -> Notice {
    let search = async {
        loop {
            match rx.recv().await {
                Ok(notice) if notice.text.contains(needle) => return notice,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("notice channel closed"),
            }
        }
    };
    timeout(Duration::from_secs(2), search)
        .await
        .unwrap_or_else(|_| panic!("no notice containing {:?}", needle))
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_start_session_populates_state() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;

    let session = alice.client.state().session;
    assert!(session.started);
    assert!(!session.loading);
    assert_eq!(session.id.as_ref(), Some(&alice.id));
    assert!(hub.is_registered(&alice.id));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;

    let err = assert_err!(alice.client.start_session().await);
    assert!(matches!(err, PeerChatError::AlreadyStarted { .. }));

    let session = alice.client.state().session;
    assert_eq!(session.id.as_ref(), Some(&alice.id));
    assert!(!session.loading);
    assert_eq!(hub.peers(), vec![alice.id.clone()]);
}

#[tokio::test]
async fn test_failed_open_resets_loading() {
    let hub = MemoryHub::ideal();
    hub.fail_next_open(TransportError::Signaling {
        reason: "server-error".to_string(),
    });
    let (client, _media, _sink) = build(&hub);
    let mut notices = client.notices();

    let err = assert_err!(client.start_session().await);
    assert!(matches!(err, PeerChatError::Session(_)));
    assert_eq!(client.state().session, SessionState::default());

    let notice = expect_notice(&mut notices, "server-error").await;
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_stop_resets_session_with_open_connections() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    let carol = started_peer(&hub).await;
    connect(&alice, &bob).await;
    connect(&alice, &carol).await;
    assert_eq!(alice.client.state().connection.list.len(), 2);

    alice.client.stop_session().await;

    let state = alice.client.state();
    assert_eq!(state.session, SessionState::default());
    assert!(state.connection.list.is_empty());
    assert!(alice.client.endpoint().connections().is_empty());
    assert!(!hub.is_registered(&alice.id));

    assert!(wait_until(|| bob.client.state().connection.list.is_empty()).await);
    assert!(wait_until(|| carol.client.state().connection.list.is_empty()).await);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    alice.client.stop_session().await;
    alice.client.stop_session().await;

    let new_id = assert_ok!(alice.client.start_session().await);
    assert_ne!(new_id, alice.id);

    // Incoming connections still reach the client after the restart
    let bob = started_peer(&hub).await;
    bob.client.change_input(new_id.as_str());
    assert_ok!(bob.client.connect_peer().await);
    assert!(wait_until(|| alice.client.state().connection.list.contains(&bob.id)).await);
}

#[tokio::test]
async fn test_session_errors_become_notices() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let mut notices = alice.client.notices();

    assert!(hub.inject_session_error(
        &alice.id,
        TransportError::Signaling {
            reason: "socket-error".to_string(),
        },
    ));

    let notice = expect_notice(&mut notices, "socket-error").await;
    assert_eq!(notice.level, NoticeLevel::Error);
}

// ----------------------------------------------------------------------------
// Connections
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_lists_both_sides() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    let mut bob_notices = bob.client.notices();

    connect(&alice, &bob).await;

    let alice_state = alice.client.state().connection;
    assert_eq!(alice_state.list, vec![bob.id.clone()]);
    assert!(!alice_state.loading);
    expect_notice(&mut bob_notices, &format!("Incoming connection: {}", alice.id)).await;
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;

    let err = assert_err!(alice.client.connect_peer().await);
    assert!(matches!(err, PeerChatError::AlreadyConnected { .. }));
    assert_eq!(alice.client.endpoint().connections(), vec![bob.id.clone()]);
    assert_eq!(alice.client.state().connection.list, vec![bob.id.clone()]);
    assert!(!alice.client.state().connection.loading);
}

#[tokio::test]
async fn test_connect_to_unresponsive_peer_times_out() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let ghost = PeerId::new("ghost");
    hub.set_unresponsive(ghost.clone());
    let mut notices = alice.client.notices();

    alice.client.change_input("ghost");
    let err = assert_err!(alice.client.connect_peer().await);
    assert!(matches!(
        err,
        PeerChatError::Negotiation(TransportError::Timeout { .. })
    ));

    let state = alice.client.state().connection;
    assert!(state.list.is_empty());
    assert!(!state.loading);
    assert!(!alice.client.endpoint().is_connected(&ghost));
    let notice = expect_notice(&mut notices, "timeout").await;
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_connect_to_unknown_peer_fails() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;

    alice.client.change_input("nobody-home");
    let err = assert_err!(alice.client.connect_peer().await);
    assert!(matches!(
        err,
        PeerChatError::Negotiation(TransportError::PeerUnavailable { .. })
    ));
    assert!(alice.client.state().connection.list.is_empty());
}

#[tokio::test]
async fn test_closing_removes_exactly_that_peer() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    let carol = started_peer(&hub).await;
    connect(&alice, &bob).await;
    connect(&alice, &carol).await;
    alice.client.select(bob.id.clone());
    let mut notices = alice.client.notices();

    // Bob hangs up the data connection; Alice sees the remote close
    assert_ok!(bob.client.disconnect(&alice.id).await);

    assert!(wait_until(|| alice.client.state().connection.list == vec![carol.id.clone()]).await);
    let state = alice.client.state().connection;
    assert_eq!(state.selected_id, None);
    assert!(bob.client.state().connection.list.is_empty());
    assert_eq!(carol.client.state().connection.list, vec![alice.id.clone()]);
    expect_notice(&mut notices, &format!("Connection closed: {}", bob.id)).await;
}

#[tokio::test]
async fn test_remote_session_loss_closes_connection() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;

    assert!(hub.drop_peer(&bob.id).await);
    assert!(wait_until(|| alice.client.state().connection.list.is_empty()).await);
}

// ----------------------------------------------------------------------------
// Messages and Files
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_text_is_appended_once_with_origin() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;

    alice.client.select(bob.id.clone());
    assert_ok!(alice.client.send_text("hello").await);

    assert!(wait_until(|| !bob.client.state().connection.messages.is_empty()).await);
    sleep(Duration::from_millis(20)).await;

    let received = bob.client.state().connection.messages;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].origin, Origin::Other);
    assert_eq!(received[0].peer, alice.id);
    assert_eq!(received[0].text, "hello");

    let sent = alice.client.state().connection.messages;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].origin, Origin::You);
    assert_eq!(sent[0].peer, bob.id);
}

#[tokio::test]
async fn test_whitespace_only_text_is_sent() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;

    alice.client.select(bob.id.clone());
    assert_ok!(alice.client.send_text("   ").await);

    assert!(wait_until(|| !bob.client.state().connection.messages.is_empty()).await);
    assert_eq!(bob.client.state().connection.messages[0].text, "   ");
    assert_eq!(alice.client.state().connection.messages[0].text, "   ");
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    alice.client.select(bob.id.clone());

    for n in 0..20 {
        assert_ok!(alice.client.send_text(&format!("message {}", n)).await);
    }

    assert!(wait_until(|| bob.client.state().connection.messages.len() == 20).await);
    let texts: Vec<String> = bob
        .client
        .state()
        .connection
        .messages
        .into_iter()
        .map(|m| m.text)
        .collect();
    let expected: Vec<String> = (0..20).map(|n| format!("message {}", n)).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn test_send_without_connection_leaves_log_unchanged() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let mut notices = alice.client.notices();

    // Selected peer that was never connected
    alice.client.select(PeerId::new("stranger"));
    let err = assert_err!(alice.client.send_text("hello").await);
    assert!(matches!(err, PeerChatError::NoSuchConnection { .. }));
    assert!(alice.client.state().connection.messages.is_empty());
    expect_notice(&mut notices, "No connection to stranger").await;
}

#[tokio::test]
async fn test_file_record_goes_to_sink_not_log() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    alice.client.select(bob.id.clone());
    let mut alice_notices = alice.client.notices();
    let mut bob_notices = bob.client.notices();

    let file = OutgoingFile::new(
        "report.pdf",
        Some("application/pdf".to_string()),
        vec![7; 4096],
    );
    assert_ok!(alice.client.send_file(Some(file)).await);
    expect_notice(&mut alice_notices, "Send file successfully").await;
    assert!(!alice.client.state().connection.send_loading);

    assert!(bob.sink.wait_for(1, Duration::from_secs(2)).await);
    sleep(Duration::from_millis(20)).await;
    let saved = bob.sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_name, "report.pdf");
    assert_eq!(saved[0].file_type.as_deref(), Some("application/pdf"));
    assert_eq!(saved[0].bytes.len(), 4096);
    assert!(bob.client.state().connection.messages.is_empty());
    assert!(alice.client.state().connection.messages.is_empty());

    expect_notice(
        &mut bob_notices,
        &format!("Receiving file report.pdf from {}", alice.id),
    )
    .await;
}

#[tokio::test]
async fn test_nameless_file_and_other_records() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    let endpoint = alice.client.endpoint();
    let mut notices = bob.client.notices();

    let other = DataRecord {
        data_type: DataType::Other,
        file: None,
        file_name: Some("ignored.bin".to_string()),
        file_type: None,
        message: Some("not for display".to_string()),
    };
    assert_ok!(endpoint.send(&bob.id, &Transfer::Record(other)).await);

    let nameless = DataRecord {
        data_type: DataType::File,
        file: Some(vec![1, 2, 3]),
        file_name: None,
        file_type: None,
        message: None,
    };
    assert_ok!(endpoint.send(&bob.id, &Transfer::Record(nameless)).await);
    assert_ok!(endpoint.send_text(&bob.id, "after").await);

    assert!(wait_until(|| bob.client.state().connection.messages.len() == 1).await);
    assert_eq!(bob.sink.count(), 1);
    assert_eq!(bob.sink.saved()[0].file_name, "fileName");

    // Both records are announced, only the FILE record is saved
    expect_notice(&mut notices, &format!("Receiving file ignored.bin from {}", alice.id)).await;
    expect_notice(&mut notices, &format!("Receiving file fileName from {}", alice.id)).await;
}

#[tokio::test]
async fn test_send_file_failure_resets_loading() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let mut notices = alice.client.notices();

    alice.client.select(PeerId::new("stranger"));
    let file = OutgoingFile::new("a.txt", None, b"hi".to_vec());
    assert_err!(alice.client.send_file(Some(file)).await);

    assert!(!alice.client.state().connection.send_loading);
    let notice = expect_notice(&mut notices, "Error when sending file").await;
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_input_validation_notices() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let mut notices = alice.client.notices();

    alice.client.change_input("   ");
    assert_ok!(alice.client.connect_peer().await);
    let notice = expect_notice(&mut notices, "Please enter ID").await;
    assert_eq!(notice.level, NoticeLevel::Warning);

    assert_ok!(alice.client.send_text("hi").await);
    expect_notice(&mut notices, "Please select a connection").await;

    assert_ok!(alice.client.send_file(None).await);
    expect_notice(&mut notices, "Please select file").await;

    alice.client.select(PeerId::new("someone"));
    assert_ok!(alice.client.send_text("").await);
    expect_notice(&mut notices, "Type Message").await;

    assert!(alice.client.state().connection.messages.is_empty());
    assert_eq!(hub.stats().payloads_delivered(), 0);
}

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

fn assert_audio_only(media: &FakeMediaDevices) {
    let requests = media.requests();
    assert!(!requests.is_empty());
    assert!(requests.iter().all(|c| *c == MediaConstraints::AUDIO_ONLY));
}

#[tokio::test]
async fn test_call_connects_both_sides() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    alice.client.select(bob.id.clone());
    let mut bob_notices = bob.client.notices();

    assert_ok!(alice.client.call().await);

    assert!(alice.client.call_state().is_active());
    assert!(wait_until(|| bob.client.call_state().is_active()).await);
    assert_eq!(alice.client.call_state().peer(), Some(&bob.id));
    assert_eq!(bob.client.call_state().peer(), Some(&alice.id));
    assert_audio_only(&alice.media);
    assert_audio_only(&bob.media);
    expect_notice(&mut bob_notices, "Call with").await;
}

#[tokio::test]
async fn test_hang_up_stops_tracks_on_both_sides() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    alice.client.select(bob.id.clone());
    assert_ok!(alice.client.call().await);
    assert!(wait_until(|| bob.client.call_state().is_active()).await);

    let alice_call = alice.client.endpoint().active_call().expect("active call");
    let bob_call = bob.client.endpoint().active_call().expect("active call");

    assert!(alice.client.hang_up().await);
    assert_eq!(alice.client.call_state(), CallState::Idle);
    assert!(!alice_call.local.is_live());
    assert!(!alice_call.remote.is_live());

    assert!(wait_until(|| bob.client.call_state().is_idle()).await);
    assert!(!bob_call.local.is_live());
    assert!(!bob_call.remote.is_live());
    assert!(!alice.client.hang_up().await);
}

#[tokio::test]
async fn test_second_incoming_call_is_declined() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    let carol = started_peer(&hub).await;
    connect(&alice, &bob).await;
    connect(&carol, &bob).await;

    alice.client.select(bob.id.clone());
    assert_ok!(alice.client.call().await);
    assert!(wait_until(|| bob.client.call_state().is_active()).await);

    carol.client.select(bob.id.clone());
    let err = assert_err!(carol.client.call().await);
    assert!(matches!(
        err,
        PeerChatError::Negotiation(TransportError::ChannelClosed)
    ));

    assert_eq!(bob.client.call_state().peer(), Some(&alice.id));
    assert!(carol.client.call_state().is_idle());
    assert!(alice.client.call_state().is_active());
}

#[tokio::test]
async fn test_denied_capture_declines_call() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    bob.media.set_denied(true);

    alice.client.select(bob.id.clone());
    assert_err!(alice.client.call().await);

    assert!(alice.client.call_state().is_idle());
    assert!(wait_until(|| bob.client.call_state().is_idle()).await);
    assert_audio_only(&bob.media);
}

#[tokio::test]
async fn test_denied_local_capture_reports_error() {
    let hub = MemoryHub::ideal();
    let alice = started_peer(&hub).await;
    let bob = started_peer(&hub).await;
    connect(&alice, &bob).await;
    alice.media.set_denied(true);
    let mut notices = alice.client.notices();

    alice.client.select(bob.id.clone());
    let err = assert_err!(alice.client.call().await);
    assert!(matches!(err, PeerChatError::Media(_)));
    assert!(alice.client.call_state().is_idle());
    assert_eq!(hub.stats().calls_placed(), 0);
    expect_notice(&mut notices, "Permission").await;
}
