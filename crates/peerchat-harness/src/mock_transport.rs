//! In-memory signaling hub
//!
//! Implements the signaling/transport collaborator traits entirely in process.
//! Every session opened through a `MemoryHub` gets a fresh identifier and can
//! open data connections and place calls to any other session registered on
//! the same hub. Data channels are reliable and ordered; an optional latency
//! range delays every open and every payload.
//!
//! Fault injection hooks let tests make the next `open` fail, make a peer
//! unresponsive (its connects never complete), or push collaborator errors
//! into a live session.

use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use peerchat_core::{
    CallEvent, ConnectOptions, ConnectionEvent, DataConnection, MediaCall, MediaStream,
    MediaTrack, OpenedSession, PeerId, PeerSession, SessionEvent, SignalingTransport,
    TransportError,
};

// ----------------------------------------------------------------------------
// Mock Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration for hub behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockTransportConfig {
    /// Simulated latency range (min, max) in milliseconds
    pub latency_range: (u64, u64),
    /// Prefix prepended to every assigned peer identifier
    pub id_prefix: String,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            latency_range: (1, 5),
            id_prefix: String::new(),
        }
    }
}

impl MockTransportConfig {
    /// No latency at all, for deterministic tests
    pub fn ideal() -> Self {
        Self {
            latency_range: (0, 0),
            id_prefix: String::new(),
        }
    }

    /// Latency of a typical local network
    pub fn lan() -> Self {
        Self {
            latency_range: (5, 20),
            id_prefix: String::new(),
        }
    }

    fn sample_latency(&self) -> Duration {
        let (min, max) = self.latency_range;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(min.min(max)..=max))
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct HubStats {
    pub sessions_opened: AtomicU64,
    pub connections_opened: AtomicU64,
    pub payloads_delivered: AtomicU64,
    pub calls_placed: AtomicU64,
}

impl HubStats {
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    pub fn payloads_delivered(&self) -> u64 {
        self.payloads_delivered.load(Ordering::Relaxed)
    }

    pub fn calls_placed(&self) -> u64 {
        self.calls_placed.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn simulate_latency(config: &MockTransportConfig) {
    let delay = config.sample_latency();
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

// ----------------------------------------------------------------------------
// Hub
// ----------------------------------------------------------------------------

struct HubInner {
    config: MockTransportConfig,
    sessions: DashMap<PeerId, Arc<MemorySession>>,
    unresponsive: DashSet<PeerId>,
    pending_open_failure: Mutex<Option<TransportError>>,
    stats: HubStats,
}

/// In-process signaling server shared by every session opened through it
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(MockTransportConfig::default())
    }
}

impl MemoryHub {
    pub fn new(config: MockTransportConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                sessions: DashMap::new(),
                unresponsive: DashSet::new(),
                pending_open_failure: Mutex::new(None),
                stats: HubStats::default(),
            }),
        }
    }

    /// Hub without latency
    pub fn ideal() -> Self {
        Self::new(MockTransportConfig::ideal())
    }

    pub fn config(&self) -> &MockTransportConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &HubStats {
        &self.inner.stats
    }

    /// Identifiers of every open session, sorted
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn is_registered(&self, peer: &PeerId) -> bool {
        self.inner.sessions.contains_key(peer)
    }

    /// Connects to `peer` will hang forever
    pub fn set_unresponsive(&self, peer: PeerId) {
        self.inner.unresponsive.insert(peer);
    }

    /// Make the next `open` fail with `error`
    pub fn fail_next_open(&self, error: TransportError) {
        *lock(&self.inner.pending_open_failure) = Some(error);
    }

    /// Push a collaborator error into a live session
    pub fn inject_session_error(&self, peer: &PeerId, error: TransportError) -> bool {
        match self.inner.sessions.get(peer) {
            Some(session) => session.events.send(SessionEvent::Error(error)).is_ok(),
            None => false,
        }
    }

    /// Tear down a session as if the remote browser tab had been closed
    pub async fn drop_peer(&self, peer: &PeerId) -> bool {
        let session = self
            .inner
            .sessions
            .get(peer)
            .map(|entry| entry.value().clone());
        match session {
            Some(session) => {
                session.destroy().await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SignalingTransport for MemoryHub {
    async fn open(&self) -> Result<OpenedSession, TransportError> {
        if let Some(error) = lock(&self.inner.pending_open_failure).take() {
            warn!("Refusing session open: {}", error);
            return Err(error);
        }

        simulate_latency(&self.inner.config).await;

        let id = PeerId::new(format!("{}{}", self.inner.config.id_prefix, Uuid::new_v4()));
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(MemorySession {
            id: id.clone(),
            hub: Arc::downgrade(&self.inner),
            events,
            destroyed: AtomicBool::new(false),
            links: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        });

        self.inner.sessions.insert(id.clone(), session.clone());
        self.inner.stats.sessions_opened.fetch_add(1, Ordering::Relaxed);
        info!("Hub assigned peer ID {}", id);

        Ok(OpenedSession {
            session,
            events: events_rx,
        })
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// A session registered on a `MemoryHub`
pub struct MemorySession {
    id: PeerId,
    hub: Weak<HubInner>,
    events: mpsc::UnboundedSender<SessionEvent>,
    destroyed: AtomicBool,
    links: Mutex<Vec<Arc<Link>>>,
    calls: Mutex<Vec<Arc<CallLink>>>,
}

impl MemorySession {
    fn hub(&self) -> Result<Arc<HubInner>, TransportError> {
        self.hub.upgrade().ok_or_else(|| TransportError::Signaling {
            reason: "signaling hub shut down".to_string(),
        })
    }

    fn track_link(&self, link: Arc<Link>) {
        let mut links = lock(&self.links);
        links.retain(|l| l.is_open());
        links.push(link);
    }

    fn track_call(&self, call: Arc<CallLink>) {
        let mut calls = lock(&self.calls);
        calls.retain(|c| c.is_open());
        calls.push(call);
    }

    fn lookup(&self, hub: &HubInner, remote: &PeerId) -> Result<Arc<MemorySession>, TransportError> {
        if remote == &self.id {
            return Err(TransportError::NegotiationFailed {
                peer_id: remote.to_string(),
                reason: "cannot connect to own session".to_string(),
            });
        }
        hub.sessions
            .get(remote)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_destroyed())
            .ok_or_else(|| TransportError::PeerUnavailable {
                peer_id: remote.to_string(),
            })
    }
}

#[async_trait]
impl PeerSession for MemorySession {
    fn id(&self) -> &PeerId {
        &self.id
    }

    async fn connect(
        &self,
        remote: &PeerId,
        options: ConnectOptions,
    ) -> Result<Arc<dyn DataConnection>, TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::SessionDestroyed);
        }
        let hub = self.hub()?;
        if !options.reliable {
            debug!("Unreliable channel requested; memory channels are always ordered");
        }
        if hub.unresponsive.contains(remote) {
            debug!("Peer {} is unresponsive, connect will never complete", remote.short());
            return pending().await;
        }

        let target = self.lookup(&hub, remote)?;
        simulate_latency(&hub.config).await;

        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            open: AtomicBool::new(true),
            initiator: local_tx,
            acceptor: remote_tx,
        });

        let outbound = MemoryConnection::new(remote.clone(), link.clone(), Side::Initiator, local_rx, &self.hub);
        let inbound = MemoryConnection::new(self.id.clone(), link.clone(), Side::Acceptor, remote_rx, &self.hub);

        self.track_link(link.clone());
        target.track_link(link.clone());

        if target
            .events
            .send(SessionEvent::Connection(Arc::new(inbound)))
            .is_err()
        {
            link.close();
            return Err(TransportError::PeerUnavailable {
                peer_id: remote.to_string(),
            });
        }

        hub.stats.connections_opened.fetch_add(1, Ordering::Relaxed);
        debug!("Hub linked {} -> {}", self.id.short(), remote.short());
        Ok(Arc::new(outbound))
    }

    async fn call(
        &self,
        remote: &PeerId,
        local: MediaStream,
    ) -> Result<Arc<dyn MediaCall>, TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::SessionDestroyed);
        }
        let hub = self.hub()?;
        let target = self.lookup(&hub, remote)?;
        simulate_latency(&hub.config).await;

        let (caller_tx, caller_rx) = mpsc::unbounded_channel();
        let (callee_tx, callee_rx) = mpsc::unbounded_channel();
        let link = Arc::new(CallLink {
            open: AtomicBool::new(true),
            caller: caller_tx,
            callee: callee_tx,
            offered: local,
        });

        let outgoing = MemoryCall::new(remote.clone(), link.clone(), Role::Caller, caller_rx);
        let incoming = MemoryCall::new(self.id.clone(), link.clone(), Role::Callee, callee_rx);

        self.track_call(link.clone());
        target.track_call(link.clone());

        if target
            .events
            .send(SessionEvent::Call(Arc::new(incoming)))
            .is_err()
        {
            link.close();
            return Err(TransportError::PeerUnavailable {
                peer_id: remote.to_string(),
            });
        }

        hub.stats.calls_placed.fetch_add(1, Ordering::Relaxed);
        debug!("Hub rang {} from {}", remote.short(), self.id.short());
        Ok(Arc::new(outgoing))
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.sessions.remove(&self.id);
        }
        for link in lock(&self.links).drain(..) {
            link.close();
        }
        for call in lock(&self.calls).drain(..) {
            call.close();
        }
        let _ = self.events.send(SessionEvent::Disconnected);
        info!("Hub released peer ID {}", self.id);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

// ----------------------------------------------------------------------------
// Data Connections
// ----------------------------------------------------------------------------

/// State shared by both halves of a data connection
struct Link {
    open: AtomicBool,
    initiator: mpsc::UnboundedSender<ConnectionEvent>,
    acceptor: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Link {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close both halves; only the first call emits events
    fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _ = self.initiator.send(ConnectionEvent::Closed);
        let _ = self.acceptor.send(ConnectionEvent::Closed);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Initiator,
    Acceptor,
}

/// One half of an in-memory data connection
pub struct MemoryConnection {
    peer: PeerId,
    link: Arc<Link>,
    side: Side,
    events: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    hub: Weak<HubInner>,
}

impl MemoryConnection {
    fn new(
        peer: PeerId,
        link: Arc<Link>,
        side: Side,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
        hub: &Weak<HubInner>,
    ) -> Self {
        Self {
            peer,
            link,
            side,
            events: Mutex::new(Some(events)),
            hub: hub.clone(),
        }
    }

    fn remote_queue(&self) -> &mpsc::UnboundedSender<ConnectionEvent> {
        match self.side {
            Side::Initiator => &self.link.acceptor,
            Side::Acceptor => &self.link.initiator,
        }
    }
}

#[async_trait]
impl DataConnection for MemoryConnection {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        lock(&self.events).take()
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if !self.link.is_open() {
            return Err(TransportError::ChannelClosed);
        }
        let hub = self.hub.upgrade();
        if let Some(hub) = &hub {
            simulate_latency(&hub.config).await;
        }
        if !self.link.is_open() {
            return Err(TransportError::ChannelClosed);
        }

        self.remote_queue()
            .send(ConnectionEvent::Data(data))
            .map_err(|_| TransportError::ChannelClosed)?;

        if let Some(hub) = hub {
            hub.stats.payloads_delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_open()
    }

    async fn close(&self) {
        if self.link.close() {
            debug!("Memory connection to {} closed locally", self.peer.short());
        }
    }
}

// ----------------------------------------------------------------------------
// Calls
// ----------------------------------------------------------------------------

/// State shared by both halves of a call
struct CallLink {
    open: AtomicBool,
    caller: mpsc::UnboundedSender<CallEvent>,
    callee: mpsc::UnboundedSender<CallEvent>,
    /// Stream the caller dialled with
    offered: MediaStream,
}

impl CallLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _ = self.caller.send(CallEvent::Closed);
        let _ = self.callee.send(CallEvent::Closed);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Caller,
    Callee,
}

/// One half of an in-memory call
pub struct MemoryCall {
    peer: PeerId,
    link: Arc<CallLink>,
    role: Role,
    events: Mutex<Option<mpsc::UnboundedReceiver<CallEvent>>>,
}

impl MemoryCall {
    fn new(
        peer: PeerId,
        link: Arc<CallLink>,
        role: Role,
        events: mpsc::UnboundedReceiver<CallEvent>,
    ) -> Self {
        Self {
            peer,
            link,
            role,
            events: Mutex::new(Some(events)),
        }
    }
}

/// What the far end of a call receives: fresh tracks of the same kinds
fn remote_copy(stream: &MediaStream) -> MediaStream {
    let tracks = stream
        .tracks()
        .iter()
        .map(|track| MediaTrack::new(format!("{}-remote", track.id()), track.kind()))
        .collect();
    MediaStream::new(format!("{}-remote", stream.id()), tracks)
}

#[async_trait]
impl MediaCall for MemoryCall {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<CallEvent>> {
        lock(&self.events).take()
    }

    async fn answer(&self, local: MediaStream) -> Result<(), TransportError> {
        if self.role != Role::Callee {
            return Err(TransportError::NegotiationFailed {
                peer_id: self.peer.to_string(),
                reason: "only the called side can answer".to_string(),
            });
        }
        if !self.link.is_open() {
            return Err(TransportError::ChannelClosed);
        }

        self.link
            .caller
            .send(CallEvent::Stream(remote_copy(&local)))
            .map_err(|_| TransportError::ChannelClosed)?;
        self.link
            .callee
            .send(CallEvent::Stream(remote_copy(&self.link.offered)))
            .map_err(|_| TransportError::ChannelClosed)?;
        Ok(())
    }

    async fn close(&self) {
        if self.link.close() {
            debug!("Memory call with {} closed", self.peer.short());
        }
    }
}
