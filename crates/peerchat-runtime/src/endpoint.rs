//! Peer endpoint
//!
//! The owned value tying the session manager, the connection registry, the
//! call manager and the event router together. Tests and front ends build their
//! own endpoint instead of sharing a process-wide one.

use std::sync::Arc;

use tokio::sync::mpsc;

use peerchat_core::{
    CallState, DataRecord, Inbound, MediaDevices, MediaStream, PeerChatError, PeerChatResult,
    PeerId, SessionConfig, SignalingTransport, Transfer, TransportError,
};

use crate::managers::{ActiveCall, CallManager, ConnectionRegistry, SessionManager};
use crate::router::EventRouter;
use crate::subscription::Subscription;

pub struct PeerEndpoint {
    config: SessionConfig,
    sessions: Arc<SessionManager>,
    registry: ConnectionRegistry,
    router: EventRouter,
}

impl PeerEndpoint {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaDevices>,
        config: SessionConfig,
    ) -> Self {
        let registry = ConnectionRegistry::new(&config);
        let sessions = Arc::new(SessionManager::new(transport, config.clone(), registry.clone()));
        let calls = Arc::new(CallManager::new());
        let router = EventRouter::new(sessions.clone(), registry.clone(), calls, media, &config);
        Self {
            config,
            sessions,
            registry,
            router,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    /// Open the local session and return its identifier
    pub async fn start(&self) -> PeerChatResult<PeerId> {
        self.sessions.start().await
    }

    /// Close every connection, hang up and tear down the local session
    pub async fn stop(&self) -> bool {
        self.router.hang_up().await;
        self.sessions.stop().await
    }

    pub fn id(&self) -> Option<PeerId> {
        self.sessions.id()
    }

    pub fn is_started(&self) -> bool {
        self.sessions.is_started()
    }

    /// Collaborator errors reported after the session opened
    pub fn take_session_errors(&self) -> Option<mpsc::UnboundedReceiver<TransportError>> {
        self.sessions.take_errors()
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub async fn connect(&self, remote: &PeerId) -> PeerChatResult<()> {
        let session = self.sessions.session()?;
        self.registry.connect(session.as_ref(), remote).await
    }

    pub async fn send(&self, remote: &PeerId, payload: &Transfer) -> PeerChatResult<()> {
        self.registry.send(remote, payload).await
    }

    pub async fn send_text(&self, remote: &PeerId, text: impl Into<String>) -> PeerChatResult<()> {
        self.send(remote, &Transfer::text(text)).await
    }

    pub async fn send_file(&self, remote: &PeerId, file: DataRecord) -> PeerChatResult<()> {
        self.send(remote, &Transfer::Record(file)).await
    }

    pub fn on_close<F>(&self, remote: &PeerId, callback: F) -> PeerChatResult<()>
    where
        F: FnOnce(&PeerId) + Send + Sync + 'static,
    {
        self.registry.on_close(remote, callback)
    }

    /// Locally disconnect from `remote`
    pub async fn close(&self, remote: &PeerId) -> PeerChatResult<()> {
        if !self.sessions.is_started() {
            return Err(PeerChatError::NotStarted);
        }
        self.registry.close(remote).await
    }

    pub fn connections(&self) -> Vec<PeerId> {
        self.registry.ids()
    }

    pub fn is_connected(&self, remote: &PeerId) -> bool {
        self.registry.contains(remote)
    }

    // ------------------------------------------------------------------------
    // Events and Calls
    // ------------------------------------------------------------------------

    pub fn on_incoming<F>(&self, callback: F) -> PeerChatResult<Subscription>
    where
        F: FnMut(PeerId) + Send + 'static,
    {
        self.router.on_incoming(callback)
    }

    pub fn on_data<F>(&self, remote: &PeerId, callback: F) -> PeerChatResult<Subscription>
    where
        F: FnMut(Inbound) + Send + 'static,
    {
        self.router.on_data(remote, callback)
    }

    pub fn on_incoming_call<F>(&self, callback: F) -> PeerChatResult<Subscription>
    where
        F: Fn(ActiveCall) + Send + Sync + 'static,
    {
        self.router.on_incoming_call(callback)
    }

    pub async fn place_call<F>(
        &self,
        remote: &PeerId,
        local: MediaStream,
        on_remote: F,
    ) -> PeerChatResult<()>
    where
        F: FnOnce(ActiveCall) + Send + 'static,
    {
        self.router.place_call(remote, local, on_remote).await
    }

    pub async fn hang_up(&self) -> bool {
        self.router.hang_up().await
    }

    pub fn call_state(&self) -> CallState {
        self.router.call_state()
    }

    pub fn active_call(&self) -> Option<ActiveCall> {
        self.router.active_call()
    }
}
