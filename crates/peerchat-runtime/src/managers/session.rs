//! Session Manager
//!
//! Owns the single local peer session. While a session is open, a pump task
//! drains its events: unsolicited connections are inserted into the registry
//! and announced, incoming calls are queued for the router, and collaborator
//! errors are queued for the client. Calls nobody subscribed to are declined
//! on arrival.
//!
//! The queues outlive individual sessions, so subscribers keep receiving
//! events across stop/start cycles.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use peerchat_core::{
    MediaCall, PeerChatError, PeerChatResult, PeerId, PeerSession, SessionConfig, SessionEvent,
    SignalingTransport, TransportError,
};

use crate::managers::registry::ConnectionRegistry;

/// Sending and receiving halves of a queue whose receiver is claimed once
struct Queue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Queue<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn take(&self) -> Option<mpsc::UnboundedReceiver<T>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Hand `item` to the claimed receiver, or give it back when the receiver
    /// is unclaimed or gone
    fn offer(&self, item: T) -> Result<(), T> {
        if self.rx.lock().unwrap_or_else(PoisonError::into_inner).is_some() {
            return Err(item);
        }
        self.tx.send(item).map_err(|mpsc::error::SendError(item)| item)
    }
}

pub struct SessionManager {
    transport: Arc<dyn SignalingTransport>,
    config: SessionConfig,
    registry: ConnectionRegistry,
    /// Serializes start/stop and holds the pump of the open session
    lifecycle: tokio::sync::Mutex<Option<AbortHandle>>,
    current: RwLock<Option<Arc<dyn PeerSession>>>,
    incoming: Queue<PeerId>,
    calls: Arc<Queue<Arc<dyn MediaCall>>>,
    errors: Queue<TransportError>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        config: SessionConfig,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            transport,
            config,
            registry,
            lifecycle: tokio::sync::Mutex::new(None),
            current: RwLock::new(None),
            incoming: Queue::new(),
            calls: Arc::new(Queue::new()),
            errors: Queue::new(),
        }
    }

    /// The open session, or `NotStarted`
    pub fn session(&self) -> PeerChatResult<Arc<dyn PeerSession>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PeerChatError::NotStarted)
    }

    /// Identifier assigned to the open session
    pub fn id(&self) -> Option<PeerId> {
        self.session().ok().map(|session| session.id().clone())
    }

    pub fn is_started(&self) -> bool {
        self.session().is_ok()
    }

    /// Open a new local identity
    pub async fn start(&self) -> PeerChatResult<PeerId> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Ok(session) = self.session() {
            return Err(PeerChatError::AlreadyStarted {
                id: session.id().to_string(),
            });
        }

        debug!("Opening peer session");
        let opened = timeout(self.config.open_timeout(), self.transport.open())
            .await
            .map_err(|_| {
                PeerChatError::Session(TransportError::Timeout {
                    duration_ms: self.config.open_timeout_ms,
                })
            })?
            .map_err(PeerChatError::Session)?;

        let id = opened.session.id().clone();
        let pump = tokio::spawn(pump_session(
            opened.events,
            self.registry.clone(),
            self.incoming.tx.clone(),
            self.calls.clone(),
            self.errors.tx.clone(),
        ))
        .abort_handle();

        *lifecycle = Some(pump);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(opened.session);
        info!("Peer session open as {}", id);
        Ok(id)
    }

    /// Tear down the local identity and every connection. Returns false when
    /// there was no session.
    pub async fn stop(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let session = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(session) = session else {
            debug!("Stop requested without an open session");
            return false;
        };

        if let Some(pump) = lifecycle.take() {
            pump.abort();
        }
        self.registry.clear().await;
        session.destroy().await;
        info!("Peer session {} stopped", session.id());
        true
    }

    /// Remotes that opened a connection to us, after registry insertion
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<PeerId>> {
        self.incoming.take()
    }

    /// Calls placed to us
    pub fn take_calls(&self) -> Option<mpsc::UnboundedReceiver<Arc<dyn MediaCall>>> {
        self.calls.take()
    }

    /// Errors the collaborator reported after the session opened
    pub fn take_errors(&self) -> Option<mpsc::UnboundedReceiver<TransportError>> {
        self.errors.take()
    }
}

async fn pump_session(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    registry: ConnectionRegistry,
    incoming: mpsc::UnboundedSender<PeerId>,
    calls: Arc<Queue<Arc<dyn MediaCall>>>,
    errors: mpsc::UnboundedSender<TransportError>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connection(conn) => {
                let peer = conn.peer().clone();
                match registry.insert(conn.clone()) {
                    Ok(()) => {
                        info!("Incoming connection: {}", peer);
                        let _ = incoming.send(peer);
                    }
                    Err(e) => {
                        warn!("Refusing connection from {}: {}", peer, e);
                        conn.close().await;
                    }
                }
            }
            SessionEvent::Call(call) => {
                debug!("Incoming call from {}", call.peer());
                if let Err(call) = calls.offer(call) {
                    info!("Declining call from {}: nobody answers calls", call.peer());
                    call.close().await;
                }
            }
            SessionEvent::Error(e) => {
                warn!("Peer session error: {}", e);
                let _ = errors.send(e);
            }
            SessionEvent::Disconnected => {
                warn!("Peer session lost its signaling server");
                let _ = errors.send(TransportError::SessionDestroyed);
                break;
            }
        }
    }
}
